use crate::{Leaf, Store};
use std::fmt;

pub type BufferStore<K> = Store<K, BufferLeaf>;

/// An append-only text buffer, hashed by content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferLeaf(String);

// === impl BufferLeaf ===

impl BufferLeaf {
    pub fn push_str(&mut self, s: &str) {
        self.0.push_str(s);
    }

    pub fn push(&mut self, c: char) {
        self.0.push(c);
    }

    pub fn writeln(&mut self) {
        self.0.push('\n');
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Leaf for BufferLeaf {
    fn reset(&mut self) {
        self.0.clear();
    }

    fn hash(&self) -> u64 {
        nonzero(xxhash_rust::xxh3::xxh3_64(self.0.as_bytes()))
    }
}

impl fmt::Write for BufferLeaf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.push_str(s);
        Ok(())
    }
}

impl fmt::Display for BufferLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<K: Ord + Clone> BufferStore<K> {
    pub fn buffers() -> Self {
        Store::new(BufferLeaf::default)
    }
}

/// Zero means "no content" to the store, so a digest never takes that value.
pub(crate) fn nonzero(hash: u64) -> u64 {
    if hash == 0 {
        1
    } else {
        hash
    }
}
