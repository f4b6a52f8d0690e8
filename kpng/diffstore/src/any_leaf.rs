use crate::{Leaf, Store};
use std::fmt;

pub type AnyStore<K, T> = Store<K, AnyLeaf<T>>;

/// Holds one value compared with a caller-supplied equality.
///
/// Instead of hashing the content, the digest is a counter bumped every time
/// a different value is set, so change detection costs one comparison.
pub struct AnyLeaf<T> {
    equal: fn(&T, &T) -> bool,
    value: Option<T>,
    hash: u64,
}

// === impl AnyLeaf ===

impl<T> AnyLeaf<T> {
    pub fn new(equal: fn(&T, &T) -> bool) -> Self {
        Self {
            equal,
            value: None,
            hash: 1,
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn set(&mut self, value: T) {
        let same = match &self.value {
            Some(prev) => (self.equal)(prev, &value),
            None => false,
        };
        if !same {
            self.hash += 1;
        }
        self.value = Some(value);
    }
}

impl<T> Leaf for AnyLeaf<T> {
    /// The value is kept so the next `set` can be compared against it.
    fn reset(&mut self) {}

    fn hash(&self) -> u64 {
        self.hash
    }
}

impl<T: fmt::Debug> fmt::Debug for AnyLeaf<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyLeaf")
            .field("value", &self.value)
            .field("hash", &self.hash)
            .finish()
    }
}

impl<K: Ord + Clone, T: 'static> AnyStore<K, T> {
    pub fn with_equal(equal: fn(&T, &T) -> bool) -> Self {
        Store::new(move || AnyLeaf::new(equal))
    }
}
