use crate::{buffer_leaf::nonzero, Leaf, Store};
use std::hash::{Hash, Hasher};
use xxhash_rust::xxh3::Xxh3;

pub type ScalarStore<K, T> = Store<K, ScalarLeaf<T>>;

/// Holds one hashable value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScalarLeaf<T>(T);

// === impl ScalarLeaf ===

impl<T> ScalarLeaf<T> {
    pub fn get(&self) -> &T {
        &self.0
    }

    pub fn set(&mut self, value: T) {
        self.0 = value;
    }
}

impl<T: Hash + Default> Leaf for ScalarLeaf<T> {
    fn reset(&mut self) {
        self.0 = T::default();
    }

    fn hash(&self) -> u64 {
        let mut hasher = Xxh3::new();
        self.0.hash(&mut hasher);
        nonzero(hasher.finish())
    }
}

impl<K: Ord + Clone, T: Hash + Default + 'static> ScalarStore<K, T> {
    pub fn scalars() -> Self {
        Store::new(ScalarLeaf::default)
    }
}
