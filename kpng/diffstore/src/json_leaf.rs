use crate::{buffer_leaf::nonzero, Leaf, Store};
use serde::Serialize;

pub type JsonStore<K, T> = Store<K, JsonLeaf<T>>;

/// Holds one value, hashed through its JSON form.
#[derive(Clone, Debug, Default)]
pub struct JsonLeaf<T> {
    value: T,
}

// === impl JsonLeaf ===

impl<T> JsonLeaf<T> {
    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
    }
}

impl<T: Serialize + Default> Leaf for JsonLeaf<T> {
    fn reset(&mut self) {
        self.value = T::default();
    }

    /// # Panics
    ///
    /// If the value cannot be represented as JSON (e.g. a map with
    /// non-string keys); such a type cannot be tracked by this leaf.
    fn hash(&self) -> u64 {
        let json = serde_json::to_vec(&self.value)
            .unwrap_or_else(|error| panic!("value is not JSON-serializable: {error}"));
        nonzero(xxhash_rust::xxh3::xxh3_64(&json))
    }
}

impl<K: Ord + Clone, T: Serialize + Default + 'static> JsonStore<K, T> {
    pub fn json() -> Self {
        Store::new(JsonLeaf::default)
    }
}
