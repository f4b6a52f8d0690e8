use crate::Leaf;

type Deferred<V> = Box<dyn FnOnce(&mut V) + Send>;

/// A keyed leaf with its generation state.
pub struct Item<K, V> {
    key: K,
    value: V,

    pub(crate) touched: bool,
    pub(crate) previous_hash: u64,
    pub(crate) current_hash: u64,

    deferred: Vec<Deferred<V>>,
}

/// Where an item stands in the current generation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// Written this generation, absent from the previous one.
    Created,
    /// Written this generation with a different digest.
    Updated,
    /// Written this generation with the same digest.
    Unchanged,
    /// Written in the previous generation but not in this one.
    Deleted,
    /// Not written in the last two generations; dropped on the next reset.
    Stale,
}

// === impl Item ===

impl<K, V: Leaf> Item<K, V> {
    pub(crate) fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            touched: false,
            previous_hash: 0,
            current_hash: 0,
            deferred: Vec::new(),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn state(&self) -> State {
        match (self.touched, self.previous_hash) {
            (true, 0) => State::Created,
            (true, prev) if prev != self.current_hash => State::Updated,
            (true, _) => State::Unchanged,
            (false, 0) => State::Stale,
            (false, _) => State::Deleted,
        }
    }

    pub fn created(&self) -> bool {
        self.touched && self.previous_hash == 0
    }

    /// Note that a created item is also updated.
    pub fn updated(&self) -> bool {
        self.touched && self.previous_hash != self.current_hash
    }

    pub fn deleted(&self) -> bool {
        !self.touched && self.previous_hash != 0
    }

    pub fn changed(&self) -> bool {
        self.created() || self.updated()
    }

    /// Registers a finalizer, run once by [`Store::run_deferred`] after every
    /// writer of the generation has finished.
    ///
    /// [`Store::run_deferred`]: crate::Store::run_deferred
    pub fn defer(&mut self, f: impl FnOnce(&mut V) + Send + 'static) {
        self.deferred.push(Box::new(f));
    }

    pub(crate) fn run_deferred(&mut self) {
        for f in self.deferred.drain(..) {
            f(&mut self.value);
        }
    }

    /// Commits this generation. Returns false when the item must be purged.
    pub(crate) fn rotate(&mut self) -> bool {
        if self.state() == State::Stale {
            return false;
        }

        self.previous_hash = self.current_hash;
        self.current_hash = 0;
        self.touched = false;
        self.deferred.clear();
        self.value.reset();
        true
    }
}

impl<K: std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for Item<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("touched", &self.touched)
            .field("previous_hash", &self.previous_hash)
            .field("current_hash", &self.current_hash)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}
