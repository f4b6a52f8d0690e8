use crate::{Item, Leaf};
use std::{borrow::Borrow, collections::BTreeMap, fmt, ops::Bound};

/// An ordered, diff-tracked map of leaves.
pub struct Store<K, V> {
    data: BTreeMap<K, Item<K, V>>,
    new_value: Box<dyn Fn() -> V + Send + Sync>,

    done: bool,
    touched: usize,
}

// === impl Store ===

impl<K: Ord + Clone, V: Leaf> Store<K, V> {
    pub fn new(new_value: impl Fn() -> V + Send + Sync + 'static) -> Self {
        Self {
            data: BTreeMap::new(),
            new_value: Box::new(new_value),
            done: false,
            touched: 0,
        }
    }

    /// Returns the item for `key`, creating it if needed, and marks it as
    /// written in the current generation.
    pub fn get_item(&mut self, key: impl Into<K>) -> &mut Item<K, V> {
        let new_value = &self.new_value;
        let item = self
            .data
            .entry(key.into())
            .or_insert_with_key(|k| Item::new(k.clone(), new_value()));

        if !item.touched {
            item.touched = true;
            self.touched += 1;
        }

        item
    }

    /// Returns the leaf for `key` for writing. See [`Store::get_item`].
    pub fn get(&mut self, key: impl Into<K>) -> &mut V {
        self.get_item(key).value_mut()
    }

    /// Returns the leaf for `key` only if it was written in the current
    /// generation. Does not mark it as written.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.data
            .get(key)
            .filter(|item| item.touched)
            .map(Item::value)
    }

    /// Number of items written in the current generation.
    pub fn len(&self) -> usize {
        self.touched
    }

    pub fn is_empty(&self) -> bool {
        self.touched == 0
    }

    /// Items written in the current generation, in key order.
    pub fn list(&self) -> impl Iterator<Item = &Item<K, V>> {
        self.data.values().filter(|item| item.touched)
    }

    /// Runs the finalizers registered on written items, in key order.
    pub fn run_deferred(&mut self) {
        for item in self.data.values_mut().filter(|item| item.touched) {
            item.run_deferred();
        }
    }

    /// Freezes the digests of every written item. Must be called once per
    /// generation, after every writer has finished and before querying diffs.
    pub fn done(&mut self) {
        for item in self.data.values_mut().filter(|item| item.touched) {
            item.current_hash = item.value().hash();
        }
        self.done = true;
    }

    /// Items created or updated in this generation, in key order.
    ///
    /// # Panics
    ///
    /// If [`Store::done`] was not called for this generation.
    pub fn changed(&self) -> Vec<&Item<K, V>> {
        self.assert_done();
        self.data.values().filter(|item| item.changed()).collect()
    }

    /// Items written in the previous generation but not in this one.
    ///
    /// # Panics
    ///
    /// If [`Store::done`] was not called for this generation.
    pub fn deleted(&self) -> Vec<&Item<K, V>> {
        self.assert_done();
        self.data.values().filter(|item| item.deleted()).collect()
    }

    /// Tells whether anything was created, updated or deleted.
    ///
    /// # Panics
    ///
    /// If [`Store::done`] was not called for this generation.
    pub fn has_changes(&self) -> bool {
        self.assert_done();
        self.data
            .values()
            .any(|item| item.changed() || item.deleted())
    }

    /// Commits the current generation and starts the next one.
    ///
    /// Items that were neither written in this generation nor in the previous
    /// one are dropped.
    pub fn reset(&mut self) {
        self.data.retain(|_, item| item.rotate());
        self.done = false;
        self.touched = 0;
    }

    fn assert_done(&self) {
        assert!(self.done, "diff queried before Store::done() was called");
    }
}

impl<V: Leaf> Store<String, V> {
    /// Items written in the current generation whose key starts with
    /// `prefix`, in key order.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Item<String, V>> {
        self.data
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(_, item)| item)
            .filter(|item| item.touched)
    }
}

impl<K: Ord + Clone, V: Leaf + Default + 'static> Default for Store<K, V> {
    fn default() -> Self {
        Self::new(V::default)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Store<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("data", &self.data.values().collect::<Vec<_>>())
            .field("done", &self.done)
            .field("touched", &self.touched)
            .finish()
    }
}
