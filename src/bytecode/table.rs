//! Interning tables for the constant and name pools.

use std::borrow::Borrow;
use std::hash::Hash;

use rustc_hash::FxHashMap;

/// Assigns each distinct value a stable index in first-use order.
///
/// Index 0 goes to the first value interned, 1 to the next distinct one, and
/// so on. Interning an equal value again returns the existing index.
#[derive(Debug, Clone)]
pub struct InternTable<T> {
    /// Interned values, position == index.
    values: Vec<T>,
    /// Deduplication index: maps value to its position in `values`.
    index: FxHashMap<T, usize>,
}

impl<T> Default for InternTable<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            index: FxHashMap::default(),
        }
    }
}

impl<T: Eq + Hash + Clone> InternTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `value`, allocating the next one if unseen.
    pub fn intern(&mut self, value: T) -> usize {
        if let Some(&idx) = self.index.get(&value) {
            return idx;
        }

        let idx = self.values.len();
        self.values.push(value.clone());
        self.index.insert(value, idx);
        idx
    }

    /// Index of `value` if it has been interned. Never allocates.
    pub fn lookup<Q>(&self, value: &Q) -> Option<usize>
    where
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.index.get(value).copied()
    }

    /// All interned values ordered by index.
    pub fn snapshot(&self) -> Vec<T> {
        self.values.clone()
    }

    /// Consumes the table, yielding the values ordered by index.
    pub fn into_pool(self) -> Vec<T> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
