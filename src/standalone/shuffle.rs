//! Grouping of intermediate pairs by key.
//!
//! Grouping only appends: keys land in an unordered FNV table and are sorted
//! once, when the groups are handed to the reduce phase.

use fnv::FnvHashMap;
use itertools::Itertools;
use std::borrow::Borrow;
use std::hash::Hash;

use crate::KeyValue;

/// Every value emitted for each distinct key, in emission order.
#[derive(Debug)]
pub struct Groups<K, V> {
    table: FnvHashMap<K, Vec<V>>,
    values: usize,
}

impl<K, V> Default for Groups<K, V> {
    fn default() -> Self {
        Self {
            table: FnvHashMap::default(),
            values: 0,
        }
    }
}

impl<K: Hash + Eq, V> Groups<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` to the group for `key`, creating the group on first use.
    pub fn insert(&mut self, key: K, value: V) {
        #[allow(clippy::unwrap_or_default)]
        self.table.entry(key).or_insert(Vec::new()).push(value);
        self.values += 1;
    }

    /// Folds one map call's output into the groups, keeping its order.
    pub fn extend_from(&mut self, pairs: Vec<KeyValue<K, V>>) {
        for KeyValue { key, value } in pairs {
            self.insert(key, value);
        }
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Total number of values across all groups.
    pub fn value_count(&self) -> usize {
        self.values
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&[V]>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.get(key).map(Vec::as_slice)
    }
}

impl<K: Hash + Ord, V> Groups<K, V> {
    /// Consumes the table, yielding each group exactly once in ascending key
    /// order.
    pub fn into_sorted(self) -> Vec<(K, Vec<V>)> {
        self.table
            .into_iter()
            .sorted_unstable_by(|(a, _), (b, _)| a.cmp(b))
            .collect()
    }
}

/// Groups the outputs of every map call, taken in the order given.
pub fn group<K, V, I>(map_outputs: I) -> Groups<K, V>
where
    K: Hash + Eq,
    I: IntoIterator<Item = Vec<KeyValue<K, V>>>,
{
    let mut groups = Groups::new();
    for pairs in map_outputs {
        groups.extend_from(pairs);
    }
    groups
}
