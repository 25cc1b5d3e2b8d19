use std::collections::HashMap;

use fq_types::QueryPair;

use crate::query_pair_map_key;

/// Pairs keyed by [`query_pair_map_key`], iterated in text order.
///
/// When two pairs share a key the later one wins but keeps the slot of the
/// first, matching insertion into an ordered map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairMap {
    entries: Vec<(String, QueryPair)>,
    index: HashMap<String, usize>,
}

impl PairMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_pairs(pairs: Vec<QueryPair>) -> Self {
        let mut map = Self::new();
        for pair in pairs {
            map.insert(pair);
        }
        map
    }

    pub fn insert(&mut self, pair: QueryPair) {
        let key = query_pair_map_key(&pair);
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot].1 = pair,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, pair));
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&QueryPair> {
        self.index.get(key).map(|&slot| &self.entries[slot].1)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryPair)> {
        self.entries
            .iter()
            .map(|(key, pair)| (key.as_str(), pair))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
