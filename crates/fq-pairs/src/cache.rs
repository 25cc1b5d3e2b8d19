use std::collections::HashMap;
use std::sync::Arc;

use fq_runtime::{DiagnosticKind, DiagnosticLedger, EnginePolicy};
use parking_lot::Mutex;

use crate::{PairMap, extract_with_policy};

/// Memoised pair maps keyed by trimmed query text. Pair offsets are
/// relative to that trimmed text.
///
/// Entries never go stale: a different text is a different key. With a
/// capacity set, reaching it flushes the whole cache before the next insert.
#[derive(Debug, Default)]
pub struct PairCache {
    entries: Mutex<HashMap<String, Arc<PairMap>>>,
    capacity: Option<usize>,
}

impl PairCache {
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    #[must_use]
    pub fn from_policy(policy: &EnginePolicy) -> Self {
        Self::new(policy.pair_cache_capacity)
    }

    pub fn pairs_for(
        &self,
        text: &str,
        policy: &EnginePolicy,
        ledger: &mut DiagnosticLedger,
    ) -> Arc<PairMap> {
        let key = text.trim();
        if let Some(hit) = self.entries.lock().get(key) {
            #[cfg(feature = "tracing")]
            tracing::debug!(query = key, "pair cache hit");
            return Arc::clone(hit);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(query = key, "pair cache miss");
        // Extract without holding the lock; a racing miss just extracts twice.
        // Offsets are relative to the trimmed text.
        let map = Arc::new(PairMap::from_pairs(extract_with_policy(key, policy, ledger)));

        let mut entries = self.entries.lock();
        if let Some(capacity) = self.capacity
            && entries.len() >= capacity
            && !entries.contains_key(key)
        {
            policy.record(
                DiagnosticKind::CacheFlush,
                "pair_cache",
                format!("capacity={capacity} entries={}", entries.len()),
                ledger,
            );
            entries.clear();
        }
        entries.insert(key.to_owned(), Arc::clone(&map));
        map
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fq_runtime::{DiagnosticKind, DiagnosticLedger, EnginePolicy};

    use super::PairCache;

    #[test]
    fn trimmed_text_shares_one_entry() {
        let cache = PairCache::default();
        let policy = EnginePolicy::default();
        let mut ledger = DiagnosticLedger::new();
        let first = cache.pairs_for("a = 1", &policy, &mut ledger);
        let second = cache.pairs_for("  a = 1 ", &policy, &mut ledger);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_flushes_wholesale() {
        let policy = EnginePolicy::hardened().with_pair_cache_capacity(Some(2));
        let cache = PairCache::from_policy(&policy);
        let mut ledger = DiagnosticLedger::new();
        cache.pairs_for("a = 1", &policy, &mut ledger);
        cache.pairs_for("b = 2", &policy, &mut ledger);
        assert_eq!(cache.len(), 2);
        cache.pairs_for("c = 3", &policy, &mut ledger);
        assert_eq!(cache.len(), 1);
        assert_eq!(ledger.count(DiagnosticKind::CacheFlush), 1);
    }

    #[test]
    fn cache_is_shareable_across_threads() {
        let cache = Arc::new(PairCache::default());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let mut ledger = DiagnosticLedger::new();
                    let map = cache.pairs_for(&format!("k{i} = {i}"), &EnginePolicy::default(), &mut ledger);
                    map.len()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().expect("thread"), 1);
        }
        assert_eq!(cache.len(), 4);
    }
}
