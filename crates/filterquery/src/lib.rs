#![forbid(unsafe_code)]

//! Filter-query expression engine.
//!
//! The crates underneath are usable on their own; this one ties them to an
//! [`Engine`] that owns the runtime policy, the pair cache and the
//! diagnostic ledger, so callers do not thread them through every call.
//!
//! ```
//! use filterquery::{Engine, FilterItem, FilterTree};
//!
//! let engine = Engine::default();
//! let filters = FilterTree::new(vec![FilterItem::new("service.name", "in", vec!["a", "b"])]);
//! let merged = engine.merge(&filters, Some("service.name = 'a' AND status = 'ok'"));
//! assert_eq!(merged.filter.expression, "service.name IN ['a', 'b'] AND status = 'ok'");
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

pub use fq_context::{QueryContext, Role};
pub use fq_format::{
    format_between, format_single_value, format_value, is_quoted, literal_to_value, render_item,
    unquote,
};
pub use fq_lexer::{LexError, significant, try_tokenize};
pub use fq_merge::{Edit, EditList, MergeResult, normalize_deprecated_operators};
pub use fq_pairs::{PairCache, PairMap, current_query_pair, query_pair_map_key};
pub use fq_runtime::{
    Diagnostic, DiagnosticKind, DiagnosticLedger, EnginePolicy, PolicyError, RuntimeMode,
};
pub use fq_types::{
    FilterExpression, FilterItem, FilterKey, FilterTree, FilterValue, Operator, Position,
    QueryPair, Span, Token, TokenKind,
};

/// One engine per editor or service. Every operation is infallible: lexer
/// failures degrade to empty or default results and land in the ledger
/// drained by [`Engine::take_diagnostics`].
#[derive(Debug)]
pub struct Engine {
    policy: EnginePolicy,
    cache: PairCache,
    diagnostics: Mutex<DiagnosticLedger>,
}

impl Engine {
    /// Builds an engine after validating `policy`.
    pub fn new(policy: EnginePolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self {
            cache: PairCache::from_policy(&policy),
            policy,
            diagnostics: Mutex::new(DiagnosticLedger::new()),
        })
    }

    /// Builds an engine from a JSON policy document.
    pub fn from_policy_json(document: &str) -> Result<Self, PolicyError> {
        Self::new(EnginePolicy::from_json(document)?)
    }

    #[must_use]
    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    /// Tokens of `query`, whitespace included. Text the lexer rejects yields
    /// no tokens.
    pub fn tokenize(&self, query: &str) -> Vec<Token> {
        let mut ledger = self.diagnostics.lock();
        match fq_lexer::tokenize_with_policy(query, &self.policy, &mut ledger) {
            Ok(tokens) => tokens,
            Err(err) => {
                self.policy.record(
                    DiagnosticKind::TokenizationFailure,
                    "tokenize",
                    err.to_string(),
                    &mut ledger,
                );
                Vec::new()
            }
        }
    }

    pub fn extract_pairs(&self, query: &str) -> Vec<QueryPair> {
        let mut ledger = self.diagnostics.lock();
        fq_pairs::extract_with_policy(query, &self.policy, &mut ledger)
    }

    /// Cached pair map of the trimmed `query`, keyed like
    /// [`query_pair_map_key`].
    pub fn pair_map(&self, query: &str) -> Arc<PairMap> {
        let mut ledger = self.diagnostics.lock();
        self.cache.pairs_for(query, &self.policy, &mut ledger)
    }

    pub fn resolve_context(&self, query: &str, cursor: usize) -> QueryContext {
        let mut ledger = self.diagnostics.lock();
        fq_context::resolve_context_with_policy(query, cursor, &self.policy, &mut ledger)
    }

    #[must_use]
    pub fn convert_filters_to_expression(&self, filters: &FilterTree) -> FilterExpression {
        fq_format::convert_filters_to_expression(filters)
    }

    pub fn convert_expression_to_filters(&self, expression: &str) -> Vec<FilterItem> {
        let mut ledger = self.diagnostics.lock();
        fq_format::convert_expression_to_filters_with_policy(expression, &self.policy, &mut ledger)
    }

    pub fn merge(&self, filters: &FilterTree, existing: Option<&str>) -> MergeResult {
        let mut ledger = self.diagnostics.lock();
        fq_merge::merge_with_cache(filters, existing, &self.cache, &self.policy, &mut ledger)
    }

    pub fn remove_keys<K: AsRef<str>>(
        &self,
        expression: &str,
        keys: &[K],
        only_variables: bool,
    ) -> String {
        let mut ledger = self.diagnostics.lock();
        fq_merge::remove_keys_from_expression_with_policy(
            expression,
            keys,
            only_variables,
            &self.policy,
            &mut ledger,
        )
    }

    /// Drains the diagnostics recorded since the last call.
    pub fn take_diagnostics(&self) -> DiagnosticLedger {
        self.diagnostics.lock().take()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn cached_queries(&self) -> usize {
        self.cache.len()
    }
}

impl Default for Engine {
    fn default() -> Self {
        let policy = EnginePolicy::default();
        Self {
            cache: PairCache::from_policy(&policy),
            policy,
            diagnostics: Mutex::new(DiagnosticLedger::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DiagnosticKind, Engine, EnginePolicy, PolicyError, Role};

    #[test]
    fn invalid_policies_are_rejected() {
        let err = Engine::new(EnginePolicy::strict().with_max_context_depth(0)).expect_err("depth 0");
        assert!(matches!(err, PolicyError::ZeroContextDepth));
        let err = Engine::from_policy_json("{\"mode\": \"loose\"}").expect_err("bad mode");
        assert!(matches!(err, PolicyError::Parse(_)));
        let engine = Engine::from_policy_json("{\"mode\": \"strict\", \"pair_cache_capacity\": 2}")
            .expect("valid policy");
        assert!(engine.policy().is_strict());
    }

    #[test]
    fn diagnostics_accumulate_until_drained() {
        let engine = Engine::default();
        assert!(engine.extract_pairs("a = 'open").is_empty());
        assert!(engine.tokenize("b = 'open").is_empty());
        let drained = engine.take_diagnostics();
        assert_eq!(drained.count(DiagnosticKind::TokenizationFailure), 2);
        assert!(engine.take_diagnostics().is_empty());
    }

    #[test]
    fn cache_is_shared_by_merge_and_pair_map() {
        let engine = Engine::default();
        let map = engine.pair_map("  a = 1  ");
        assert_eq!(map.len(), 1);
        assert_eq!(engine.cached_queries(), 1);
        let _ = engine.merge(&super::FilterTree::default(), Some("a = 1"));
        assert_eq!(engine.cached_queries(), 1);
        engine.clear_cache();
        assert_eq!(engine.cached_queries(), 0);
    }

    #[test]
    fn cache_capacity_flushes_and_records() {
        let policy = EnginePolicy::hardened().with_pair_cache_capacity(Some(1));
        let engine = Engine::new(policy).expect("valid policy");
        let _ = engine.pair_map("a = 1");
        let _ = engine.pair_map("b = 2");
        assert_eq!(engine.cached_queries(), 1);
        assert_eq!(engine.take_diagnostics().count(DiagnosticKind::CacheFlush), 1);
    }

    #[test]
    fn diagnostics_ledger_stays_within_policy_cap() {
        let engine = Engine::new(EnginePolicy::hardened().with_max_diagnostics(16))
            .expect("valid policy");
        for _ in 0..10_000 {
            let _ = engine.resolve_context("service.name = 'adser", 21);
        }
        let drained = engine.take_diagnostics();
        assert_eq!(drained.len(), 16);
        assert!(drained.dropped() > 0);

        let engine = Engine::default();
        for _ in 0..10_000 {
            let _ = engine.resolve_context("service.name = 'adser", 21);
        }
        assert_eq!(
            engine.take_diagnostics().len(),
            fq_runtime::DEFAULT_MAX_DIAGNOSTICS
        );
    }

    #[test]
    fn context_goes_through_the_engine_policy() {
        let engine = Engine::new(EnginePolicy::strict()).expect("valid policy");
        let ctx = engine.resolve_context("a ! ", 4);
        assert_eq!(ctx.role, Role::Operator);
        assert_eq!(engine.take_diagnostics().count(DiagnosticKind::TokenizationFailure), 1);
    }
}
