#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default bound on self-referential context resolution.
pub const DEFAULT_MAX_CONTEXT_DEPTH: usize = 3;

/// Default number of diagnostics an engine ledger keeps before dropping the
/// oldest.
pub const DEFAULT_MAX_DIAGNOSTICS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Characters no lexer rule accepts are tokenization failures.
    Strict,
    /// Unrecognised characters are skipped and recorded as diagnostics.
    Hardened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    TokenizationFailure,
    SkippedCharacter,
    RecursionGuard,
    CacheFlush,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub ts_unix_ms: u64,
    pub mode: RuntimeMode,
    pub kind: DiagnosticKind,
    pub subject: String,
    pub detail: String,
}

/// Record of the degradations the engine took instead of failing. Capped
/// pushes evict the oldest records and count them in `dropped`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticLedger {
    records: Vec<Diagnostic>,
    #[serde(default)]
    dropped: usize,
}

impl DiagnosticLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, record: Diagnostic) {
        self.records.push(record);
    }

    /// Pushes `record`, then drops the oldest records beyond `cap`.
    pub fn push_capped(&mut self, record: Diagnostic, cap: usize) {
        self.records.push(record);
        let excess = self.records.len().saturating_sub(cap);
        if excess > 0 {
            self.records.drain(..excess);
            self.dropped += excess;
        }
    }

    /// Records evicted by [`push_capped`](Self::push_capped) since the
    /// ledger was created or last drained.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    #[must_use]
    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.records
            .iter()
            .filter(|record| record.kind == kind)
            .count()
    }

    pub fn extend(&mut self, other: DiagnosticLedger) {
        self.records.extend(other.records);
        self.dropped += other.dropped;
    }

    /// Drains every record, leaving the ledger empty.
    pub fn take(&mut self) -> DiagnosticLedger {
        std::mem::take(self)
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("max_context_depth must be at least 1")]
    ZeroContextDepth,
    #[error("pair_cache_capacity must be at least 1 when set")]
    ZeroCacheCapacity,
    #[error("max_diagnostics must be at least 1")]
    ZeroDiagnosticCap,
    #[error("invalid policy document: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnginePolicy {
    pub mode: RuntimeMode,
    #[serde(default = "default_max_context_depth")]
    pub max_context_depth: usize,
    #[serde(default)]
    pub pair_cache_capacity: Option<usize>,
    /// Ledger size past which [`EnginePolicy::record`] evicts the oldest
    /// diagnostics.
    #[serde(default = "default_max_diagnostics")]
    pub max_diagnostics: usize,
}

fn default_max_context_depth() -> usize {
    DEFAULT_MAX_CONTEXT_DEPTH
}

fn default_max_diagnostics() -> usize {
    DEFAULT_MAX_DIAGNOSTICS
}

impl EnginePolicy {
    #[must_use]
    pub fn strict() -> Self {
        Self {
            mode: RuntimeMode::Strict,
            max_context_depth: DEFAULT_MAX_CONTEXT_DEPTH,
            pair_cache_capacity: None,
            max_diagnostics: DEFAULT_MAX_DIAGNOSTICS,
        }
    }

    #[must_use]
    pub fn hardened() -> Self {
        Self {
            mode: RuntimeMode::Hardened,
            max_context_depth: DEFAULT_MAX_CONTEXT_DEPTH,
            pair_cache_capacity: None,
            max_diagnostics: DEFAULT_MAX_DIAGNOSTICS,
        }
    }

    #[must_use]
    pub fn with_max_context_depth(mut self, depth: usize) -> Self {
        self.max_context_depth = depth;
        self
    }

    #[must_use]
    pub fn with_pair_cache_capacity(mut self, capacity: Option<usize>) -> Self {
        self.pair_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_max_diagnostics(mut self, cap: usize) -> Self {
        self.max_diagnostics = cap;
        self
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.mode == RuntimeMode::Strict
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_context_depth == 0 {
            return Err(PolicyError::ZeroContextDepth);
        }
        if self.pair_cache_capacity == Some(0) {
            return Err(PolicyError::ZeroCacheCapacity);
        }
        if self.max_diagnostics == 0 {
            return Err(PolicyError::ZeroDiagnosticCap);
        }
        Ok(())
    }

    /// Loads and validates a policy from a JSON document such as
    /// `{"mode": "strict", "max_context_depth": 5}`.
    pub fn from_json(document: &str) -> Result<Self, PolicyError> {
        let policy: Self = serde_json::from_str(document)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Records a degradation and emits it as a `tracing` event when the
    /// feature is enabled. The ledger keeps at most `max_diagnostics`
    /// records.
    pub fn record(
        &self,
        kind: DiagnosticKind,
        subject: impl Into<String>,
        detail: impl Into<String>,
        ledger: &mut DiagnosticLedger,
    ) {
        let record = Diagnostic {
            ts_unix_ms: now_unix_ms().unwrap_or_default(),
            mode: self.mode,
            kind,
            subject: subject.into(),
            detail: detail.into(),
        };
        #[cfg(feature = "tracing")]
        match kind {
            DiagnosticKind::TokenizationFailure | DiagnosticKind::RecursionGuard => {
                tracing::warn!(
                    kind = ?record.kind,
                    subject = %record.subject,
                    detail = %record.detail,
                    "filterquery degraded"
                );
            }
            DiagnosticKind::SkippedCharacter | DiagnosticKind::CacheFlush => {
                tracing::debug!(
                    kind = ?record.kind,
                    subject = %record.subject,
                    detail = %record.detail,
                    "filterquery diagnostic"
                );
            }
        }
        ledger.push_capped(record, self.max_diagnostics.max(1));
    }
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self::hardened()
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("system clock is before UNIX_EPOCH")]
    ClockSkew,
}

fn now_unix_ms() -> Result<u64, RuntimeError> {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| RuntimeError::ClockSkew)?
        .as_millis();
    Ok(ms as u64)
}
