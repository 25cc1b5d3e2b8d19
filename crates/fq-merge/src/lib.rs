#![forbid(unsafe_code)]

//! Text-preserving merge of structured filters into a hand-written filter
//! expression.
//!
//! Clauses the user already typed keep their spelling, spacing and order:
//! only value spans that actually change are rewritten, `=`/`!=` clauses
//! are widened in place to `IN`/`NOT IN` when a list arrives for the same
//! key, and filters with no counterpart in the text are appended at the end.

mod edit;
mod remove;

use std::collections::{HashMap, HashSet};

use fq_format::{
    convert_filters_to_expression, format_between, format_value, is_quoted, literal_to_value,
    pair_to_filter_item, unquote,
};
use fq_pairs::{PairCache, PairMap, filter_map_key};
use fq_runtime::{DiagnosticLedger, EnginePolicy};
use fq_types::{
    DEPRECATED_OPERATORS, FilterExpression, FilterItem, FilterTree, FilterValue, Operator,
    QueryPair, is_array_operator, is_non_value_operator, split_negation,
};
use serde::{Deserialize, Serialize};

pub use edit::{Edit, EditList};
pub use remove::{remove_keys_from_expression, remove_keys_from_expression_with_policy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub filters: FilterTree,
    pub filter: FilterExpression,
}

/// Replaces deprecated operator aliases (`nin`, `regex`, ...) with their
/// canonical spelling in lower case. Other operators are left as written.
#[must_use]
pub fn normalize_deprecated_operators(tree: &FilterTree) -> FilterTree {
    let items = tree
        .items
        .iter()
        .map(|item| {
            let lowered = item.op.trim().to_lowercase();
            match DEPRECATED_OPERATORS.iter().find(|(alias, _)| *alias == lowered) {
                Some((_, canonical)) => FilterItem {
                    op: canonical.to_lowercase(),
                    ..item.clone()
                },
                None => item.clone(),
            }
        })
        .collect();
    FilterTree {
        items,
        op: tree.op.clone(),
    }
}

/// Existing clauses an incoming list filter may take over, tried in order.
/// The flag says whether the rewrite starts at the clause's `NOT`.
const IN_SOURCES: &[(&str, bool)] = &[("not in", true), ("=", false), ("!=", false)];
const NOT_IN_SOURCES: &[(&str, bool)] = &[("!=", false)];

#[derive(Debug, Clone, Copy)]
struct Rewrite {
    operator: &'static str,
    start: usize,
}

#[derive(Debug)]
struct Slot {
    pair: QueryPair,
    visited: bool,
    edit: Option<Edit>,
    rewrite: Option<Rewrite>,
}

impl Slot {
    fn set_value(&mut self, formatted: &str, offset: usize) {
        let Some(value_end) = self.pair.position.value_end else {
            return;
        };
        let end = value_end + 1 + offset;
        self.edit = match self.rewrite {
            Some(rewrite) => Some(Edit::replace(
                rewrite.start + offset,
                end,
                format!("{} {formatted}", rewrite.operator),
            )),
            None => self
                .pair
                .position
                .value_start
                .map(|start| Edit::replace(start + offset, end, formatted)),
        };
    }

    fn is_function(&self) -> bool {
        Operator::parse(&self.pair.operator).is_ok_and(|(_, op)| op.is_function())
    }
}

/// Per-call working copy of the pair map. Offsets in `slots` are relative to
/// the trimmed text; `offset` shifts them onto the original.
struct MergeState {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
    offset: usize,
}

impl MergeState {
    fn new(map: &PairMap, offset: usize) -> Self {
        let mut state = Self {
            slots: Vec::with_capacity(map.len()),
            index: HashMap::with_capacity(map.len()),
            offset,
        };
        for (key, pair) in map.iter() {
            state.index.insert(key.to_owned(), state.slots.len());
            state.slots.push(Slot {
                pair: pair.clone(),
                visited: false,
                edit: None,
                rewrite: None,
            });
        }
        state
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Slot> {
        let idx = self.index.get(key).copied()?;
        self.slots.get_mut(idx)
    }

    fn rekey(&mut self, from: &str, to: String) {
        if let Some(idx) = self.index.remove(from) {
            self.index.insert(to, idx);
        }
    }

    fn merge_list_item(&mut self, item: &FilterItem, key: &str) -> bool {
        let formatted = format_value(&item.value, &item.op);
        let own_key = filter_map_key(key, &item.op);
        let offset = self.offset;

        if let Some(slot) = self.slot_mut(&own_key)
            && slot.pair.position.value_span().is_some()
        {
            slot.visited = true;
            if slot.rewrite.is_none() && same_list(&slot.pair.value_list, &item.value) {
                slot.edit = None;
            } else {
                slot.set_value(&formatted, offset);
            }
            return true;
        }

        self.widen(key, &item.op, own_key, &formatted)
    }

    /// Rewrites an existing `=`/`!=`/`NOT IN` clause on `key` into the list
    /// operator `op`.
    fn widen(&mut self, key: &str, op: &str, own_key: String, formatted: &str) -> bool {
        let (negated, _) = split_negation(op);
        let (target, sources) = if negated {
            ("NOT IN", NOT_IN_SOURCES)
        } else {
            ("IN", IN_SOURCES)
        };
        let offset = self.offset;

        for &(source_op, from_negation) in sources {
            let source_key = filter_map_key(key, source_op);
            let Some(slot) = self.slot_mut(&source_key) else {
                continue;
            };
            slot.visited = true;
            let position = slot.pair.position;
            let start = if from_negation || slot.pair.has_negation {
                position.negation_start
            } else {
                position.operator_start
            };
            if let (Some(start), Some(_)) = (start, position.value_end) {
                slot.rewrite = Some(Rewrite {
                    operator: target,
                    start,
                });
                slot.set_value(formatted, offset);
                self.rekey(&source_key, own_key);
            }
            return true;
        }
        false
    }

    fn merge_scalar_item(&mut self, item: &FilterItem, key: &str) -> bool {
        let own_key = filter_map_key(key, &item.op);
        let offset = self.offset;
        let Some(slot) = self.slot_mut(&own_key) else {
            return false;
        };
        slot.visited = true;
        if is_non_value_operator(&item.op) {
            return true;
        }

        let formatted = match Operator::parse(&item.op) {
            Ok((_, Operator::Between)) => format_between(&item.value)
                .unwrap_or_else(|| format_value(&item.value, &item.op)),
            _ => format_value(&item.value, &item.op),
        };

        if slot.pair.position.value_span().is_some() {
            if slot.rewrite.is_none() && encodes_same(slot.pair.value.as_deref(), &item.value) {
                slot.edit = None;
            } else {
                slot.set_value(&formatted, offset);
            }
        } else if !slot.is_function()
            && let Some(operator_end) = slot.pair.position.operator_end
        {
            slot.edit = Some(Edit::insert(operator_end + 1 + offset, format!(" {formatted}")));
        }
        true
    }
}

fn plain_text(value: &FilterValue) -> String {
    match value {
        FilterValue::Str(text) => unquote(text),
        other => other.to_string(),
    }
}

/// Set equality ignoring quoting: order and repeats on either side do not
/// matter.
fn same_list(existing: &[String], incoming: &FilterValue) -> bool {
    let existing: HashSet<String> = existing.iter().map(|value| unquote(value)).collect();
    let incoming: HashSet<String> = incoming.to_list().iter().map(plain_text).collect();
    existing == incoming
}

/// Whether the literal already in the text denotes `incoming`.
fn encodes_same(existing: Option<&str>, incoming: &FilterValue) -> bool {
    let Some(existing) = existing else {
        return false;
    };
    match incoming {
        FilterValue::Str(text) if is_quoted(existing) => unquote(existing) == unquote(text),
        FilterValue::Str(text) => existing == text.trim(),
        FilterValue::List(_) => false,
        scalar => !is_quoted(existing) && literal_to_value(existing) == *scalar,
    }
}

/// Merges `filters` into `existing`, reusing `cache` for the text's pairs.
///
/// Without existing text the tree is simply rendered. Whitespace-only text
/// is returned untouched together with the incoming tree. Otherwise the
/// returned tree holds the incoming items (deprecated operators normalised)
/// followed by every complete clause of the text that no item touched.
/// Incomplete clauses (a key with no operator, or an operator with no
/// value) stay in the text but are never adopted into the tree.
pub fn merge_with_cache(
    filters: &FilterTree,
    existing: Option<&str>,
    cache: &PairCache,
    policy: &EnginePolicy,
    ledger: &mut DiagnosticLedger,
) -> MergeResult {
    let Some(existing) = existing.filter(|text| !text.is_empty()) else {
        let normalized = normalize_deprecated_operators(filters);
        let filter = convert_filters_to_expression(&normalized);
        return MergeResult {
            filters: normalized,
            filter,
        };
    };
    if existing.trim().is_empty() {
        return MergeResult {
            filters: filters.clone(),
            filter: FilterExpression::new(existing),
        };
    }

    let mut normalized = normalize_deprecated_operators(filters);
    let offset = existing.chars().take_while(|c| c.is_whitespace()).count();
    let map = cache.pairs_for(existing, policy, ledger);
    let mut state = MergeState::new(&map, offset);

    let mut unmatched = Vec::new();
    for item in &normalized.items {
        let Some(key) = item.key_name() else {
            continue;
        };
        if item.op.trim().is_empty() {
            continue;
        }
        let merged = if is_array_operator(&item.op) {
            state.merge_list_item(item, key)
        } else {
            state.merge_scalar_item(item, key)
        };
        if !merged {
            unmatched.push(item.clone());
        }
    }

    let adopted: Vec<FilterItem> = state
        .slots
        .iter()
        .filter(|slot| !slot.visited && slot.pair.is_complete)
        .map(|slot| pair_to_filter_item(&slot.pair))
        .collect();
    let edits: EditList = state.slots.into_iter().filter_map(|slot| slot.edit).collect();

    #[cfg(feature = "tracing")]
    tracing::debug!(
        edits = edits.len(),
        appended = unmatched.len(),
        adopted = adopted.len(),
        "merged filters into expression"
    );

    let mut expression = edits.apply(existing);
    if !unmatched.is_empty() {
        let appended = convert_filters_to_expression(&FilterTree {
            items: unmatched,
            op: filters.op.clone(),
        });
        if !appended.expression.is_empty() {
            expression = format!("{} {}", expression.trim(), appended.expression);
        }
    }

    normalized.items.extend(adopted);
    MergeResult {
        filters: normalized,
        filter: FilterExpression::new(expression),
    }
}

/// [`merge_with_cache`] with the default policy and a throwaway cache.
#[must_use]
pub fn merge(filters: &FilterTree, existing: Option<&str>) -> MergeResult {
    let policy = EnginePolicy::default();
    let cache = PairCache::from_policy(&policy);
    let mut ledger = DiagnosticLedger::new();
    merge_with_cache(filters, existing, &cache, &policy, &mut ledger)
}
