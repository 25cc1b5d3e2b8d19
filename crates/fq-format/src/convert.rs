use fq_pairs::extract_with_policy;
use fq_runtime::{DiagnosticLedger, EnginePolicy};
use fq_types::{
    FilterExpression, FilterItem, FilterKey, FilterTree, FilterValue, Operator, QUERY_FUNCTIONS,
    QueryPair, canonical_operator, is_non_value_operator, split_negation, structured_operator,
};
use uuid::Uuid;

use crate::value::{format_between, format_value, literal_to_value};

fn function_name(op: &str) -> Option<&'static str> {
    QUERY_FUNCTIONS
        .iter()
        .find(|name| name.eq_ignore_ascii_case(op))
        .copied()
}

/// Renders one structured item as a DSL clause. Items without a key render
/// nothing.
#[must_use]
pub fn render_item(item: &FilterItem) -> Option<String> {
    let key = item.key_name()?;
    let op = canonical_operator(&item.op);

    if is_non_value_operator(&op) {
        return Some(format!("{key} {op}"));
    }

    let (negated, base) = split_negation(&op);
    if let Some(function) = function_name(base) {
        let prefix = if negated { "NOT " } else { "" };
        let value = format_value(&item.value, base);
        return Some(format!("{prefix}{function}({key}, {value})"));
    }

    if matches!(Operator::parse(&op), Ok((_, Operator::Between)))
        && let Some(bounds) = format_between(&item.value)
    {
        return Some(format!("{key} {op} {bounds}"));
    }

    Some(format!("{key} {op} {}", format_value(&item.value, &op)))
}

/// Renders a structured filter tree as one `AND`-joined expression.
#[must_use]
pub fn convert_filters_to_expression(tree: &FilterTree) -> FilterExpression {
    let clauses: Vec<String> = tree.items.iter().filter_map(render_item).collect();
    FilterExpression::new(clauses.join(" AND "))
}

/// Builds a structured item from an extracted pair: a fresh id, the operator
/// in structured spelling with any `NOT` folded in, and typed values.
#[must_use]
pub fn pair_to_filter_item(pair: &QueryPair) -> FilterItem {
    let op = structured_operator(&pair.operator, pair.has_negation);
    let value = if is_non_value_operator(&op) {
        FilterValue::default()
    } else if pair.is_multi_value {
        FilterValue::List(pair.value_list.iter().map(|v| literal_to_value(v)).collect())
    } else {
        pair.value
            .as_deref()
            .map(literal_to_value)
            .unwrap_or_default()
    };
    FilterItem {
        id: Uuid::new_v4().to_string(),
        key: Some(FilterKey::new(pair.key.clone())),
        op,
        value,
    }
}

/// Parses `expression` and converts every complete pair into a structured
/// item, in text order.
pub fn convert_expression_to_filters_with_policy(
    expression: &str,
    policy: &EnginePolicy,
    ledger: &mut DiagnosticLedger,
) -> Vec<FilterItem> {
    extract_with_policy(expression, policy, ledger)
        .iter()
        .filter(|pair| pair.is_complete)
        .map(pair_to_filter_item)
        .collect()
}

#[must_use]
pub fn convert_expression_to_filters(expression: &str) -> Vec<FilterItem> {
    let mut ledger = DiagnosticLedger::new();
    convert_expression_to_filters_with_policy(expression, &EnginePolicy::default(), &mut ledger)
}
