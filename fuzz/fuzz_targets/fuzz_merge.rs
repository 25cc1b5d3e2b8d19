#![no_main]

use filterquery::{Engine, FilterItem, FilterTree};
use libfuzzer_sys::fuzz_target;

const OPERATORS: [&str; 8] = ["=", "!=", "in", "not in", "nin", "like", "exists", "between"];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let Ok(text) = std::str::from_utf8(rest) else {
        return;
    };
    let (existing, value) = text.split_once('\n').unwrap_or((text, "x"));
    let engine = Engine::default();

    // Filters built from the clauses already in the text plus one fuzzed item.
    let mut items = engine.convert_expression_to_filters(existing);
    let key = items
        .first()
        .and_then(FilterItem::key_name)
        .unwrap_or("fuzz.key")
        .to_owned();
    let op = OPERATORS[usize::from(selector) % OPERATORS.len()];
    items.push(FilterItem::new(key, op, vec![value, value]));

    let merged = engine.merge(&FilterTree::new(items), Some(existing));
    let again = engine.merge(&merged.filters, Some(&merged.filter.expression));
    let _ = engine.remove_keys(&again.filter.expression, &["fuzz.key"], false);
});
