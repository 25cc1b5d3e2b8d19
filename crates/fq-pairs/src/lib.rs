#![forbid(unsafe_code)]

mod cache;
mod map;

use fq_lexer::{
    LexError, is_close_bracket, is_conjunction, is_function, is_multi_value_operator,
    is_negation, is_non_value_operator, is_open_bracket, is_operator, is_value,
    tokenize_with_policy,
};
use fq_runtime::{DiagnosticKind, DiagnosticLedger, EnginePolicy};
use fq_types::{Operator, Position, QueryPair, Span, Token, TokenKind, pair_operator_key};

pub use cache::PairCache;
pub use map::PairMap;

/// Pair under construction during the single extraction pass.
struct OpenPair {
    pair: QueryPair,
    operator_kind: Option<TokenKind>,
}

impl OpenPair {
    fn new(key: &Token) -> Self {
        Self {
            pair: QueryPair {
                key: key.text.clone(),
                position: Position {
                    key_start: key.start,
                    key_end: key.stop,
                    ..Position::default()
                },
                ..QueryPair::default()
            },
            operator_kind: None,
        }
    }

    fn has_operator(&self) -> bool {
        self.operator_kind.is_some()
    }

    /// Has key and operator, still lacks a value, and the operator takes one.
    fn takes_value(&self) -> bool {
        matches!(self.operator_kind, Some(kind) if !is_non_value_operator(kind))
            && self.pair.value.is_none()
    }

    fn set_value(&mut self, token: &Token) {
        self.pair.value = Some(token.text.clone());
        self.pair.position.value_start = Some(token.start);
        self.pair.position.value_end = Some(token.stop);
    }

    fn finish(mut self) -> QueryPair {
        let non_value = self.operator_kind.is_some_and(is_non_value_operator);
        self.pair.is_complete = !self.pair.key.is_empty()
            && self.has_operator()
            && (self.pair.value.is_some() || non_value);
        self.pair
    }
}

/// Bracketed list scanned from an opening bracket to its matching close.
struct ListScan {
    items: Vec<(String, Span)>,
    open: usize,
    close: Option<usize>,
    /// Index of the first token after the list.
    next: usize,
}

/// A `Key` inside a list or in value position counts as a value: bare
/// identifiers and `$variables` are both legal there.
fn is_list_value(kind: TokenKind) -> bool {
    is_value(kind) || kind == TokenKind::Key
}

fn scan_list(tokens: &[&Token], open_idx: usize) -> ListScan {
    let open = tokens[open_idx].start;
    let mut depth = 0usize;
    let mut items = Vec::new();
    let mut idx = open_idx;
    while idx < tokens.len() {
        let token = tokens[idx];
        if is_open_bracket(token.kind) {
            depth += 1;
        } else if is_close_bracket(token.kind) {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return ListScan {
                    items,
                    open,
                    close: Some(token.stop),
                    next: idx + 1,
                };
            }
        } else if is_list_value(token.kind) {
            items.push((token.text.clone(), Span::new(token.start, token.stop)));
        }
        idx += 1;
    }
    ListScan {
        items,
        open,
        close: None,
        next: idx,
    }
}

fn substring(chars: &[char], start: usize, end: usize) -> String {
    chars
        .get(start..=end.min(chars.len().saturating_sub(1)))
        .map(|slice| slice.iter().collect())
        .unwrap_or_default()
}

/// Writes a scanned list into `pair`. An unterminated list keeps its items
/// and opening offset but leaves `value` unset.
fn apply_list(pair: &mut QueryPair, scan: ListScan, chars: &[char]) {
    pair.is_multi_value = true;
    pair.position.value_start = Some(scan.open);
    if let Some(close) = scan.close {
        pair.value = Some(substring(chars, scan.open, close));
        pair.position.value_end = Some(close);
    }
    let (values, spans): (Vec<_>, Vec<_>) = scan.items.into_iter().unzip();
    pair.value_list = values;
    pair.values_position = spans;
}

fn apply_single_list_value(pair: &mut QueryPair, token: &Token) {
    pair.is_multi_value = true;
    pair.value = Some(token.text.clone());
    pair.value_list = vec![token.text.clone()];
    pair.values_position = vec![Span::new(token.start, token.stop)];
    pair.position.value_start = Some(token.start);
    pair.position.value_end = Some(token.stop);
}

/// Consumes the value side of an `IN` operator starting at `idx`; returns the
/// index to continue from.
fn consume_multi_value(open: &mut OpenPair, tokens: &[&Token], idx: usize, chars: &[char]) -> usize {
    match tokens.get(idx) {
        Some(next) if is_open_bracket(next.kind) => {
            let scan = scan_list(tokens, idx);
            let resume = scan.next;
            apply_list(&mut open.pair, scan, chars);
            resume
        }
        Some(next) if is_list_value(next.kind) => {
            apply_single_list_value(&mut open.pair, next);
            idx + 1
        }
        _ => idx,
    }
}

/// `BETWEEN low AND high`: the conjunction belongs to the value, not to the
/// clause list.
fn consume_between(open: &mut OpenPair, tokens: &[&Token], idx: usize, chars: &[char]) -> usize {
    let (Some(low), Some(and), Some(high)) = (tokens.get(idx), tokens.get(idx + 1), tokens.get(idx + 2))
    else {
        return idx;
    };
    if !is_list_value(low.kind) || and.kind != TokenKind::And || !is_list_value(high.kind) {
        return idx;
    }
    let pair = &mut open.pair;
    pair.is_multi_value = true;
    pair.value = Some(substring(chars, low.start, high.stop));
    pair.value_list = vec![low.text.clone(), high.text.clone()];
    pair.values_position = vec![Span::new(low.start, low.stop), Span::new(high.start, high.stop)];
    pair.position.value_start = Some(low.start);
    pair.position.value_end = Some(high.stop);
    idx + 3
}

/// `[NOT] fn(key, value)`; returns the finished pair (if a key was found) and
/// the index to continue from.
fn consume_function(
    tokens: &[&Token],
    idx: usize,
    negation: Option<Span>,
    chars: &[char],
) -> (Option<QueryPair>, usize) {
    let function = tokens[idx];
    let mut cursor = idx + 1;
    if !tokens.get(cursor).is_some_and(|t| t.kind == TokenKind::LParen) {
        return (None, cursor);
    }
    cursor += 1;
    let Some(key) = tokens.get(cursor).filter(|t| t.kind == TokenKind::Key) else {
        return (None, cursor);
    };
    cursor += 1;

    let mut open = OpenPair::new(key);
    open.operator_kind = Some(function.kind);
    open.pair.operator = function.text.clone();
    open.pair.position.operator_start = Some(function.start);
    open.pair.position.operator_end = Some(function.stop);
    if let Some(span) = negation {
        open.pair.has_negation = true;
        open.pair.position.negation_start = Some(span.start);
        open.pair.position.negation_end = Some(span.end);
    }

    if tokens.get(cursor).is_some_and(|t| t.kind == TokenKind::Comma) {
        cursor += 1;
        match tokens.get(cursor) {
            Some(next) if next.kind == TokenKind::LBrack => {
                let scan = scan_list(tokens, cursor);
                cursor = scan.next;
                apply_list(&mut open.pair, scan, chars);
            }
            Some(next) if is_list_value(next.kind) => {
                open.set_value(next);
                cursor += 1;
            }
            _ => {}
        }
    }
    if tokens.get(cursor).is_some_and(|t| t.kind == TokenKind::RParen) {
        cursor += 1;
    }
    (Some(open.finish()), cursor)
}

/// Builds query pairs from an already-lexed token stream of `query`.
#[must_use]
pub fn extract_from_tokens(query: &str, tokens: &[Token]) -> Vec<QueryPair> {
    let chars: Vec<char> = query.chars().collect();
    let sig = fq_lexer::significant(tokens);
    let mut pairs = Vec::new();
    let mut open: Option<OpenPair> = None;
    let mut pending_negation: Option<Span> = None;
    let mut idx = 0;

    while idx < sig.len() {
        let token = sig[idx];
        idx += 1;
        match token.kind {
            TokenKind::Key => {
                if let Some(current) = open.as_mut().filter(|current| current.takes_value()) {
                    current.set_value(token);
                    continue;
                }
                if let Some(previous) = open.take() {
                    pairs.push(previous.finish());
                }
                pending_negation = None;
                open = Some(OpenPair::new(token));
            }
            kind if is_negation(kind) => match open.as_mut() {
                Some(current) if !current.has_operator() => {
                    current.pair.has_negation = true;
                    current.pair.position.negation_start = Some(token.start);
                    current.pair.position.negation_end = Some(token.stop);
                }
                _ => pending_negation = Some(Span::new(token.start, token.stop)),
            },
            kind if is_operator(kind) => {
                let Some(current) = open.as_mut().filter(|current| !current.has_operator()) else {
                    continue;
                };
                current.operator_kind = Some(kind);
                current.pair.operator = token.text.clone();
                current.pair.position.operator_start = Some(token.start);
                current.pair.position.operator_end = Some(token.stop);
                if is_multi_value_operator(kind) {
                    idx = consume_multi_value(current, &sig, idx, &chars);
                } else if kind == TokenKind::Between {
                    idx = consume_between(current, &sig, idx, &chars);
                }
            }
            kind if is_value(kind) => {
                if let Some(current) = open.as_mut().filter(|current| current.takes_value()) {
                    current.set_value(token);
                }
            }
            kind if is_conjunction(kind) => {
                if let Some(previous) = open.take() {
                    pairs.push(previous.finish());
                }
                pending_negation = None;
            }
            kind if is_function(kind) => {
                if let Some(previous) = open.take() {
                    pairs.push(previous.finish());
                }
                let (pair, resume) = consume_function(&sig, idx - 1, pending_negation.take(), &chars);
                pairs.extend(pair);
                idx = resume;
            }
            _ => {}
        }
    }
    if let Some(previous) = open.take() {
        pairs.push(previous.finish());
    }
    pairs
}

/// Extracts query pairs under `policy`. Tokenization failures are recorded
/// in `ledger` and yield no pairs.
pub fn extract_with_policy(
    query: &str,
    policy: &EnginePolicy,
    ledger: &mut DiagnosticLedger,
) -> Vec<QueryPair> {
    match tokenize_with_policy(query, policy, ledger) {
        Ok(tokens) => extract_from_tokens(query, &tokens),
        Err(err) => {
            record_lex_failure(query, &err, policy, ledger);
            Vec::new()
        }
    }
}

fn record_lex_failure(query: &str, err: &LexError, policy: &EnginePolicy, ledger: &mut DiagnosticLedger) {
    policy.record(
        DiagnosticKind::TokenizationFailure,
        query,
        err.to_string(),
        ledger,
    );
}

/// Extracts query pairs with the default (hardened) policy.
#[must_use]
pub fn extract_query_pairs(query: &str) -> Vec<QueryPair> {
    let mut ledger = DiagnosticLedger::new();
    extract_with_policy(query, &EnginePolicy::default(), &mut ledger)
}

/// Normalised lookup key for a pair: `"key-op"`, or `"key-not op"` when the
/// pair carries a lexed `NOT`. A negated comparison keys as its complement
/// (`a NOT = 1` gives `"a-!="`), matching the structured item it converts to.
#[must_use]
pub fn query_pair_map_key(pair: &QueryPair) -> String {
    let op = pair_operator_key(&pair.operator);
    let raw = if pair.has_negation {
        match Operator::parse(&op).ok().and_then(|(_, base)| base.complement()) {
            Some(flipped) => format!("{}-{}", pair.key, flipped.structured_name()),
            None => format!("{}-not {op}", pair.key),
        }
    } else {
        format!("{}-{op}", pair.key)
    };
    raw.trim().to_lowercase()
}

/// Lookup key for a structured filter's key and operator, comparable with
/// [`query_pair_map_key`].
#[must_use]
pub fn filter_map_key(key: &str, op: &str) -> String {
    format!("{key}-{}", pair_operator_key(op))
        .trim()
        .to_lowercase()
}

/// Right-most pair that ends at or before `cursor`. With no such pair, a
/// cursor at the end of the text falls back to the last pair; a cursor at
/// offset zero has none.
#[must_use]
pub fn current_query_pair<'a>(
    pairs: &'a [QueryPair],
    query: &str,
    cursor: usize,
) -> Option<&'a QueryPair> {
    let mut best: Option<&QueryPair> = None;
    for pair in pairs {
        let end = pair.position.end();
        if end <= cursor && best.is_none_or(|b| end > b.position.end()) {
            best = Some(pair);
        }
    }
    if best.is_some() {
        return best;
    }
    if cursor == 0 {
        return None;
    }
    if cursor >= query.chars().count() {
        return pairs.last();
    }
    None
}

/// Index of the list element whose (inclusive) span contains `cursor`.
#[must_use]
pub fn value_index_at_cursor(values_position: &[Span], cursor: usize) -> Option<usize> {
    values_position.iter().position(|span| span.contains(cursor))
}
