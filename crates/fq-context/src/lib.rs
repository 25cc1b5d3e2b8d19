#![forbid(unsafe_code)]

mod role;

use fq_lexer::{LexError, is_bracket, significant, tokenize_with_policy};
use fq_pairs::{current_query_pair, extract_from_tokens, value_index_at_cursor};
use fq_runtime::{DiagnosticKind, DiagnosticLedger, EnginePolicy};
use fq_types::{Operator, QueryPair, Span, Token, TokenKind};
use serde::{Deserialize, Serialize};

pub use role::Role;

/// What the caret is on, plus the pair it belongs to.
///
/// `key_token`, `operator_token` and `value_token` are copied from
/// `current_pair` so they never disagree with extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    pub role: Role,
    pub cursor: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_token: Option<String>,
    #[serde(default)]
    pub query_pairs: Vec<QueryPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_pair: Option<QueryPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_index: Option<usize>,
    /// Set when resolution gave up and fell back to a plain `Key` context.
    #[serde(default)]
    pub degraded: bool,
}

impl QueryContext {
    fn key_at(cursor: usize, query_pairs: Vec<QueryPair>) -> Self {
        Self {
            role: Role::Key,
            cursor,
            token: None,
            key_token: None,
            operator_token: None,
            value_token: None,
            query_pairs,
            current_pair: None,
            value_index: None,
            degraded: false,
        }
    }

    /// Default `Key` context returned when resolution cannot proceed.
    #[must_use]
    pub fn degraded(cursor: usize) -> Self {
        Self {
            degraded: true,
            ..Self::key_at(cursor, Vec::new())
        }
    }

    #[must_use]
    pub fn is_in_key(&self) -> bool {
        self.role == Role::Key
    }

    #[must_use]
    pub fn is_in_negation(&self) -> bool {
        self.role == Role::Negation
    }

    #[must_use]
    pub fn is_in_operator(&self) -> bool {
        self.role == Role::Operator
    }

    #[must_use]
    pub fn is_in_value(&self) -> bool {
        self.role == Role::Value
    }

    #[must_use]
    pub fn is_in_bracket_list(&self) -> bool {
        self.role == Role::BracketList
    }

    #[must_use]
    pub fn is_in_parenthesis(&self) -> bool {
        self.role == Role::Parenthesis
    }

    #[must_use]
    pub fn is_in_conjunction(&self) -> bool {
        self.role == Role::Conjunction
    }
}

struct Hit<'a> {
    role: Role,
    token: Option<&'a Token>,
    value_index: Option<usize>,
}

impl<'a> Hit<'a> {
    fn new(role: Role, token: Option<&'a Token>) -> Self {
        Self {
            role,
            token,
            value_index: None,
        }
    }
}

fn followed_by_ws(chars: &[char], cursor: usize) -> bool {
    chars.get(cursor).is_some_and(|c| c.is_whitespace())
}

/// `start <= cursor <= end + 1`, except that the offset just past the end
/// belongs to the next role when whitespace follows or the span is sealed.
fn on_span(span: Span, cursor: usize, chars: &[char], sealed: bool) -> bool {
    if cursor < span.start || cursor > span.end + 1 {
        return false;
    }
    !(cursor == span.end + 1 && (sealed || followed_by_ws(chars, cursor)))
}

fn token_starting_at<'a>(sig: &[&'a Token], start: usize) -> Option<&'a Token> {
    sig.iter().copied().find(|token| token.start == start)
}

/// Last offset covered by `pair` for containment purposes. An incomplete
/// trailing pair stretches over the whitespace after it; an unterminated
/// list runs to the end of the text.
fn extended_end(pair: &QueryPair, is_last: bool, chars: &[char]) -> usize {
    let position = &pair.position;
    if position.value_start.is_some() && position.value_end.is_none() {
        return chars.len().saturating_sub(1).max(position.end());
    }
    let mut end = position.end();
    if is_last && !pair.is_complete {
        while followed_by_ws(chars, end + 1) {
            end += 1;
        }
    }
    end
}

/// Right-most pair whose extended span contains the cursor, else the
/// right-most pair ending before it. The flag tells which rule matched.
fn locate_current_pair<'a>(
    pairs: &'a [QueryPair],
    query: &str,
    chars: &[char],
    cursor: usize,
) -> Option<(&'a QueryPair, bool)> {
    let last = pairs.len().checked_sub(1);
    let containing = pairs.iter().enumerate().rev().find(|(idx, pair)| {
        let end = extended_end(pair, Some(*idx) == last, chars);
        pair.position.start() <= cursor && cursor <= end + 1
    });
    if let Some((_, pair)) = containing {
        return Some((pair, true));
    }
    current_query_pair(pairs, query, cursor).map(|pair| (pair, false))
}

fn list_index(values_position: &[Span], cursor: usize) -> Option<usize> {
    value_index_at_cursor(values_position, cursor).or_else(|| {
        cursor
            .checked_sub(1)
            .and_then(|before| value_index_at_cursor(values_position, before))
    })
}

fn on_pair_boundary<'a>(
    pair: &QueryPair,
    sig: &[&'a Token],
    chars: &[char],
    cursor: usize,
) -> Option<Hit<'a>> {
    let position = &pair.position;
    let key_span = position.key_span();
    if on_span(key_span, cursor, chars, false) {
        return Some(Hit::new(Role::Key, token_starting_at(sig, key_span.start)));
    }
    if let Some(span) = position.negation_span()
        && on_span(span, cursor, chars, false)
    {
        return Some(Hit::new(Role::Negation, token_starting_at(sig, span.start)));
    }
    if let Some(span) = position.operator_span()
        && on_span(span, cursor, chars, false)
    {
        // A function name sits where a key would.
        let is_function = Operator::parse(&pair.operator).is_ok_and(|(_, op)| op.is_function());
        let role = if is_function { Role::Key } else { Role::Operator };
        return Some(Hit::new(role, token_starting_at(sig, span.start)));
    }

    let value_start = position.value_start?;
    let open = token_starting_at(sig, value_start)
        .filter(|token| matches!(token.kind, TokenKind::LBrack | TokenKind::LParen));
    if let Some(open) = open {
        let close = position.value_end.unwrap_or(chars.len());
        if cursor == value_start {
            return Some(Hit::new(Role::Value, Some(open)));
        }
        if value_start < cursor && cursor <= close {
            let value_index = list_index(&pair.values_position, cursor);
            let token = value_index
                .and_then(|idx| pair.values_position.get(idx))
                .and_then(|span| token_starting_at(sig, span.start));
            return Some(Hit {
                role: Role::BracketList,
                token,
                value_index,
            });
        }
        return None;
    }

    let span = position.value_span()?;
    if on_span(span, cursor, chars, pair.is_complete) {
        let mut hit = Hit::new(Role::Value, token_starting_at(sig, span.start));
        if pair.is_multi_value {
            hit.value_index = list_index(&pair.values_position, cursor);
        }
        return Some(hit);
    }
    None
}

/// A token outside every pair that the caret is on. The offset just past a
/// token counts only while the token can still grow.
fn on_loose_token<'a>(
    sig: &[&'a Token],
    pairs: &[QueryPair],
    chars: &[char],
    cursor: usize,
) -> Option<&'a Token> {
    let in_pair = |token: &Token| {
        pairs
            .iter()
            .any(|pair| pair.position.start() <= token.start && token.start <= pair.position.end())
    };
    sig.iter().rev().copied().find(|&token| {
        if in_pair(token) || cursor < token.start {
            return false;
        }
        if cursor <= token.stop {
            return true;
        }
        let grows = !is_bracket(token.kind) && token.kind != TokenKind::Comma && !token.is_sealed();
        cursor == token.stop + 1 && grows && !followed_by_ws(chars, cursor)
    })
}

fn repair(query: &str, err: &LexError) -> String {
    match err {
        LexError::UnterminatedQuote { quote, .. } => format!("{query}{quote}"),
        LexError::UnexpectedChar { offset, .. } => query
            .chars()
            .enumerate()
            .map(|(idx, c)| if idx == *offset { ' ' } else { c })
            .collect(),
    }
}

fn resolve_at_depth(
    query: &str,
    cursor: usize,
    policy: &EnginePolicy,
    ledger: &mut DiagnosticLedger,
    depth: usize,
) -> QueryContext {
    if depth > policy.max_context_depth {
        policy.record(
            DiagnosticKind::RecursionGuard,
            query,
            format!("depth {depth} exceeds {}", policy.max_context_depth),
            ledger,
        );
        return QueryContext::degraded(cursor);
    }

    let tokens = match tokenize_with_policy(query, policy, ledger) {
        Ok(tokens) => tokens,
        Err(err) => {
            policy.record(DiagnosticKind::TokenizationFailure, query, err.to_string(), ledger);
            let repaired = repair(query, &err);
            return resolve_at_depth(&repaired, cursor, policy, ledger, depth + 1);
        }
    };

    let chars: Vec<char> = query.chars().collect();
    let cursor = cursor.min(chars.len());
    let pairs = extract_from_tokens(query, &tokens);
    let sig = significant(&tokens);
    let current = locate_current_pair(&pairs, query, &chars, cursor);

    let hit = current
        .and_then(|(pair, _)| on_pair_boundary(pair, &sig, &chars, cursor))
        .or_else(|| {
            on_loose_token(&sig, &pairs, &chars, cursor)
                .map(|token| Hit::new(Role::of_token(token.kind), Some(token)))
        })
        .or_else(|| {
            sig.iter()
                .rev()
                .copied()
                .find(|token| token.stop < cursor)
                .map(|token| Hit::new(Role::after_token(token.kind), Some(token)))
        });

    let Some(hit) = hit else {
        return QueryContext::key_at(cursor, pairs);
    };

    let current_pair = current.map(|(pair, _)| pair.clone());
    let describe_pair = current.is_some_and(|(_, contains)| contains) || hit.role != Role::Key;
    let (key_token, operator_token, value_token) = match current_pair.as_ref() {
        Some(pair) if describe_pair => (
            Some(pair.key.clone()).filter(|key| !key.is_empty()),
            Some(pair.operator.clone()).filter(|op| !op.is_empty()),
            pair.value.clone(),
        ),
        _ => (None, None, None),
    };

    QueryContext {
        role: hit.role,
        cursor,
        token: hit.token.cloned(),
        key_token,
        operator_token,
        value_token,
        query_pairs: pairs,
        current_pair,
        value_index: hit.value_index,
        degraded: false,
    }
}

/// Resolves the role at `cursor` (a character offset, clamped to the text).
///
/// Text the lexer rejects is repaired and retried: an unterminated quote is
/// closed, and in strict mode an unexpected character is blanked. The
/// returned pairs describe the repaired text. Past
/// `policy.max_context_depth` retries the result is a degraded `Key`
/// context.
pub fn resolve_context_with_policy(
    query: &str,
    cursor: usize,
    policy: &EnginePolicy,
    ledger: &mut DiagnosticLedger,
) -> QueryContext {
    resolve_at_depth(query, cursor, policy, ledger, 0)
}

#[must_use]
pub fn resolve_context(query: &str, cursor: usize) -> QueryContext {
    let mut ledger = DiagnosticLedger::new();
    resolve_context_with_policy(query, cursor, &EnginePolicy::default(), &mut ledger)
}
