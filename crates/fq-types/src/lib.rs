#![forbid(unsafe_code)]

pub mod operator;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use operator::{
    DEPRECATED_OPERATORS, Operator, OperatorError, QUERY_FUNCTIONS, canonical_operator,
    is_array_operator, is_non_value_operator, pair_operator_key, split_negation,
    structured_operator,
};

/// Lexical category of a token in the filter DSL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    LParen,
    RParen,
    LBrack,
    RBrack,
    Comma,
    Equals,
    NotEquals,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    ILike,
    Between,
    Exists,
    Regexp,
    Contains,
    In,
    Not,
    And,
    Or,
    HasToken,
    Has,
    HasAny,
    HasAll,
    Bool,
    Number,
    QuotedText,
    Key,
    Whitespace,
    FreeText,
    Eof,
}

impl TokenKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::LParen => "LPAREN",
            Self::RParen => "RPAREN",
            Self::LBrack => "LBRACK",
            Self::RBrack => "RBRACK",
            Self::Comma => "COMMA",
            Self::Equals => "EQUALS",
            Self::NotEquals => "NOT_EQUALS",
            Self::Neq => "NEQ",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
            Self::Between => "BETWEEN",
            Self::Exists => "EXISTS",
            Self::Regexp => "REGEXP",
            Self::Contains => "CONTAINS",
            Self::In => "IN",
            Self::Not => "NOT",
            Self::And => "AND",
            Self::Or => "OR",
            Self::HasToken => "HASTOKEN",
            Self::Has => "HAS",
            Self::HasAny => "HASANY",
            Self::HasAll => "HASALL",
            Self::Bool => "BOOL",
            Self::Number => "NUMBER",
            Self::QuotedText => "QUOTED_TEXT",
            Self::Key => "KEY",
            Self::Whitespace => "WS",
            Self::FreeText => "FREETEXT",
            Self::Eof => "EOF",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Channel carrying tokens the parser sees.
pub const DEFAULT_CHANNEL: u8 = 0;
/// Channel carrying whitespace; offsets stay exact but the extractor skips it.
pub const HIDDEN_CHANNEL: u8 = 1;

/// One lexed token. `start` and `stop` are inclusive character offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub stop: usize,
    pub channel: u8,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, text: impl Into<String>, start: usize, stop: usize) -> Self {
        let channel = if kind == TokenKind::Whitespace {
            HIDDEN_CHANNEL
        } else {
            DEFAULT_CHANNEL
        };
        Self {
            kind,
            text: text.into(),
            start,
            stop,
            channel,
        }
    }

    #[must_use]
    pub fn eof(at: usize) -> Self {
        Self::new(TokenKind::Eof, "<EOF>", at, at)
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.channel != DEFAULT_CHANNEL
    }

    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    /// True when this token cannot grow by typing one more character
    /// (a closed quote or a closing bracket).
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::QuotedText | TokenKind::RBrack | TokenKind::RParen
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }
}

/// Source offsets of one query pair. Every offset is inclusive; offsets a
/// pair never reached are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub key_start: usize,
    pub key_end: usize,
    pub operator_start: Option<usize>,
    pub operator_end: Option<usize>,
    pub value_start: Option<usize>,
    pub value_end: Option<usize>,
    pub negation_start: Option<usize>,
    pub negation_end: Option<usize>,
}

impl Position {
    /// First offset of the pair. A leading `NOT` or function name comes
    /// before the key.
    #[must_use]
    pub fn start(&self) -> usize {
        [self.negation_start, self.operator_start]
            .into_iter()
            .flatten()
            .fold(self.key_start, usize::min)
    }

    /// Last recorded offset: value, then operator, then negation, then key.
    #[must_use]
    pub fn end(&self) -> usize {
        self.value_end
            .or(self.operator_end)
            .or(self.negation_end)
            .unwrap_or(self.key_end)
            .max(self.key_end)
    }

    #[must_use]
    pub fn key_span(&self) -> Span {
        Span::new(self.key_start, self.key_end)
    }

    #[must_use]
    pub fn operator_span(&self) -> Option<Span> {
        Some(Span::new(self.operator_start?, self.operator_end?))
    }

    #[must_use]
    pub fn value_span(&self) -> Option<Span> {
        Some(Span::new(self.value_start?, self.value_end?))
    }

    #[must_use]
    pub fn negation_span(&self) -> Option<Span> {
        Some(Span::new(self.negation_start?, self.negation_end?))
    }
}

/// One extracted `key operator value` clause with its source spans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPair {
    pub key: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub value_list: Vec<String>,
    #[serde(default)]
    pub values_position: Vec<Span>,
    pub has_negation: bool,
    pub is_multi_value: bool,
    pub position: Position,
    pub is_complete: bool,
}

impl QueryPair {
    #[must_use]
    pub fn has_operator(&self) -> bool {
        !self.operator.is_empty()
    }

    #[must_use]
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Operator as written, with the negation folded in (`NOT IN`).
    #[must_use]
    pub fn full_operator(&self) -> String {
        if self.has_negation {
            format!("NOT {}", self.operator)
        } else {
            self.operator.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterKey {
    pub key: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
}

impl FilterKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data_type: String::new(),
        }
    }

    #[must_use]
    pub fn with_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }
}

/// Value carried by a structured filter item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// A bound variable such as `$env` is substituted downstream and must
    /// never be quoted.
    #[must_use]
    pub fn is_variable(&self) -> bool {
        match self {
            Self::Str(text) => text.trim().starts_with('$'),
            Self::List(items) => items
                .iter()
                .any(|item| matches!(item, Self::Str(text) if text.trim().starts_with('$'))),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Scalars become a one-element list.
    #[must_use]
    pub fn to_list(&self) -> Vec<FilterValue> {
        match self {
            Self::List(items) => items.clone(),
            other => vec![other.clone()],
        }
    }
}

impl Default for FilterValue {
    fn default() -> Self {
        Self::Str(String::new())
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
            Self::List(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub key: Option<FilterKey>,
    pub op: String,
    #[serde(default)]
    pub value: FilterValue,
}

impl FilterItem {
    #[must_use]
    pub fn new(key: impl Into<String>, op: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            id: String::new(),
            key: Some(FilterKey::new(key)),
            op: op.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// The key text, if present and non-empty.
    #[must_use]
    pub fn key_name(&self) -> Option<&str> {
        self.key
            .as_ref()
            .map(|key| key.key.as_str())
            .filter(|key| !key.is_empty())
    }
}

fn default_combinator() -> String {
    "AND".to_owned()
}

/// Conjunctive list of structured filter items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterTree {
    #[serde(default)]
    pub items: Vec<FilterItem>,
    #[serde(default = "default_combinator")]
    pub op: String,
}

impl FilterTree {
    #[must_use]
    pub fn new(items: Vec<FilterItem>) -> Self {
        Self {
            items,
            op: default_combinator(),
        }
    }
}

impl Default for FilterTree {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterExpression {
    pub expression: String,
}

impl FilterExpression {
    #[must_use]
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}
