use fq_lexer::{
    is_close_bracket, is_conjunction, is_function, is_key, is_negation, is_non_value_operator,
    is_open_bracket, is_operator, is_value,
};
use fq_types::TokenKind;
use serde::{Deserialize, Serialize};

/// Grammatical role of the text under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Key,
    Negation,
    Operator,
    Value,
    BracketList,
    Parenthesis,
    Conjunction,
    Unknown,
}

impl Role {
    /// The clause cycle `Key -> Operator -> Value -> Conjunction -> Key`,
    /// with `NOT` slotting in before the operator.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Key | Self::Negation => Self::Operator,
            Self::Operator => Self::Value,
            Self::Value | Self::BracketList => Self::Conjunction,
            Self::Conjunction | Self::Parenthesis => Self::Key,
            Self::Unknown => Self::Unknown,
        }
    }

    /// Role of a cursor sitting on a token of `kind`.
    #[must_use]
    pub fn of_token(kind: TokenKind) -> Self {
        if is_key(kind) || is_function(kind) {
            Self::Key
        } else if is_negation(kind) {
            Self::Negation
        } else if is_operator(kind) {
            Self::Operator
        } else if is_value(kind) {
            Self::Value
        } else if is_conjunction(kind) {
            Self::Conjunction
        } else if is_open_bracket(kind) || is_close_bracket(kind) {
            Self::Parenthesis
        } else {
            Self::Unknown
        }
    }

    /// Role expected once a token of `kind` is finished.
    #[must_use]
    pub fn after_token(kind: TokenKind) -> Self {
        match kind {
            kind if is_non_value_operator(kind) => Self::Conjunction,
            kind if is_function(kind) => Self::Parenthesis,
            TokenKind::LParen => Self::Key,
            TokenKind::LBrack => Self::BracketList,
            TokenKind::Comma => Self::Value,
            TokenKind::RParen | TokenKind::RBrack => Self::Conjunction,
            kind => Self::of_token(kind).next(),
        }
    }
}
