//! Token-kind predicates used by the extractor and the cursor resolver.

use fq_types::TokenKind;

#[must_use]
pub fn is_key(kind: TokenKind) -> bool {
    kind == TokenKind::Key
}

/// Comparison and keyword operators. `NOT` is classified separately by
/// [`is_negation`].
#[must_use]
pub fn is_operator(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Equals
            | TokenKind::NotEquals
            | TokenKind::Neq
            | TokenKind::Lt
            | TokenKind::Le
            | TokenKind::Gt
            | TokenKind::Ge
            | TokenKind::Like
            | TokenKind::ILike
            | TokenKind::Between
            | TokenKind::Exists
            | TokenKind::Regexp
            | TokenKind::Contains
            | TokenKind::In
    )
}

#[must_use]
pub fn is_non_value_operator(kind: TokenKind) -> bool {
    kind == TokenKind::Exists
}

#[must_use]
pub fn is_multi_value_operator(kind: TokenKind) -> bool {
    kind == TokenKind::In
}

#[must_use]
pub fn is_negation(kind: TokenKind) -> bool {
    kind == TokenKind::Not
}

/// Literal values. A `Key` token in value position is also a value (bare
/// identifiers and `$variables`); that decision belongs to the extractor.
#[must_use]
pub fn is_value(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::QuotedText | TokenKind::Number | TokenKind::Bool
    )
}

#[must_use]
pub fn is_conjunction(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::And | TokenKind::Or)
}

#[must_use]
pub fn is_open_bracket(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::LBrack | TokenKind::LParen)
}

#[must_use]
pub fn is_close_bracket(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::RBrack | TokenKind::RParen)
}

#[must_use]
pub fn is_bracket(kind: TokenKind) -> bool {
    is_open_bracket(kind) || is_close_bracket(kind)
}

#[must_use]
pub fn is_function(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Has | TokenKind::HasAny | TokenKind::HasAll | TokenKind::HasToken
    )
}
