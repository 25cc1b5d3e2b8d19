//! Operator vocabulary shared by the extractor, the converters and the merge
//! engine.
//!
//! Structured filters carry operators as free strings (`"in"`, `"NOT IN"`,
//! `"nin"`, ...). Everything here tolerates surrounding whitespace and case.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Legacy operator spellings and their canonical replacements.
pub const DEPRECATED_OPERATORS: &[(&str, &str)] = &[
    ("nin", "NOT IN"),
    ("nlike", "NOT LIKE"),
    ("nilike", "NOT ILIKE"),
    ("nregex", "NOT REGEXP"),
    ("regex", "REGEXP"),
    ("nexists", "NOT EXISTS"),
    ("ncontains", "NOT CONTAINS"),
    ("nhas", "NOT has"),
    ("nhasany", "NOT hasAny"),
    ("nhasall", "NOT hasAll"),
];

/// Function-style predicates, in their rendered casing.
pub const QUERY_FUNCTIONS: &[&str] = &["has", "hasAny", "hasAll", "hasToken"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    ILike,
    Regexp,
    Contains,
    In,
    Exists,
    Between,
    Has,
    HasAny,
    HasAll,
    HasToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperatorError {
    #[error("empty operator")]
    Empty,
    #[error("unknown operator: {0}")]
    Unknown(String),
}

impl Operator {
    /// Parses an operator spelling, returning whether it was negated.
    ///
    /// Deprecated aliases are accepted (`nin` parses as negated `In`).
    pub fn parse(text: &str) -> Result<(bool, Self), OperatorError> {
        let normalized = pair_operator_key(text);
        if normalized.is_empty() {
            return Err(OperatorError::Empty);
        }
        let normalized = match replace_deprecated(&normalized) {
            Some(canonical) => canonical.to_lowercase(),
            None => normalized,
        };
        let (negated, base) = match normalized.strip_prefix("not ") {
            Some(rest) => (true, rest.trim_start()),
            None => (false, normalized.as_str()),
        };
        let op = match base {
            "=" => Self::Equals,
            "!=" => Self::NotEquals,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "like" => Self::Like,
            "ilike" => Self::ILike,
            "regexp" => Self::Regexp,
            "contains" | "contain" => Self::Contains,
            "in" => Self::In,
            "exists" | "exist" => Self::Exists,
            "between" => Self::Between,
            "has" => Self::Has,
            "hasany" => Self::HasAny,
            "hasall" => Self::HasAll,
            "hastoken" => Self::HasToken,
            _ => return Err(OperatorError::Unknown(text.trim().to_owned())),
        };
        Ok((negated, op))
    }

    /// Lower-case name used in the structured filter vocabulary.
    #[must_use]
    pub fn structured_name(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "like",
            Self::ILike => "ilike",
            Self::Regexp => "regexp",
            Self::Contains => "contains",
            Self::In => "in",
            Self::Exists => "exists",
            Self::Between => "between",
            Self::Has => "has",
            Self::HasAny => "hasany",
            Self::HasAll => "hasall",
            Self::HasToken => "hastoken",
        }
    }

    /// Keyword as it is written in the DSL.
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
            Self::Regexp => "REGEXP",
            Self::Contains => "CONTAINS",
            Self::In => "IN",
            Self::Exists => "EXISTS",
            Self::Between => "BETWEEN",
            Self::Has => "has",
            Self::HasAny => "hasAny",
            Self::HasAll => "hasAll",
            Self::HasToken => "hasToken",
            other => other.structured_name(),
        }
    }

    /// Comparison that holds exactly when `self` does not. Only the
    /// comparison operators have one.
    #[must_use]
    pub fn complement(self) -> Option<Self> {
        match self {
            Self::Equals => Some(Self::NotEquals),
            Self::NotEquals => Some(Self::Equals),
            Self::Lt => Some(Self::Ge),
            Self::Le => Some(Self::Gt),
            Self::Gt => Some(Self::Le),
            Self::Ge => Some(Self::Lt),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_array(self) -> bool {
        self == Self::In
    }

    #[must_use]
    pub fn is_non_value(self) -> bool {
        self == Self::Exists
    }

    #[must_use]
    pub fn is_function(self) -> bool {
        matches!(
            self,
            Self::Has | Self::HasAny | Self::HasAll | Self::HasToken
        )
    }
}

fn replace_deprecated(normalized: &str) -> Option<&'static str> {
    DEPRECATED_OPERATORS
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| *canonical)
}

/// Trims and lower-cases an operator, replacing deprecated aliases with
/// their canonical spelling (`"NIN"` becomes `"NOT IN"`, `" In "` becomes
/// `"in"`).
#[must_use]
pub fn canonical_operator(op: &str) -> String {
    let lowered = op.trim().to_lowercase();
    match replace_deprecated(&lowered) {
        Some(canonical) => canonical.to_owned(),
        None => lowered,
    }
}

/// Normal form used when operators are compared or used as map keys:
/// trimmed, lower-cased, inner whitespace collapsed, `==` folded to `=` and
/// `<>` folded to `!=`.
#[must_use]
pub fn pair_operator_key(op: &str) -> String {
    let collapsed = op
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    match collapsed.as_str() {
        "==" => "=".to_owned(),
        "<>" => "!=".to_owned(),
        _ => collapsed,
    }
}

#[must_use]
pub fn is_array_operator(op: &str) -> bool {
    matches!(pair_operator_key(op).as_str(), "in" | "not in")
}

#[must_use]
pub fn is_non_value_operator(op: &str) -> bool {
    matches!(Operator::parse(op), Ok((_, Operator::Exists)))
}

/// Splits a leading `NOT` off an operator: `"NOT IN"` gives `(true, "IN")`.
#[must_use]
pub fn split_negation(op: &str) -> (bool, &str) {
    let trimmed = op.trim();
    match trimmed.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("not ") => (true, trimmed[4..].trim_start()),
        _ => (false, trimmed),
    }
}

/// Maps a DSL operator (plus a separately-lexed `NOT`) back to the
/// structured vocabulary: `("IN", true)` gives `"not in"`, `("==", false)`
/// gives `"="`. A negated comparison becomes its complement, so
/// `("=", true)` gives `"!="`. Unknown spellings pass through lower-cased.
#[must_use]
pub fn structured_operator(dsl_op: &str, negated: bool) -> String {
    match Operator::parse(dsl_op) {
        Ok((inner_negated, op)) if negated || inner_negated => match op.complement() {
            Some(flipped) => flipped.structured_name().to_owned(),
            None => format!("not {}", op.structured_name()),
        },
        Ok((_, op)) => op.structured_name().to_owned(),
        Err(_) => {
            let lowered = pair_operator_key(dsl_op);
            if negated {
                format!("not {lowered}")
            } else {
                lowered
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Operator, OperatorError, canonical_operator, is_array_operator, is_non_value_operator,
        pair_operator_key, split_negation, structured_operator,
    };

    #[test]
    fn deprecated_aliases_map_to_canonical_spelling() {
        assert_eq!(canonical_operator("nin"), "NOT IN");
        assert_eq!(canonical_operator(" NIN "), "NOT IN");
        assert_eq!(canonical_operator("regex"), "REGEXP");
        assert_eq!(canonical_operator("nhasany"), "NOT hasAny");
        assert_eq!(canonical_operator(" In "), "in");
        assert_eq!(canonical_operator(" = "), "=");
    }

    #[test]
    fn parse_folds_negation_and_aliases() {
        assert_eq!(Operator::parse("NOT IN"), Ok((true, Operator::In)));
        assert_eq!(Operator::parse("nin"), Ok((true, Operator::In)));
        assert_eq!(Operator::parse("=="), Ok((false, Operator::Equals)));
        assert_eq!(Operator::parse("<>"), Ok((false, Operator::NotEquals)));
        assert_eq!(Operator::parse("Contain"), Ok((false, Operator::Contains)));
        assert_eq!(Operator::parse("NOT  hasAny"), Ok((true, Operator::HasAny)));
        assert_eq!(Operator::parse("  "), Err(OperatorError::Empty));
        assert!(matches!(
            Operator::parse("~="),
            Err(OperatorError::Unknown(op)) if op == "~="
        ));
    }

    #[test]
    fn classifiers_are_case_insensitive() {
        assert!(is_array_operator("IN"));
        assert!(is_array_operator("not  in"));
        assert!(!is_array_operator("="));
        assert!(is_non_value_operator("EXISTS"));
        assert!(is_non_value_operator("not exists"));
        assert!(is_non_value_operator("nexists"));
        assert!(!is_non_value_operator("in"));
        assert!(Operator::HasToken.is_function());
    }

    #[test]
    fn pair_keys_fold_equivalent_spellings() {
        assert_eq!(pair_operator_key(" NOT   IN "), "not in");
        assert_eq!(pair_operator_key("=="), "=");
        assert_eq!(pair_operator_key("<>"), "!=");
    }

    #[test]
    fn negation_split_requires_word_boundary() {
        assert_eq!(split_negation("NOT IN"), (true, "IN"));
        assert_eq!(split_negation("not   like"), (true, "like"));
        assert_eq!(split_negation("nothing"), (false, "nothing"));
        assert_eq!(split_negation("in"), (false, "in"));
    }

    #[test]
    fn structured_operator_folds_lexed_negation() {
        assert_eq!(structured_operator("IN", true), "not in");
        assert_eq!(structured_operator("IN", false), "in");
        assert_eq!(structured_operator("==", false), "=");
        assert_eq!(structured_operator("EXISTS", true), "not exists");
        assert_eq!(structured_operator("hasAny", false), "hasany");
        assert_eq!(structured_operator("~=", true), "not ~=");
    }

    #[test]
    fn negated_comparisons_become_their_complement() {
        assert_eq!(structured_operator("=", true), "!=");
        assert_eq!(structured_operator("!=", true), "=");
        assert_eq!(structured_operator("<", true), ">=");
        assert_eq!(structured_operator(">=", true), "<");
        assert_eq!(structured_operator("<=", true), ">");
        assert_eq!(structured_operator(">", true), "<=");
        assert_eq!(structured_operator("LIKE", true), "not like");
        assert_eq!(Operator::In.complement(), None);
    }
}
