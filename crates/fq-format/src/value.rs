use fq_types::{FilterValue, is_array_operator};

const QUOTES: [char; 3] = ['\'', '"', '`'];

/// True when `text` is wrapped in one matching pair of `'`, `"` or backticks.
#[must_use]
pub fn is_quoted(text: &str) -> bool {
    let mut chars = text.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) => first == last && QUOTES.contains(&first),
        _ => false,
    }
}

/// Strips one pair of matching quotes and resolves backslash escapes.
/// Unquoted text is returned unchanged.
#[must_use]
pub fn unquote(text: &str) -> String {
    if !is_quoted(text) {
        return text.to_owned();
    }
    let inner: Vec<char> = text.chars().collect();
    let inner = &inner[1..inner.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.iter();
    while let Some(&c) = chars.next() {
        if c == '\\' {
            if let Some(&escaped) = chars.next() {
                out.push(escaped);
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn looks_numeric(text: &str) -> bool {
    !text.is_empty()
        && text.chars().any(|c| c.is_ascii_digit())
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

/// Types a literal as written in the DSL: quoted text stays a string (with
/// quotes removed), numeric text becomes a number, `true`/`false` become
/// booleans, anything else is kept as a string.
#[must_use]
pub fn literal_to_value(text: &str) -> FilterValue {
    if is_quoted(text) {
        return FilterValue::Str(unquote(text));
    }
    let trimmed = text.trim();
    if looks_numeric(trimmed)
        && let Ok(number) = trimmed.parse::<f64>()
    {
        return FilterValue::Number(number);
    }
    match trimmed {
        "true" => FilterValue::Bool(true),
        "false" => FilterValue::Bool(false),
        _ => FilterValue::Str(text.to_owned()),
    }
}

/// Renders one scalar. Strings are single-quoted with embedded `'` escaped,
/// unless they already carry their own quotes.
#[must_use]
pub fn format_single_value(value: &FilterValue) -> String {
    match value {
        FilterValue::Str(text) if is_quoted(text) => text.clone(),
        FilterValue::Str(text) => format!("'{}'", text.replace('\'', "\\'")),
        FilterValue::List(_) => format_list(&value.to_list()),
        other => other.to_string(),
    }
}

fn format_list(items: &[FilterValue]) -> String {
    let rendered: Vec<String> = items.iter().map(format_single_value).collect();
    format!("[{}]", rendered.join(", "))
}

/// `low AND high` for a two-element list, the operand shape of `BETWEEN`.
#[must_use]
pub fn format_between(value: &FilterValue) -> Option<String> {
    match value {
        FilterValue::List(bounds) => match bounds.as_slice() {
            [low, high] => Some(format!(
                "{} AND {}",
                format_single_value(low),
                format_single_value(high)
            )),
            _ => None,
        },
        _ => None,
    }
}

/// Renders a filter value as DSL text for `operator`.
///
/// Variables are returned verbatim. Array operators (`in`, `not in`) coerce
/// scalars into a one-element list.
#[must_use]
pub fn format_value(value: &FilterValue, operator: &str) -> String {
    if value.is_variable() {
        return value.to_string();
    }
    if is_array_operator(operator) || value.is_list() {
        return format_list(&value.to_list());
    }
    format_single_value(value)
}

#[cfg(test)]
mod tests {
    use fq_lexer::{significant, try_tokenize};
    use fq_types::{FilterValue, TokenKind};
    use proptest::prelude::*;

    use super::{format_between, format_value, is_quoted, literal_to_value, unquote};

    fn s(text: &str) -> FilterValue {
        FilterValue::from(text)
    }

    #[test]
    fn variables_are_returned_verbatim() {
        assert_eq!(format_value(&s("$variable"), ""), "$variable");
        assert_eq!(format_value(&s(" $variable "), ""), " $variable ");
        assert_eq!(format_value(&FilterValue::from(vec!["$var1", "$var2"]), ""), "$var1,$var2");
        assert_eq!(format_value(&s("$env"), "IN"), "$env");
    }

    #[test]
    fn numeric_strings_stay_quoted() {
        assert_eq!(format_value(&s("123"), ""), "'123'");
        assert_eq!(format_value(&s("0"), ""), "'0'");
        assert_eq!(format_value(&s("-42"), ""), "'-42'");
        assert_eq!(format_value(&s(" 456 "), ""), "' 456 '");
        assert_eq!(format_value(&s("123"), "IN"), "['123']");
        assert_eq!(format_value(&FilterValue::from(vec!["123", "456"]), "IN"), "['123', '456']");
        assert_eq!(format_value(&FilterValue::from(123_i64), "IN"), "[123]");
    }

    #[test]
    fn already_quoted_strings_are_preserved() {
        assert_eq!(format_value(&s("'quoted'"), ""), "'quoted'");
        assert_eq!(format_value(&s("\"double-quoted\""), ""), "\"double-quoted\"");
        assert_eq!(format_value(&s("`backticked`"), ""), "`backticked`");
        assert_eq!(
            format_value(&FilterValue::from(vec!["'100000'", "'200000'"]), "IN"),
            "['100000', '200000']"
        );
    }

    #[test]
    fn single_quotes_are_backslash_escaped() {
        assert_eq!(format_value(&s("user's data"), "="), r"'user\'s data'");
        assert_eq!(format_value(&s("it's a test"), ""), r"'it\'s a test'");
        assert_eq!(
            format_value(&FilterValue::from(vec!["John's", "Mary's", "Bob"]), "in"),
            r"['John\'s', 'Mary\'s', 'Bob']"
        );
    }

    #[test]
    fn scalars_render_naturally() {
        assert_eq!(format_value(&FilterValue::from(100_i64), ">"), "100");
        assert_eq!(format_value(&FilterValue::from(2.5), ">"), "2.5");
        assert_eq!(format_value(&FilterValue::from(true), "="), "true");
        assert_eq!(format_value(&s(""), "="), "''");
        assert_eq!(format_value(&FilterValue::List(Vec::new()), "in"), "[]");
        assert_eq!(format_value(&FilterValue::from(vec!["a", "b"]), "="), "['a', 'b']");
    }

    #[test]
    fn between_needs_exactly_two_bounds() {
        assert_eq!(
            format_between(&FilterValue::from(vec![10_i64, 20_i64])).as_deref(),
            Some("10 AND 20")
        );
        assert_eq!(
            format_between(&FilterValue::from(vec!["a", "b"])).as_deref(),
            Some("'a' AND 'b'")
        );
        assert_eq!(format_between(&FilterValue::from(vec![1_i64])), None);
        assert_eq!(format_between(&FilterValue::from(3_i64)), None);
    }

    #[test]
    fn unquote_strips_one_pair_and_escapes() {
        assert_eq!(unquote("'adservice'"), "adservice");
        assert_eq!(unquote(r"'user\'s'"), "user's");
        assert_eq!(unquote("\"x\""), "x");
        assert_eq!(unquote("plain"), "plain");
        assert_eq!(unquote("'"), "'");
        assert!(!is_quoted("'mismatch\""));
    }

    #[test]
    fn literals_are_typed_by_spelling() {
        assert_eq!(literal_to_value("'123'"), s("123"));
        assert_eq!(literal_to_value("123"), FilterValue::Number(123.0));
        assert_eq!(literal_to_value("-4.5"), FilterValue::Number(-4.5));
        assert_eq!(literal_to_value("true"), FilterValue::Bool(true));
        assert_eq!(literal_to_value("$env"), s("$env"));
        assert_eq!(literal_to_value("inf"), s("inf"));
        assert_eq!(literal_to_value("api"), s("api"));
    }

    proptest! {
        #[test]
        fn escaped_quotes_survive_the_lexer(text in "[a-z ]([a-z' ]{0,10}[a-z ])?") {
            let formatted = format_value(&FilterValue::Str(text.clone()), "=");
            let tokens = try_tokenize(&formatted).expect("formatted value lexes");
            let sig = significant(&tokens);
            prop_assert_eq!(sig.len(), 1);
            prop_assert_eq!(sig[0].kind, TokenKind::QuotedText);
            prop_assert_eq!(unquote(&sig[0].text), text);
        }
    }
}
