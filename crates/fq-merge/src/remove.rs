use std::sync::LazyLock;

use fq_pairs::extract_with_policy;
use fq_runtime::{DiagnosticLedger, EnginePolicy};
use fq_types::QueryPair;
use regex::Regex;

static FOLLOWING_CONJUNCTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*((AND|OR)\s+)?").ok());
static TRAILING_CONJUNCTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(AND|OR)\s*$").ok());
static LEADING_CONJUNCTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^(AND|OR)\s+").ok());

fn strip(pattern: &LazyLock<Option<Regex>>, text: &str) -> String {
    match pattern.as_ref() {
        Some(re) => re.replace(text, "").into_owned(),
        None => text.to_owned(),
    }
}

fn holds_variable(pair: &QueryPair) -> bool {
    pair.value
        .as_deref()
        .is_some_and(|value| value.trim().contains('$'))
}

/// Removes `pair` plus the whitespace and one conjunction that follow it.
fn cut_pair(text: &str, pair: &QueryPair) -> String {
    let chars: Vec<char> = text.chars().collect();
    let start = pair.position.start().min(chars.len());
    let after_pair = (pair.position.end() + 1).min(chars.len());
    let rest: String = chars[after_pair..].iter().collect();
    let trailing = FOLLOWING_CONJUNCTION
        .as_ref()
        .and_then(|re| re.find(&rest))
        .map_or(0, |found| rest[..found.end()].chars().count());
    let cut_end = (after_pair + trailing).min(chars.len());
    chars[..start]
        .iter()
        .chain(&chars[cut_end..])
        .collect::<String>()
        .trim()
        .to_owned()
}

/// Removes, for each key, the last complete clause on that key (matched
/// case-insensitively) together with the conjunction after it, then trims
/// dangling leading or trailing `AND`/`OR`. With `only_variables` only
/// clauses whose value mentions a `$variable` are candidates.
pub fn remove_keys_from_expression_with_policy<K: AsRef<str>>(
    expression: &str,
    keys: &[K],
    only_variables: bool,
    policy: &EnginePolicy,
    ledger: &mut DiagnosticLedger,
) -> String {
    if keys.is_empty() || expression.is_empty() {
        return expression.to_owned();
    }

    let mut text = expression.to_owned();
    for key in keys {
        let wanted = key.as_ref().trim().to_lowercase();
        let pairs = extract_with_policy(&text, policy, ledger);
        let target = pairs.iter().rev().find(|pair| {
            pair.key.trim().to_lowercase() == wanted && (!only_variables || holds_variable(pair))
        });
        if let Some(pair) = target.filter(|pair| pair.is_complete) {
            text = cut_pair(&text, pair);
        }
    }

    let text = strip(&TRAILING_CONJUNCTION, &text);
    strip(&LEADING_CONJUNCTION, &text).trim().to_owned()
}

#[must_use]
pub fn remove_keys_from_expression<K: AsRef<str>>(
    expression: &str,
    keys: &[K],
    only_variables: bool,
) -> String {
    let mut ledger = DiagnosticLedger::new();
    remove_keys_from_expression_with_policy(
        expression,
        keys,
        only_variables,
        &EnginePolicy::default(),
        &mut ledger,
    )
}

#[cfg(test)]
mod tests {
    use super::remove_keys_from_expression;

    const NO_KEYS: [&str; 0] = [];

    #[test]
    fn removes_clause_and_its_conjunction() {
        let expr = "service.name = 'api-gateway' AND status = 'success'";
        assert_eq!(remove_keys_from_expression(expr, &["service.name"], false), "status = 'success'");

        let expr = "service.name = 'api-gateway' AND status = 'success' AND region = 'us-east-1'";
        assert_eq!(
            remove_keys_from_expression(expr, &["service.name", "status"], false),
            "region = 'us-east-1'"
        );
    }

    #[test]
    fn empty_inputs_and_missing_keys_leave_text_alone() {
        assert_eq!(remove_keys_from_expression("", &["service.name"], false), "");
        let expr = "service.name = 'api-gateway'";
        assert_eq!(remove_keys_from_expression(expr, &NO_KEYS, false), expr);
        assert_eq!(remove_keys_from_expression(expr, &["nonexistent.key"], false), expr);
    }

    #[test]
    fn variable_mode_skips_literal_clauses() {
        let expr = "deployment.environment = $deployment.environment deployment.environment = 'default'";
        assert_eq!(
            remove_keys_from_expression(expr, &["deployment.environment"], true),
            "deployment.environment = 'default'"
        );

        let expr = "service.name = 'api-gateway' AND status = 'success'";
        assert_eq!(remove_keys_from_expression(expr, &["service.name"], true), expr);

        let expr = "deployment.environment = $deployment.environment service.name = 'api-gateway' region = $region";
        assert_eq!(
            remove_keys_from_expression(expr, &["deployment.environment", "region"], true),
            "service.name = 'api-gateway'"
        );

        let expr = "deployment.environment IN [$env1, $env2] AND service.name = 'api-gateway'";
        assert_eq!(
            remove_keys_from_expression(expr, &["deployment.environment"], true),
            "service.name = 'api-gateway'"
        );
    }

    #[test]
    fn only_the_last_matching_clause_goes() {
        let expr = "deployment.environment = $env1 deployment.environment = $env2 deployment.environment = 'default'";
        assert_eq!(
            remove_keys_from_expression(expr, &["deployment.environment"], true),
            "deployment.environment = $env1 deployment.environment = 'default'"
        );
    }

    #[test]
    fn dangling_conjunctions_are_trimmed() {
        assert_eq!(
            remove_keys_from_expression("Service.Name = $Service.Name", &["service.name"], true),
            ""
        );
        let expr = "service.name = 'api-gateway' AND deployment.environment = $deployment.environment";
        assert_eq!(
            remove_keys_from_expression(expr, &["deployment.environment"], true),
            "service.name = 'api-gateway'"
        );
        let expr = "deployment.environment = $deployment.environment OR service.name = 'api-gateway'";
        assert_eq!(
            remove_keys_from_expression(expr, &["deployment.environment"], true),
            "service.name = 'api-gateway'"
        );
        let expr = "deployment.environment  =  $deployment.environment  AND  service.name  =  'api-gateway'";
        assert_eq!(
            remove_keys_from_expression(expr, &["deployment.environment"], true),
            "service.name  =  'api-gateway'"
        );
    }

    #[test]
    fn remaining_expression_still_parses() {
        let expr = "deployment.environment = $deployment.environment AND service.name = 'api-gateway' AND status = 'success'";
        let result = remove_keys_from_expression(expr, &["deployment.environment"], true);
        assert_eq!(result, "service.name = 'api-gateway' AND status = 'success'");
        assert_eq!(fq_pairs::extract_query_pairs(&result).len(), 2);
    }

    #[test]
    fn incomplete_clauses_are_kept() {
        assert_eq!(remove_keys_from_expression("a = 1 AND b =", &["b"], false), "a = 1 AND b =");
    }
}
