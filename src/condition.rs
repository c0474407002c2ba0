//! Condition evaluation.
//!
//! One comparison operator applied between a resolved actual value and an
//! expected value, per a fixed operator table. Equality is numeric-aware,
//! containment operators are case-sensitive string operations, relational
//! operators coerce both sides to numbers, and an invalid regex or unknown
//! operator evaluates to false rather than failing.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, regex::Regex>>> = OnceLock::new();

/// Compiles a pattern through a bounded process-wide cache. Returns None for
/// invalid patterns.
fn cached_regex(pattern: &str) -> Option<regex::Regex> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    if let Ok(guard) = cache.read() {
        if let Some(re) = guard.get(pattern) {
            return Some(re.clone());
        }
    }

    let compiled = regex::Regex::new(pattern).ok()?;

    if let Ok(mut guard) = cache.write() {
        if guard.len() >= REGEX_CACHE_MAX {
            guard.clear();
        }
        guard
            .entry(pattern.to_string())
            .or_insert_with(|| compiled.clone());
    }

    Some(compiled)
}

/// Comparison operators supported by trigger conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    MatchesRegex,
    GreaterThan,
    LessThan,
    GreaterThanOrEqualTo,
    LessThanOrEqualTo,
    /// Any operator name this engine does not model. Always evaluates false.
    #[serde(other)]
    Unknown,
}

/// Applies `op` between `actual` and `expected`.
#[must_use]
pub fn evaluate(actual: &Value, expected: &Value, op: Operator) -> bool {
    match op {
        Operator::Equals => loose_equals(actual, expected),
        Operator::NotEquals => !loose_equals(actual, expected),
        Operator::Contains => as_text(actual).contains(&as_text(expected)),
        Operator::NotContains => !as_text(actual).contains(&as_text(expected)),
        Operator::StartsWith => as_text(actual).starts_with(&as_text(expected)),
        Operator::EndsWith => as_text(actual).ends_with(&as_text(expected)),
        Operator::MatchesRegex => cached_regex(&as_text(expected))
            .is_some_and(|re| re.is_match(&as_text(actual))),
        Operator::GreaterThan => numeric_pair(actual, expected).is_some_and(|(a, e)| a > e),
        Operator::LessThan => numeric_pair(actual, expected).is_some_and(|(a, e)| a < e),
        Operator::GreaterThanOrEqualTo => {
            numeric_pair(actual, expected).is_some_and(|(a, e)| a >= e)
        }
        Operator::LessThanOrEqualTo => numeric_pair(actual, expected).is_some_and(|(a, e)| a <= e),
        Operator::Unknown => false,
    }
}

/// Numeric compare when both sides coerce to numbers, string compare
/// otherwise.
fn loose_equals(actual: &Value, expected: &Value) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(e)) => (a - e).abs() < f64::EPSILON || a == e,
        _ => as_text(actual) == as_text(expected),
    }
}

fn numeric_pair(actual: &Value, expected: &Value) -> Option<(f64, f64)> {
    Some((as_number(actual)?, as_number(expected)?))
}

/// Numeric coercion: JSON numbers directly, strings by parsing their
/// trimmed text form.
#[must_use]
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// String coercion used by the containment operators: strings verbatim,
/// everything else through its JSON serialization.
#[must_use]
pub fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_string_equals_number() {
        assert!(evaluate(&json!("42"), &json!(42), Operator::Equals));
        assert!(evaluate(&json!(42), &json!("42.0"), Operator::Equals));
    }

    #[test]
    fn non_numeric_string_compares_as_string() {
        assert!(!evaluate(&json!("42a"), &json!(42), Operator::Equals));
        assert!(evaluate(&json!("abc"), &json!("abc"), Operator::Equals));
        assert!(evaluate(&json!("abc"), &json!("abd"), Operator::NotEquals));
    }

    #[test]
    fn containment_is_case_sensitive() {
        assert!(evaluate(&json!("checkout/step1"), &json!("checkout"), Operator::Contains));
        assert!(!evaluate(&json!("Checkout"), &json!("checkout"), Operator::Contains));
        assert!(evaluate(&json!("Checkout"), &json!("checkout"), Operator::NotContains));
    }

    #[test]
    fn starts_and_ends_with() {
        assert!(evaluate(&json!("/cart/add"), &json!("/cart"), Operator::StartsWith));
        assert!(evaluate(&json!("/cart/add"), &json!("add"), Operator::EndsWith));
        assert!(!evaluate(&json!("/cart/add"), &json!("add"), Operator::StartsWith));
    }

    #[test]
    fn regex_matches() {
        assert!(evaluate(&json!("order-1234"), &json!(r"^order-\d+$"), Operator::MatchesRegex));
        assert!(!evaluate(&json!("order-abc"), &json!(r"^order-\d+$"), Operator::MatchesRegex));
    }

    #[test]
    fn invalid_regex_is_false_never_panics() {
        assert!(!evaluate(&json!("anything"), &json!("("), Operator::MatchesRegex));
        assert!(!evaluate(&json!("anything"), &json!("[z-a]"), Operator::MatchesRegex));
    }

    #[test]
    fn relational_operators_coerce_numerically() {
        assert!(evaluate(&json!("10"), &json!(9), Operator::GreaterThan));
        assert!(evaluate(&json!(3), &json!("3"), Operator::GreaterThanOrEqualTo));
        assert!(evaluate(&json!(2.5), &json!("2.6"), Operator::LessThan));
        assert!(evaluate(&json!("7"), &json!("7"), Operator::LessThanOrEqualTo));
    }

    #[test]
    fn relational_on_non_numeric_is_false() {
        assert!(!evaluate(&json!("abc"), &json!(1), Operator::GreaterThan));
        assert!(!evaluate(&json!(1), &json!("abc"), Operator::LessThan));
        assert!(!evaluate(&json!(null), &json!(1), Operator::GreaterThanOrEqualTo));
    }

    #[test]
    fn unknown_operator_is_false() {
        assert!(!evaluate(&json!("x"), &json!("x"), Operator::Unknown));
    }

    #[test]
    fn unknown_operator_deserializes() {
        let op: Operator = serde_json::from_str("\"somethingNew\"").unwrap();
        assert_eq!(op, Operator::Unknown);
        let op: Operator = serde_json::from_str("\"matchesRegex\"").unwrap();
        assert_eq!(op, Operator::MatchesRegex);
    }

    #[test]
    fn non_string_values_compare_through_text_form() {
        assert!(evaluate(&json!(true), &json!("true"), Operator::Equals));
        assert!(evaluate(&json!({"a": 1}), &json!("\"a\""), Operator::Contains));
    }
}
