//! Template interpolation and the restricted condition language.
//!
//! Conditions are deliberately NOT a general expression language.  The
//! grammar is closed: a handful of recognized shapes evaluate, everything
//! else denies.  Inputs that look like code injection are rejected outright.
//! Both cases coerce to `false` (fail-closed) but are reported as distinct
//! [`ConditionOutcome`] variants so callers can log a denied condition
//! separately from a legitimate `false`.

use std::collections::HashMap;

use serde_json::Value;

// ---------------------------------------------------------------------------
// Template interpolation
// ---------------------------------------------------------------------------

/// Replace every `{{identifier}}` occurrence with the string form of the
/// matching variable, or the empty string if the variable is absent.
///
/// A single left-to-right pass: substituted values are not re-scanned, and
/// an unterminated `{{` is copied through literally.
pub fn interpolate(template: &str, variables: &HashMap<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if let Some(value) = variables.get(name) {
                    out.push_str(&value_to_string(value));
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Recursively interpolate every string inside a JSON value.
///
/// Non-string leaves pass through unchanged, so interpolation is a no-op on
/// numbers, booleans, and null.
pub fn interpolate_value(value: &Value, variables: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate(s, variables)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_value(item, variables))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, variables)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// The string form of a variable for interpolation and equality checks.
/// Strings are used verbatim; null renders empty; everything else uses its
/// JSON text.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Condition evaluation
// ---------------------------------------------------------------------------

/// The result of evaluating a condition expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOutcome {
    /// The condition evaluated to true.
    True,
    /// The condition evaluated to false.
    False,
    /// The expression contained characters the grammar forbids.  Coerces to
    /// false.
    Rejected,
    /// The expression matched no recognized shape.  Coerces to false.
    Unparseable,
}

impl ConditionOutcome {
    /// Fail-closed boolean coercion.
    pub fn as_bool(self) -> bool {
        matches!(self, Self::True)
    }

    fn from_bool(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

/// Evaluate a restricted boolean condition against the variable scope.
///
/// The raw expression is trimmed and lower-cased first.  Recognized shapes,
/// tried in order: literal `true`/`false`; a bare identifier present in the
/// scope (truthy coercion); `ident == literal`; `ident != literal`;
/// `ident > number`; `ident < number`.
pub fn evaluate_condition(expression: &str, variables: &HashMap<String, Value>) -> ConditionOutcome {
    let expr = expression.trim().to_lowercase();

    let has_comparison = expr.contains("==") || expr.contains("!=");
    let has_forbidden = expr
        .chars()
        .any(|c| matches!(c, ';' | '{' | '}' | '(' | ')' | '='));
    if has_forbidden && !has_comparison {
        return ConditionOutcome::Rejected;
    }

    match expr.as_str() {
        "true" => return ConditionOutcome::True,
        "false" => return ConditionOutcome::False,
        _ => {}
    }

    if is_identifier(&expr) {
        return match variables.get(&expr) {
            Some(value) => ConditionOutcome::from_bool(is_truthy(value)),
            None => ConditionOutcome::Unparseable,
        };
    }

    if let Some((ident, literal)) = split_operator(&expr, "==") {
        return ConditionOutcome::from_bool(string_of(variables, ident) == literal);
    }
    if let Some((ident, literal)) = split_operator(&expr, "!=") {
        return ConditionOutcome::from_bool(string_of(variables, ident) != literal);
    }
    if let Some((ident, literal)) = split_operator(&expr, ">") {
        return compare_numeric(variables, ident, literal, |lhs, rhs| lhs > rhs);
    }
    if let Some((ident, literal)) = split_operator(&expr, "<") {
        return compare_numeric(variables, ident, literal, |lhs, rhs| lhs < rhs);
    }

    ConditionOutcome::Unparseable
}

/// Split `ident <op> literal`, trimming both sides and stripping quotes from
/// the literal.  Returns `None` when the operator is absent or a side is
/// empty.
fn split_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let (lhs, rhs) = expr.split_once(op)?;
    let ident = lhs.trim();
    let literal = rhs.trim().trim_matches(|c| c == '"' || c == '\'');
    if ident.is_empty() || !is_identifier(ident) {
        return None;
    }
    Some((ident, literal))
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn string_of(variables: &HashMap<String, Value>, ident: &str) -> String {
    variables.get(ident).map(value_to_string).unwrap_or_default()
}

fn compare_numeric(
    variables: &HashMap<String, Value>,
    ident: &str,
    literal: &str,
    cmp: impl Fn(f64, f64) -> bool,
) -> ConditionOutcome {
    let Ok(rhs) = literal.parse::<f64>() else {
        return ConditionOutcome::Unparseable;
    };
    let lhs = match variables.get(ident) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse::<f64>().ok(),
        _ => None,
    };
    match lhs {
        Some(lhs) => ConditionOutcome::from_bool(cmp(lhs, rhs)),
        None => ConditionOutcome::False,
    }
}

/// Truthy coercion for bare-identifier conditions: null, false, zero, and
/// the empty string are false; everything else is true.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
