use super::parser::{Expr, Literal, Predicate, Test, format_num};
use serde_json::{Map, Value};

/// Evaluate a parsed condition against one record.
pub fn eval(expr: &Expr, record: &Map<String, Value>) -> bool {
    match expr {
        Expr::Or(lhs, rhs) => eval(lhs, record) || eval(rhs, record),
        Expr::And(lhs, rhs) => eval(lhs, record) && eval(rhs, record),
        Expr::Not(inner) => !eval(inner, record),
        Expr::Predicate(pred) => eval_predicate(pred, record),
    }
}

/// Operator semantics. The invariant that matters: every operator except
/// `IS NULL` yields `false` when the path does not resolve — including the
/// negated forms (`!=`, `NOT IN`, `NOT CONTAINS`, ...). A record without
/// the field never satisfies "field differs from x".
fn eval_predicate(pred: &Predicate, record: &Map<String, Value>) -> bool {
    let value = pred.path.resolve(record);
    match &pred.test {
        Test::IsNull => value.is_none_or(Value::is_null),
        Test::IsNotNull => value.is_some_and(|v| !v.is_null()),
        test => match value {
            None => false,
            Some(v) => apply(test, v),
        },
    }
}

fn apply(test: &Test, value: &Value) -> bool {
    match test {
        Test::Eq(lit) => value_eq(value, lit),
        Test::NotEq(lit) => !value_eq(value, lit),
        Test::Lt(lit) => compare(value, lit).is_some_and(|o| o == std::cmp::Ordering::Less),
        Test::Le(lit) => compare(value, lit).is_some_and(|o| o != std::cmp::Ordering::Greater),
        Test::Gt(lit) => compare(value, lit).is_some_and(|o| o == std::cmp::Ordering::Greater),
        Test::Ge(lit) => compare(value, lit).is_some_and(|o| o != std::cmp::Ordering::Less),
        Test::In(items) => items.iter().any(|lit| value_eq(value, lit)),
        Test::NotIn(items) => !items.iter().any(|lit| value_eq(value, lit)),
        Test::Contains(needle) => scalar_text(value).is_some_and(|t| t.contains(needle)),
        Test::NotContains(needle) => scalar_text(value).is_some_and(|t| !t.contains(needle)),
        Test::StartsWith(prefix) => scalar_text(value).is_some_and(|t| t.starts_with(prefix)),
        Test::NotStartsWith(prefix) => scalar_text(value).is_some_and(|t| !t.starts_with(prefix)),
        Test::EndsWith(suffix) => scalar_text(value).is_some_and(|t| t.ends_with(suffix)),
        Test::NotEndsWith(suffix) => scalar_text(value).is_some_and(|t| !t.ends_with(suffix)),
        Test::WildcardMatch { regex, .. } => {
            scalar_text(value).is_some_and(|t| regex.is_match(&t))
        }
        Test::Like { regex, .. } => scalar_text(value).is_some_and(|t| regex.is_match(&t)),
        Test::IsNull | Test::IsNotNull => unreachable!("handled in eval_predicate"),
    }
}

/// Scalar string form of a value. Arrays, objects and null are a type
/// mismatch for the string operators and compare equal to nothing.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Loose scalar equality: numeric when both sides are numeric, otherwise
/// text-form comparison. Containers never equal a literal.
fn value_eq(value: &Value, lit: &Literal) -> bool {
    if let (Some(a), Some(b)) = (as_number(value), lit.as_number()) {
        return a == b;
    }
    match value {
        Value::Bool(b) => match lit {
            Literal::Bool(k) => b == k,
            Literal::Str(s) => s.eq_ignore_ascii_case(&b.to_string()),
            Literal::Num(_) => false,
        },
        Value::String(s) => *s == lit.text_form(),
        Value::Number(n) => format_num(n.as_f64().unwrap_or(f64::NAN)) == lit.text_form(),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

fn compare(value: &Value, lit: &Literal) -> Option<std::cmp::Ordering> {
    let left = as_number(value)?;
    let right = lit.as_number()?;
    left.partial_cmp(&right)
}
