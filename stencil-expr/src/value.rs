//! JavaScript-flavoured coercions over `serde_json::Value`.

use std::cmp::Ordering;

use serde_json::{Number, Value};

pub use stencil_core::type_name;

/// Build a number value, keeping integral values as integers so they print
/// without a trailing `.0`. Non-finite results collapse to `null`.
pub fn number(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return Value::from(n as i64);
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text form used for interpolation: `null` is empty, arrays join with `,`,
/// objects print as JSON.
pub fn to_display(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(to_display).collect::<Vec<_>>().join(","),
        Value::Object(_) => v.to_string(),
    }
}

fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    let f = n.as_f64().unwrap_or(f64::NAN);
    if f.fract() == 0.0 && f.abs() < 1e21 {
        format!("{f:.0}")
    } else {
        f.to_string()
    }
}

pub fn to_number(v: &Value) -> f64 {
    match v {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// `===`: same type and same content; numbers compare by value.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// `==`: like `===` but numbers, strings and booleans are compared numerically
/// when their types differ.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            strict_eq(a, b)
        }
        _ if std::mem::discriminant(a) == std::mem::discriminant(b) => strict_eq(a, b),
        _ => to_number(a) == to_number(b),
    }
}

/// Relational ordering: strings compare lexically, everything else numerically.
/// `None` when either side is `NaN`.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => to_number(a).partial_cmp(&to_number(b)),
    }
}

/// `+`: concatenation when either side is a string or container, addition otherwise.
pub fn add(a: &Value, b: &Value) -> Value {
    let textual = |v: &Value| matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_));
    if textual(a) || textual(b) {
        let mut s = to_display(a);
        s.push_str(&to_display(b));
        Value::String(s)
    } else {
        number(to_number(a) + to_number(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_matches_template_literals() {
        assert_eq!(to_display(&json!(null)), "");
        assert_eq!(to_display(&json!(3)), "3");
        assert_eq!(to_display(&json!(2.5)), "2.5");
        assert_eq!(to_display(&json!([1, "a", null])), "1,a,");
        assert_eq!(to_display(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn coercions() {
        assert!(loose_eq(&json!("1"), &json!(1)));
        assert!(!strict_eq(&json!("1"), &json!(1)));
        assert!(strict_eq(&json!(1.0), &json!(1)));
        assert_eq!(add(&json!(1), &json!("x")), json!("1x"));
        assert_eq!(add(&json!(1), &json!(true)), json!(2));
        assert!(!truthy(&json!(0)));
        assert!(truthy(&json!([])));
        assert_eq!(number(f64::NAN), Value::Null);
    }
}
