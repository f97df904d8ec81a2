//! Loose field coercion for host payloads
//!
//! Hosts written in dynamic languages send flags as `1`/`"yes"` and numbers
//! as strings. These helpers follow JavaScript's `Boolean()` and `Number()`
//! conversions so such payloads are accepted instead of rejected.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `Boolean(value)`
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |v| v != 0.0 && !v.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `Number(value)`; unconvertible input becomes NaN
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let trimmed = s.trim();
            match trimmed {
                "" => 0.0,
                "Infinity" | "+Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => {
                    f64::NAN
                }
                _ => trimmed.parse().unwrap_or(f64::NAN),
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

pub fn deserialize_truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|v| truthy(&v))
}

/// Absent or `null` stays `None`; anything else goes through `Number()`
pub fn deserialize_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Value>::deserialize(deserializer).map(|v| v.map(|v| to_number(&v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthy() {
        for value in [json!(true), json!(1), json!(-0.5), json!("yes"), json!("0"), json!([]), json!({})] {
            assert!(truthy(&value), "{value} should be truthy");
        }
        for value in [json!(false), json!(0), json!(0.0), json!(""), Value::Null] {
            assert!(!truthy(&value), "{value} should be falsy");
        }
    }

    #[test]
    fn test_to_number() {
        assert_eq!(to_number(&json!(30)), 30.0);
        assert_eq!(to_number(&json!(" 29.97 ")), 29.97);
        assert_eq!(to_number(&json!("1e3")), 1000.0);
        assert_eq!(to_number(&json!("")), 0.0);
        assert_eq!(to_number(&json!(true)), 1.0);
        assert_eq!(to_number(&json!("-Infinity")), f64::NEG_INFINITY);
        assert!(to_number(&json!("30fps")).is_nan());
        assert!(to_number(&json!("inf")).is_nan());
        assert!(to_number(&json!("NaN")).is_nan());
        assert!(to_number(&json!({ "fps": 30 })).is_nan());
    }
}
