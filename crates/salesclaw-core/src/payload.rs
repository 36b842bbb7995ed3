//! Field accessors for inbound event payloads.
//!
//! Payloads are plain JSON maps produced by integrations. Missing or
//! mistyped fields read as their neutral value so evaluators never fail.

use serde_json::Value;

/// String field, or `""` when absent or not a string.
pub fn str_field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Lowercased string field.
pub fn lower_field(data: &Value, key: &str) -> String {
    str_field(data, key).to_lowercase()
}

/// Optional owned string field (empty strings count as absent).
pub fn opt_string(data: &Value, key: &str) -> Option<String> {
    match data.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Some(s.to_string()),
        _ => None,
    }
}

/// Numeric field as `f64`. Numeric strings are accepted.
pub fn f64_field(data: &Value, key: &str) -> Option<f64> {
    data.get(key).and_then(as_number)
}

/// Boolean field, `false` when absent.
pub fn bool_field(data: &Value, key: &str) -> bool {
    data.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Interpret a JSON value as a number.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Render a JSON value the way it would read in a message body.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_are_neutral() {
        let data = json!({"text": "Hello", "count": "7", "flag": true});
        assert_eq!(str_field(&data, "subject"), "");
        assert_eq!(lower_field(&data, "text"), "hello");
        assert_eq!(f64_field(&data, "count"), Some(7.0));
        assert_eq!(f64_field(&data, "missing"), None);
        assert!(bool_field(&data, "flag"));
        assert!(!bool_field(&data, "other"));
        assert_eq!(opt_string(&json!({"customer_id": ""}), "customer_id"), None);
    }
}
