//! Reply bodies shared by every method.
//!
//! All bodies are JSON text; the bus moves strings, not values.

use serde_json::{json, Map, Value};

use crate::errors::PrefsError;

pub fn success_body() -> String {
    json!({ "returnValue": true }).to_string()
}

pub fn error_body(err: &PrefsError) -> String {
    json!({ "returnValue": false, "errorText": err.to_string() }).to_string()
}

/// Error body echoing the raw payload that caused it.
pub fn error_body_with_payload(err: &PrefsError, payload: &str) -> String {
    json!({
        "returnValue": false,
        "errorText": err.to_string(),
        "errorPayload": payload,
    })
    .to_string()
}

/// Turn a stored value into the JSON embedded in replies: objects and arrays
/// are passed through, anything else (including bare JSON scalars) becomes a
/// string.
pub fn stored_value_to_json(value: &str) -> Value {
    match serde_json::from_str::<Value>(value) {
        Ok(v @ Value::Object(_)) | Ok(v @ Value::Array(_)) => v,
        _ => Value::String(value.to_string()),
    }
}

/// `{<key>: value, returnValue: true}`
pub fn key_value_body(key: &str, value: &str) -> String {
    let mut obj = Map::new();
    obj.insert(key.to_string(), stored_value_to_json(value));
    obj.insert("returnValue".to_string(), Value::Bool(true));
    Value::Object(obj).to_string()
}

/// `{<key>: value}` as used inside arrays.
pub fn single_entry(key: &str, value: Value) -> Value {
    let mut obj = Map::new();
    obj.insert(key.to_string(), value);
    Value::Object(obj)
}

/// Wrap an array as `{values: [...], returnValue}`; `returnValue` is false when
/// any element is an object carrying `errorText`.
pub fn wrap_array(values: Vec<Value>) -> Value {
    let failed = values
        .iter()
        .any(|v| v.as_object().map(|o| o.contains_key("errorText")).unwrap_or(false));
    json!({ "values": values, "returnValue": !failed })
}

/// Render a list either bare or wrapped, depending on the method variant.
pub fn list_body(values: Vec<Value>, as_obj: bool) -> String {
    if as_obj {
        wrap_array(values).to_string()
    } else {
        Value::Array(values).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_embeds_objects_and_stringifies_scalars() {
        let v: Value = serde_json::from_str(&key_value_body("k", r#"{"a":1}"#)).unwrap();
        assert_eq!(v["k"]["a"], 1);
        assert_eq!(v["returnValue"], true);

        let v: Value = serde_json::from_str(&key_value_body("k", "42")).unwrap();
        assert_eq!(v["k"], "42");

        let v: Value = serde_json::from_str(&key_value_body("k", "plain text")).unwrap();
        assert_eq!(v["k"], "plain text");
    }

    #[test]
    fn wrap_array_flags_error_elements() {
        let ok = wrap_array(vec![single_entry("a", json!("1"))]);
        assert_eq!(ok["returnValue"], true);

        let bad = wrap_array(vec![single_entry("a", json!("1")), single_entry("errorText", json!("no such key"))]);
        assert_eq!(bad["returnValue"], false);
        assert_eq!(bad["values"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn error_body_with_payload_echoes_input() {
        let v: Value = serde_json::from_str(&error_body_with_payload(&PrefsError::ParamError, "{\"x\":1}")).unwrap();
        assert_eq!(v["returnValue"], false);
        assert_eq!(v["errorText"], "general parameter error");
        assert_eq!(v["errorPayload"], "{\"x\":1}");
    }
}
