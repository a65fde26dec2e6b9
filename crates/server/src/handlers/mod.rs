//! Method handlers, one module per bus category.

pub mod app;
pub mod backup;
pub mod system;

use serde_json::{Map, Value};

/// The payload as a JSON object, if it is one.
pub(crate) fn parse_object(payload: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

pub(crate) fn string_param<'a>(params: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    params.get(name).and_then(Value::as_str)
}
