//! `/systemProperties`: read-only, every method behind the authorization gate.
//!
//! A caller the oracle does not allow still gets the public subset: listings
//! are filtered to whitelisted keys and single reads of other keys are denied.

use std::sync::Arc;

use serde_json::Value;
use service::errors::PrefsError;
use service::lifecycle::{InFlight, Outcome};
use service::properties::SystemProperties;
use service::reply;
use tracing::debug;

use super::{parse_object, string_param};
use crate::state::ServerState;

pub const CATEGORY: &str = "/systemProperties";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMethod {
    Value,
    Keys { as_obj: bool },
    All { as_obj: bool },
    Some { as_obj: bool },
}

impl SystemMethod {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "Get" | "getSysProperty" => Self::Value,
            "getSysKeys" => Self::Keys { as_obj: false },
            "getSysKeysObj" => Self::Keys { as_obj: true },
            "getAllSysProperties" => Self::All { as_obj: false },
            "getAllSysPropertiesObj" => Self::All { as_obj: true },
            "getSomeSysProperties" => Self::Some { as_obj: false },
            "getSomeSysPropertiesObj" => Self::Some { as_obj: true },
            _ => return None,
        })
    }
}

/// Suspend `request` on the oracle and answer it from the continuation.
pub fn handle(state: &ServerState, request: InFlight, method: SystemMethod) {
    let uri = state.gated_uri(request.message());
    let system = Arc::clone(&state.system);
    let gated = state.access.check_access(request, &uri, move |request, allowed| {
        let outcome = respond(&system, method, request.message().payload(), allowed);
        request.finish(outcome);
    });
    if let Err(e) = gated {
        debug!(%uri, error = %e, "answered before authorization");
    }
}

pub fn respond(system: &SystemProperties, method: SystemMethod, payload: &str, allowed: bool) -> Outcome {
    let public_only = !allowed;
    match method {
        SystemMethod::Value => value(system, payload, allowed),
        SystemMethod::Keys { as_obj } => {
            let keys = system.keys(public_only).into_iter().map(Value::String).collect();
            Outcome::Completed(reply::list_body(keys, as_obj))
        }
        SystemMethod::All { as_obj } => {
            let entries = system
                .all(public_only)
                .into_iter()
                .map(|(k, v)| reply::single_entry(&k, Value::String(v)))
                .collect();
            Outcome::Completed(reply::list_body(entries, as_obj))
        }
        SystemMethod::Some { as_obj } => some(system, payload, allowed, as_obj),
    }
}

fn value(system: &SystemProperties, payload: &str, allowed: bool) -> Outcome {
    let params = parse_object(payload);
    let Some(key) = params.as_ref().and_then(|p| string_param(p, "key")) else {
        return Outcome::Failed(PrefsError::InvalidParam("missing parameter key".into()));
    };
    if !allowed && !system.is_public(key) {
        return Outcome::Denied;
    }
    match system.value(key) {
        Ok(v) => Outcome::Completed(reply::key_value_body(key, &v)),
        Err(e) => Outcome::Failed(e),
    }
}

/// Takes `[{key}, ...]`; every element is answered on its own, failures inline.
fn some(system: &SystemProperties, payload: &str, allowed: bool, as_obj: bool) -> Outcome {
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(payload) else {
        return Outcome::Failed(PrefsError::ParamError);
    };
    let values = items
        .iter()
        .map(|item| {
            let Some(key) = item.as_object().and_then(|o| o.get("key")) else {
                return error_entry("missing 'key' parameter");
            };
            let key = match key {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !allowed && !system.is_public(&key) {
                return error_entry(&PrefsError::PermissionDenied.to_string());
            }
            match system.value(&key) {
                Ok(v) => reply::single_entry(&key, Value::String(v)),
                Err(e) => error_entry(&e.to_string()),
            }
        })
        .collect();
    Outcome::Completed(reply::list_body(values, as_obj))
}

fn error_entry(text: &str) -> Value {
    reply::single_entry("errorText", Value::String(text.to_string()))
}
