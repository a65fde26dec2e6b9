//! `/appProperties`: per-application stores, not gated.

use serde_json::{Map, Value};
use service::errors::PrefsError;
use service::lifecycle::{InFlight, Outcome};
use service::properties::AppProperties;
use service::reply;

use super::{parse_object, string_param};
use crate::state::ServerState;

pub const CATEGORY: &str = "/appProperties";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMethod {
    Keys { as_obj: bool },
    All { as_obj: bool },
    Value,
    Set,
    Remove,
}

impl AppMethod {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "getAppKeys" => Self::Keys { as_obj: false },
            "getAppKeysObj" => Self::Keys { as_obj: true },
            "getAllAppProperties" => Self::All { as_obj: false },
            "getAllAppPropertiesObj" => Self::All { as_obj: true },
            "getAppProperty" => Self::Value,
            "setAppProperty" => Self::Set,
            "removeAppProperty" => Self::Remove,
            _ => return None,
        })
    }
}

pub fn handle(state: &ServerState, request: InFlight, method: AppMethod) {
    let outcome = respond(&state.apps, method, request.message().payload());
    request.finish(outcome);
}

pub fn respond(apps: &AppProperties, method: AppMethod, payload: &str) -> Outcome {
    let params = parse_object(payload);
    let params = params.as_ref();
    let result = match method {
        AppMethod::Keys { as_obj } => app_id(params).and_then(|app_id| {
            let keys = apps.keys(app_id)?.into_iter().map(Value::String).collect();
            Ok(reply::list_body(keys, as_obj))
        }),
        AppMethod::All { as_obj } => app_id(params).and_then(|app_id| {
            let entries = apps
                .all(app_id)?
                .into_iter()
                .map(|(k, v)| reply::single_entry(&k, reply::stored_value_to_json(&v)))
                .collect();
            Ok(reply::list_body(entries, as_obj))
        }),
        AppMethod::Value => app_id_and_key(params, "no appId or key parameter found")
            .and_then(|(app_id, key)| Ok(reply::key_value_body(key, &apps.value(app_id, key)?))),
        AppMethod::Set => set(apps, params),
        AppMethod::Remove => app_id_and_key(params, "'appId'(string)/'key'(string) parameter is missing")
            .and_then(|(app_id, key)| {
                apps.remove(app_id, key)?;
                Ok(reply::success_body())
            }),
    };
    match result {
        Ok(body) => Outcome::Completed(body),
        Err(e) => Outcome::Failed(e),
    }
}

fn app_id(params: Option<&Map<String, Value>>) -> Result<&str, PrefsError> {
    params
        .and_then(|p| string_param(p, "appId"))
        .ok_or_else(|| PrefsError::InvalidParam("no appId parameter found".into()))
}

fn app_id_and_key<'a>(
    params: Option<&'a Map<String, Value>>,
    missing: &str,
) -> Result<(&'a str, &'a str), PrefsError> {
    params
        .and_then(|p| Some((string_param(p, "appId")?, string_param(p, "key")?)))
        .ok_or_else(|| PrefsError::InvalidParam(missing.to_string()))
}

fn set(apps: &AppProperties, params: Option<&Map<String, Value>>) -> Result<String, PrefsError> {
    let params = params.ok_or(PrefsError::ParamError)?;
    let app_id = string_param(params, "appId")
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| PrefsError::missing("appId"))?;
    let key = string_param(params, "key").ok_or_else(|| PrefsError::missing("key"))?;
    let value = params.get("value").ok_or_else(|| PrefsError::missing("value"))?;
    apps.set(app_id, key, value)?;
    Ok(reply::success_body())
}
