//! Authorization gate.
//!
//! Asks the permission oracle whether the caller of a request may invoke a
//! URI, suspends, and resumes the request through a continuation once the
//! oracle answers. The continuation owns the [`InFlight`] token from then on.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{Bus, BusError};
use crate::errors::PrefsError;
use crate::lifecycle::{InFlight, Outcome};
use crate::observability;

#[derive(Serialize)]
struct AccessQuery<'a> {
    requester: &'a str,
    uri: &'a str,
}

/// Parsed oracle answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
    /// The reply was malformed or reported failure.
    Unusable,
}

pub fn parse_decision(body: &str) -> Decision {
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) else {
        return Decision::Unusable;
    };
    if !obj.get("returnValue").and_then(Value::as_bool).unwrap_or(false) {
        return Decision::Unusable;
    }
    if obj.get("allowed").and_then(Value::as_bool).unwrap_or(false) {
        Decision::Allowed
    } else {
        Decision::Denied
    }
}

#[derive(Clone)]
pub struct AccessChecker {
    bus: Arc<dyn Bus>,
    oracle_uri: String,
}

impl AccessChecker {
    pub fn new(bus: Arc<dyn Bus>, oracle_uri: impl Into<String>) -> Self {
        Self { bus, oracle_uri: oracle_uri.into() }
    }

    pub fn oracle_uri(&self) -> &str { &self.oracle_uri }

    /// Check whether the caller of `request` may invoke `uri`.
    ///
    /// On success the request is suspended and the returned task resumes it:
    /// `continuation(request, allowed)` runs exactly once if the oracle gives a
    /// usable answer. An oracle that cannot be reached is answered with
    /// `permission check unavailable`; any other unusable answer releases the
    /// request without a reply.
    ///
    /// On `Err` the request has already been answered with that error.
    pub fn check_access<F>(
        &self,
        request: InFlight,
        uri: &str,
        continuation: F,
    ) -> Result<JoinHandle<()>, PrefsError>
    where
        F: FnOnce(InFlight, bool) + Send + 'static,
    {
        let requester = match request
            .message()
            .sender_service()
            .or_else(|| request.message().sender())
        {
            Some(r) => r.to_string(),
            None => {
                warn!(token = request.token(), %uri, "no caller identity; refusing");
                return Err(fail(request, PrefsError::IdentityUnavailable));
            }
        };

        let payload = match serde_json::to_string(&AccessQuery { requester: &requester, uri }) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "cannot encode access query");
                return Err(fail(request, PrefsError::Internal));
            }
        };

        let pending = match self.bus.call_one_reply(&self.oracle_uri, payload) {
            Ok(p) => p,
            Err(e) => {
                error!(oracle = %self.oracle_uri, error = %e, "permission check dispatch failed");
                observability::AUTH_DECISIONS.with_label_values(&["unavailable"]).inc();
                return Err(fail(request, PrefsError::PermissionCheckUnavailable));
            }
        };

        debug!(token = request.token(), %requester, %uri, "access check suspended");
        let uri = uri.to_string();
        Ok(tokio::spawn(async move {
            let decision = match pending.wait().await {
                Ok(body) => parse_decision(&body),
                Err(BusError::Dispatch(e)) => {
                    error!(token = request.token(), error = %e, "permission check never reached the oracle");
                    observability::AUTH_DECISIONS.with_label_values(&["unavailable"]).inc();
                    request.finish(Outcome::Failed(PrefsError::PermissionCheckUnavailable));
                    return;
                }
                Err(e) => {
                    warn!(token = request.token(), error = %e, "oracle reply failed");
                    Decision::Unusable
                }
            };
            match decision {
                Decision::Unusable => {
                    observability::AUTH_DECISIONS.with_label_values(&["unusable"]).inc();
                    request.finish(Outcome::Dropped);
                }
                Decision::Allowed | Decision::Denied => {
                    let allowed = decision == Decision::Allowed;
                    observability::AUTH_DECISIONS
                        .with_label_values(&[if allowed { "allowed" } else { "denied" }])
                        .inc();
                    info!(%requester, %uri, allowed, "access decided");
                    continuation(request, allowed);
                }
            }
        }))
    }
}

fn fail(request: InFlight, err: PrefsError) -> PrefsError {
    request.finish(Outcome::Failed(err.clone()));
    err
}
