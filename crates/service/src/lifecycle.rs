//! In-flight request tracking.
//!
//! [`RequestLifecycle::acquire`] takes an extra reference on a message and
//! returns an [`InFlight`] token. The token is released exactly once: either
//! by [`InFlight::resolve`], which consumes it, or by `Drop` if it is lost on
//! some path. Only `resolve` can reply, and it can only be called once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::bus::{BusError, Message, MessageToken};
use crate::errors::PrefsError;
use crate::reply;

/// How an in-flight request ends.
#[derive(Debug)]
pub enum Outcome {
    /// The method ran; the body is its result.
    Completed(String),
    /// The caller is not allowed to see the result.
    Denied,
    /// The method failed.
    Failed(PrefsError),
    /// The method failed and the error echoes the raw payload.
    FailedWithPayload(PrefsError),
    /// Release without replying.
    Dropped,
}

/// Counts outstanding [`InFlight`] tokens.
#[derive(Clone, Default)]
pub struct RequestLifecycle {
    outstanding: Arc<AtomicUsize>,
}

impl RequestLifecycle {
    pub fn new() -> Self { Self::default() }

    pub fn acquire(&self, message: &Arc<Message>) -> InFlight {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        debug!(token = message.token(), kind = %message.kind(), "request acquired");
        InFlight {
            message: Arc::clone(message),
            outstanding: Arc::clone(&self.outstanding),
            resolved: false,
        }
    }

    /// Requests acquired and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

/// Extra reference on a message held across a suspension point.
#[must_use = "an in-flight request must be resolved"]
pub struct InFlight {
    message: Arc<Message>,
    outstanding: Arc<AtomicUsize>,
    resolved: bool,
}

impl std::fmt::Debug for InFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("token", &self.message.token())
            .field("kind", &self.message.kind())
            .finish()
    }
}

impl InFlight {
    pub fn message(&self) -> &Message { &self.message }
    pub fn token(&self) -> MessageToken { self.message.token() }

    /// Send the single terminal reply for this request and release it.
    pub fn resolve(mut self, outcome: Outcome) -> Result<(), BusError> {
        self.resolved = true;
        let body = match outcome {
            Outcome::Completed(body) => body,
            Outcome::Denied => reply::error_body(&PrefsError::PermissionDenied),
            Outcome::Failed(err) => {
                debug!(token = self.token(), code = err.code(), error = %err, "request failed");
                reply::error_body(&err)
            }
            Outcome::FailedWithPayload(err) => {
                debug!(token = self.token(), code = err.code(), error = %err, "request failed");
                reply::error_body_with_payload(&err, self.message.payload())
            }
            Outcome::Dropped => {
                warn!(token = self.token(), kind = %self.message.kind(), "request dropped without reply");
                return Ok(());
            }
        };
        let sent = self.message.reply(body);
        if let Err(e) = &sent {
            error!(token = self.token(), error = %e, "failed to send reply");
        }
        sent
    }

    /// [`resolve`](Self::resolve) for callers with nobody to report a send
    /// failure to; the failure is already logged.
    pub fn finish(self, outcome: Outcome) {
        if self.resolve(outcome).is_err() {
            debug!("reply lost; caller gone");
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.resolved {
            warn!(token = self.message.token(), kind = %self.message.kind(), "in-flight request released unresolved");
        }
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn message() -> (Arc<Message>, tokio::sync::oneshot::Receiver<String>) {
        let (msg, rx) = Message::new("/systemProperties", "getSysProperty", r#"{"key":"k"}"#);
        (Arc::new(msg), rx)
    }

    #[test]
    fn completed_replies_once_and_releases() {
        let lifecycle = RequestLifecycle::new();
        let (msg, mut rx) = message();
        let inflight = lifecycle.acquire(&msg);
        assert_eq!(Arc::strong_count(&msg), 2);
        assert_eq!(lifecycle.outstanding(), 1);

        inflight.resolve(Outcome::Completed("{\"returnValue\":true}".into())).unwrap();
        assert_eq!(Arc::strong_count(&msg), 1);
        assert_eq!(lifecycle.outstanding(), 0);
        assert_eq!(rx.try_recv().unwrap(), "{\"returnValue\":true}");
        assert!(msg.replied());
    }

    #[test]
    fn denied_and_failed_reply_with_error_text() {
        let lifecycle = RequestLifecycle::new();

        let (msg, mut rx) = message();
        lifecycle.acquire(&msg).resolve(Outcome::Denied).unwrap();
        let v: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(v["returnValue"], false);
        assert_eq!(v["errorText"], "permission denied");

        let (msg, mut rx) = message();
        lifecycle.acquire(&msg).resolve(Outcome::FailedWithPayload(PrefsError::ParamError)).unwrap();
        let v: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(v["errorPayload"], r#"{"key":"k"}"#);
        assert_eq!(lifecycle.outstanding(), 0);
    }

    #[test]
    fn dropped_releases_without_reply() {
        let lifecycle = RequestLifecycle::new();
        let (msg, mut rx) = message();
        lifecycle.acquire(&msg).resolve(Outcome::Dropped).unwrap();
        assert_eq!(Arc::strong_count(&msg), 1);
        assert_eq!(lifecycle.outstanding(), 0);
        assert!(!msg.replied());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn lost_token_still_releases() {
        let lifecycle = RequestLifecycle::new();
        let (msg, _rx) = message();
        {
            let _inflight = lifecycle.acquire(&msg);
            assert_eq!(lifecycle.outstanding(), 1);
        }
        assert_eq!(lifecycle.outstanding(), 0);
        assert_eq!(Arc::strong_count(&msg), 1);
    }

    #[test]
    fn reply_failure_is_reported_and_still_releases() {
        let lifecycle = RequestLifecycle::new();
        let (msg, rx) = message();
        drop(rx);
        let err = lifecycle.acquire(&msg).resolve(Outcome::Completed("{}".into())).unwrap_err();
        assert!(matches!(err, BusError::Reply(_)));
        assert_eq!(lifecycle.outstanding(), 0);
    }

    #[test]
    fn finish_swallows_a_vanished_caller() {
        let lifecycle = RequestLifecycle::new();
        let (msg, rx) = message();
        drop(rx);
        lifecycle.acquire(&msg).finish(Outcome::Completed("{}".into()));
        assert!(msg.replied());
        assert_eq!(lifecycle.outstanding(), 0);
        assert_eq!(Arc::strong_count(&msg), 1);
    }
}
