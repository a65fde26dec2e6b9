//! Message bus abstraction.
//!
//! A [`Message`] is one inbound call. The transport owns it as an
//! `Arc<Message>`; anything that must outlive the handler invocation takes
//! another `Arc` (see [`crate::lifecycle`]). Nested calls go through [`Bus`],
//! which dispatches synchronously and hands back a [`PendingCall`] to await.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub const SENDER_SERVICE_HEADER: &str = "x-sender-service";
pub const SENDER_HEADER: &str = "x-sender";
pub const LUNA_SCHEME: &str = "luna://";

pub type MessageToken = u64;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("reply failed: {0}")]
    Reply(String),
    #[error("message {0} already replied")]
    AlreadyReplied(MessageToken),
}

/// One inbound call, as delivered by the transport.
#[derive(Debug)]
pub struct Message {
    token: MessageToken,
    sender_service: Option<String>,
    sender: Option<String>,
    category: String,
    method: String,
    payload: String,
    reply_tx: Mutex<Option<oneshot::Sender<String>>>,
}

impl Message {
    /// Create a message and the receiving end its single reply is delivered to.
    pub fn new(
        category: impl Into<String>,
        method: impl Into<String>,
        payload: impl Into<String>,
    ) -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        let msg = Self {
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
            sender_service: None,
            sender: None,
            category: normalize_category(category.into()),
            method: method.into(),
            payload: payload.into(),
            reply_tx: Mutex::new(Some(tx)),
        };
        (msg, rx)
    }

    /// Verified service name of the caller.
    pub fn with_sender_service(mut self, name: Option<String>) -> Self {
        self.sender_service = name.filter(|n| !n.trim().is_empty());
        self
    }

    /// Raw connection identity of the caller.
    pub fn with_sender(mut self, sender: Option<String>) -> Self {
        self.sender = sender.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn token(&self) -> MessageToken { self.token }
    pub fn sender_service(&self) -> Option<&str> { self.sender_service.as_deref() }
    pub fn sender(&self) -> Option<&str> { self.sender.as_deref() }
    pub fn category(&self) -> &str { &self.category }
    pub fn method(&self) -> &str { &self.method }
    pub fn payload(&self) -> &str { &self.payload }

    /// `/<category>/<method>`
    pub fn kind(&self) -> String {
        format!("{}/{}", self.category, self.method)
    }

    /// Deliver the reply. Only the first call succeeds.
    pub fn reply(&self, body: String) -> Result<(), BusError> {
        let tx = self
            .reply_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(BusError::AlreadyReplied(self.token))?;
        debug!(token = self.token, kind = %self.kind(), body = %body, "sending reply");
        tx.send(body)
            .map_err(|_| BusError::Reply(format!("caller of message {} went away", self.token)))
    }

    pub fn replied(&self) -> bool {
        self.reply_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

fn normalize_category(category: String) -> String {
    if category.starts_with('/') {
        category
    } else {
        format!("/{category}")
    }
}

/// Reply side of a nested call that has been dispatched.
#[derive(Debug)]
pub struct PendingCall {
    rx: oneshot::Receiver<Result<String, BusError>>,
}

impl PendingCall {
    pub fn channel() -> (oneshot::Sender<Result<String, BusError>>, PendingCall) {
        let (tx, rx) = oneshot::channel();
        (tx, PendingCall { rx })
    }

    /// Suspend until the callee answers. [`BusError::Dispatch`] means the call
    /// never reached the callee.
    pub async fn wait(self) -> Result<String, BusError> {
        self.rx
            .await
            .map_err(|_| BusError::Reply("reply channel closed".into()))?
    }
}

/// Outbound side of the bus: single-reply nested calls.
pub trait Bus: Send + Sync {
    /// Dispatch `payload` to `uri`. An `Err` means the call never left.
    fn call_one_reply(&self, uri: &str, payload: String) -> Result<PendingCall, BusError>;
}

/// Split `luna://<service>/<path>` into its service name and path.
pub fn split_uri(uri: &str) -> Result<(&str, &str), BusError> {
    let rest = uri
        .strip_prefix(LUNA_SCHEME)
        .ok_or_else(|| BusError::Dispatch(format!("not a bus uri: {uri}")))?;
    match rest.split_once('/') {
        Some((service, path)) if !service.is_empty() && !path.is_empty() => Ok((service, path)),
        _ => Err(BusError::Dispatch(format!("malformed bus uri: {uri}"))),
    }
}

/// Bus transport over HTTP: each peer service is reachable at a base URL and
/// a call is a POST of the payload to `<base>/<path>`.
pub struct HttpBus {
    client: reqwest::Client,
    own_name: String,
    peers: BTreeMap<String, String>,
}

impl HttpBus {
    pub fn new(own_name: impl Into<String>, peers: BTreeMap<String, String>) -> Self {
        Self { client: reqwest::Client::new(), own_name: own_name.into(), peers }
    }

    pub fn resolve(&self, uri: &str) -> Result<String, BusError> {
        let (service, path) = split_uri(uri)?;
        let base = self
            .peers
            .get(service)
            .ok_or_else(|| BusError::Dispatch(format!("no route to service {service}")))?;
        Ok(format!("{}/{}", base.trim_end_matches('/'), path))
    }
}

impl Bus for HttpBus {
    fn call_one_reply(&self, uri: &str, payload: String) -> Result<PendingCall, BusError> {
        let url = self.resolve(uri)?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| BusError::Dispatch(e.to_string()))?;
        let (tx, pending) = PendingCall::channel();
        let request = self
            .client
            .post(&url)
            .header(SENDER_SERVICE_HEADER, self.own_name.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload);

        debug!(%url, "dispatching nested call");
        handle.spawn(async move {
            let result = match request.send().await {
                Ok(resp) => resp.text().await.map_err(|e| BusError::Reply(e.to_string())),
                Err(e) if e.is_connect() || e.is_builder() => {
                    warn!(%url, error = %e, "nested call never reached its peer");
                    Err(BusError::Dispatch(e.to_string()))
                }
                Err(e) => {
                    warn!(%url, error = %e, "nested call failed");
                    Err(BusError::Reply(e.to_string()))
                }
            };
            let _ = tx.send(result);
        });
        Ok(pending)
    }
}

/// Scriptable in-process bus for tests and local tooling.
pub mod mock {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[derive(Debug, Clone)]
    pub enum MockReply {
        Payload(String),
        Fail(String),
        /// The callee cannot be reached; reported after dispatch.
        Unreachable(String),
        /// Keep the call pending forever.
        Never,
    }

    #[derive(Default)]
    pub struct MockBus {
        replies: Mutex<HashMap<String, MockReply>>,
        calls: Mutex<Vec<(String, String)>>,
        held: Mutex<Vec<oneshot::Sender<Result<String, BusError>>>>,
        dispatch_fails: AtomicBool,
    }

    impl MockBus {
        pub fn new() -> Self { Self::default() }

        pub fn reply_with(&self, uri: &str, payload: impl Into<String>) {
            self.script(uri, MockReply::Payload(payload.into()));
        }

        pub fn fail_reply(&self, uri: &str, reason: impl Into<String>) {
            self.script(uri, MockReply::Fail(reason.into()));
        }

        pub fn script(&self, uri: &str, reply: MockReply) {
            self.replies
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .insert(uri.to_string(), reply);
        }

        pub fn fail_dispatch(&self, fail: bool) {
            self.dispatch_fails.store(fail, Ordering::SeqCst);
        }

        /// Every `(uri, payload)` seen so far, dispatched or not.
        pub fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
        }
    }

    impl Bus for MockBus {
        fn call_one_reply(&self, uri: &str, payload: String) -> Result<PendingCall, BusError> {
            self.calls
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push((uri.to_string(), payload));
            if self.dispatch_fails.load(Ordering::SeqCst) {
                return Err(BusError::Dispatch("mock dispatch failure".into()));
            }
            let (tx, pending) = PendingCall::channel();
            let scripted = self
                .replies
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .get(uri)
                .cloned()
                .unwrap_or(MockReply::Never);
            match scripted {
                MockReply::Payload(p) => {
                    let _ = tx.send(Ok(p));
                }
                MockReply::Fail(reason) => {
                    let _ = tx.send(Err(BusError::Reply(reason)));
                }
                MockReply::Unreachable(reason) => {
                    let _ = tx.send(Err(BusError::Dispatch(reason)));
                }
                MockReply::Never => self.held.lock().unwrap_or_else(|p| p.into_inner()).push(tx),
            }
            Ok(pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockBus;
    use super::*;

    #[test]
    fn message_replies_exactly_once() {
        let (msg, mut rx) = Message::new("systemProperties", "getSysKeys", "{}");
        assert_eq!(msg.kind(), "/systemProperties/getSysKeys");
        assert!(!msg.replied());
        msg.reply("first".into()).unwrap();
        assert!(msg.replied());
        assert_eq!(msg.reply("second".into()), Err(BusError::AlreadyReplied(msg.token())));
        assert_eq!(rx.try_recv().unwrap(), "first");
    }

    #[test]
    fn tokens_are_unique() {
        let (a, _) = Message::new("/a", "m", "");
        let (b, _) = Message::new("/a", "m", "");
        assert_ne!(a.token(), b.token());
    }

    #[test]
    fn blank_identities_are_absent() {
        let (msg, _) = Message::new("/a", "m", "");
        let msg = msg.with_sender_service(Some("  ".into())).with_sender(Some("conn.1".into()));
        assert_eq!(msg.sender_service(), None);
        assert_eq!(msg.sender(), Some("conn.1"));
    }

    #[test]
    fn split_uri_requires_service_and_path() {
        assert_eq!(
            split_uri("luna://com.webos.service.bus/isCallAllowed").unwrap(),
            ("com.webos.service.bus", "isCallAllowed")
        );
        assert!(split_uri("luna://com.webos.service.bus").is_err());
        assert!(split_uri("http://x/y").is_err());
    }

    #[test]
    fn http_bus_resolves_known_peers_only() {
        let mut peers = BTreeMap::new();
        peers.insert("com.webos.service.bus".to_string(), "http://127.0.0.1:9190/".to_string());
        let bus = HttpBus::new("com.palm.preferences", peers);
        assert_eq!(
            bus.resolve("luna://com.webos.service.bus/isCallAllowed").unwrap(),
            "http://127.0.0.1:9190/isCallAllowed"
        );
        assert!(matches!(bus.resolve("luna://com.other/x"), Err(BusError::Dispatch(_))));
    }

    #[tokio::test]
    async fn mock_bus_scripts_replies() {
        let bus = MockBus::new();
        bus.reply_with("luna://a/b", "{\"ok\":true}");
        bus.fail_reply("luna://a/c", "boom");
        assert_eq!(bus.call_one_reply("luna://a/b", "{}".into()).unwrap().wait().await.unwrap(), "{\"ok\":true}");
        assert!(bus.call_one_reply("luna://a/c", "{}".into()).unwrap().wait().await.is_err());
        bus.fail_dispatch(true);
        assert!(bus.call_one_reply("luna://a/b", "{}".into()).is_err());
        assert_eq!(bus.calls().len(), 3);
    }

    #[tokio::test]
    async fn http_bus_reports_unreachable_peer_as_dispatch_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut peers = BTreeMap::new();
        peers.insert("com.webos.service.bus".to_string(), format!("http://{addr}"));
        let bus = HttpBus::new("com.palm.preferences", peers);
        let err = bus
            .call_one_reply("luna://com.webos.service.bus/isCallAllowed", "{}".into())
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Dispatch(_)), "{err:?}");
    }
}
