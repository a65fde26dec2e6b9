use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use configs::{AppConfig, DEFAULT_ORACLE_URI};
use serde_json::{json, Value};
use service::bus::mock::{MockBus, MockReply};
use service::bus::SENDER_SERVICE_HEADER;
use service::properties::SystemProperties;
use service::storage::json_map_store::JsonMapStore;
use tower::ServiceExt;

use server::routes::build_router;
use server::state::ServerState;

const CALLER: &str = "com.example.app";
const VERSION_KEY: &str = "com.palm.properties.version";
const NDUID_KEY: &str = "com.palm.properties.nduid";

struct Harness {
    _tmp: tempfile::TempDir,
    prefs_dir: PathBuf,
    bus: Arc<MockBus>,
    state: ServerState,
}

fn harness() -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let prefs_dir = tmp.path().join("preferences");
    std::fs::create_dir_all(&prefs_dir).unwrap();

    let mut config = AppConfig::default();
    config.storage.prefs_dir = prefs_dir.clone();
    config.storage.backup_file = prefs_dir.join("lunaprefs_backup.db");
    config.normalize_and_validate().unwrap();

    let mut map = BTreeMap::new();
    map.insert(VERSION_KEY.to_string(), "3.5.0".to_string());
    map.insert(NDUID_KEY.to_string(), "abc123".to_string());
    let system = SystemProperties::from_store(
        JsonMapStore::from_map(tmp.path().join("system.json"), map),
        &config.storage.public_keys,
    );

    let bus = Arc::new(MockBus::new());
    let state = ServerState::new(config, bus.clone(), system);
    Harness { _tmp: tmp, prefs_dir, bus, state }
}

impl Harness {
    fn oracle_says(&self, allowed: bool) {
        self.bus
            .reply_with(DEFAULT_ORACLE_URI, json!({ "returnValue": true, "allowed": allowed }).to_string());
    }

    async fn call_as(&self, caller: Option<&str>, path: &str, body: Value) -> (StatusCode, Option<Value>) {
        let mut req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(caller) = caller {
            req = req.header(SENDER_SERVICE_HEADER, caller);
        }
        let resp = build_router(self.state.clone())
            .oneshot(req.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { None } else { Some(serde_json::from_slice(&bytes).unwrap()) };
        (status, json)
    }

    async fn call(&self, path: &str, body: Value) -> Value {
        let (status, json) = self.call_as(Some(CALLER), path, body).await;
        assert_eq!(status, StatusCode::OK);
        json.expect("reply body")
    }
}

#[tokio::test]
async fn allowed_caller_reads_private_property() {
    let h = harness();
    h.oracle_says(true);

    let v = h.call("/systemProperties/getSysProperty", json!({ "key": NDUID_KEY })).await;
    assert_eq!(v, json!({ NDUID_KEY: "abc123", "returnValue": true }));

    let calls = h.bus.calls();
    assert_eq!(calls.len(), 1);
    let (uri, payload) = &calls[0];
    assert_eq!(uri, DEFAULT_ORACLE_URI);
    let query: Value = serde_json::from_str(payload).unwrap();
    assert_eq!(
        query,
        json!({ "requester": CALLER, "uri": "luna://com.palm.preferences/systemProperties/getSysProperty" })
    );
    assert_eq!(h.state.lifecycle.outstanding(), 0);
}

#[tokio::test]
async fn denied_caller_gets_permission_denied_and_public_listings() {
    let h = harness();
    h.oracle_says(false);

    let v = h.call("/systemProperties/getSysProperty", json!({ "key": NDUID_KEY })).await;
    assert_eq!(v, json!({ "returnValue": false, "errorText": "permission denied" }));

    let v = h.call("/systemProperties/getSysKeysObj", json!({})).await;
    assert_eq!(v, json!({ "values": [VERSION_KEY], "returnValue": true }));
    assert_eq!(h.state.lifecycle.outstanding(), 0);
}

#[tokio::test]
async fn caller_without_identity_is_refused() {
    let h = harness();
    h.oracle_says(true);

    let (status, v) = h.call_as(None, "/systemProperties/getSysKeys", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v.unwrap()["errorText"], "caller identity required for authorization");
    assert!(h.bus.calls().is_empty());
    assert_eq!(h.state.lifecycle.outstanding(), 0);
}

#[tokio::test]
async fn unusable_oracle_reply_drops_the_request() {
    let h = harness();
    h.bus.fail_reply(DEFAULT_ORACLE_URI, "oracle went away");

    let (status, v) = h.call_as(Some(CALLER), "/systemProperties/getSysKeys", json!({})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(v.is_none());
    assert_eq!(h.state.lifecycle.outstanding(), 0);
}

#[tokio::test]
async fn oracle_dispatch_failure_is_reported() {
    let h = harness();
    h.bus.fail_dispatch(true);

    let v = h.call("/systemProperties/getAllSysProperties", json!({})).await;
    assert_eq!(v, json!({ "returnValue": false, "errorText": "permission check unavailable" }));
    assert_eq!(h.state.lifecycle.outstanding(), 0);
}

#[tokio::test]
async fn unreachable_oracle_is_reported() {
    let h = harness();
    h.bus.script(DEFAULT_ORACLE_URI, MockReply::Unreachable("connection refused".into()));

    let (status, v) = h.call_as(Some(CALLER), "/systemProperties/getSysKeys", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v, Some(json!({ "returnValue": false, "errorText": "permission check unavailable" })));
    assert_eq!(h.state.lifecycle.outstanding(), 0);
}

#[tokio::test]
async fn numeric_looking_values_survive_backup_and_restore() {
    let h = harness();
    for (key, value) in [("size", json!("3")), ("ratio", json!("1.5")), ("count", json!(42))] {
        let v = h
            .call("/appProperties/setAppProperty", json!({ "appId": "com.y", "key": key, "value": value }))
            .await;
        assert_eq!(v, json!({ "returnValue": true }));
    }
    let v = h.call("/appProperties/getAppProperty", json!({ "appId": "com.y", "key": "size" })).await;
    assert_eq!(v, json!({ "size": "3", "returnValue": true }));

    let out = tempfile::tempdir().unwrap();
    let temp_dir = out.path().to_string_lossy().into_owned();
    let v = h.call("/backup/preBackup", json!({ "tempDir": temp_dir })).await;
    assert_eq!(v["returnValue"], true);

    std::fs::remove_dir_all(h.prefs_dir.join("com.y")).unwrap();
    let v = h
        .call("/backup/postRestore", json!({ "tempDir": temp_dir, "files": ["lunaprefs_backup.db"] }))
        .await;
    assert_eq!(v, json!({ "returnValue": true }));

    let v = h.call("/appProperties/getAllAppPropertiesObj", json!({ "appId": "com.y" })).await;
    assert_eq!(
        v,
        json!({ "values": [{ "size": "3" }, { "ratio": "1.5" }, { "count": "42" }], "returnValue": true })
    );
}

#[tokio::test]
async fn app_properties_are_not_gated() {
    let h = harness();

    let v = h
        .call("/appProperties/setAppProperty", json!({ "appId": "com.x", "key": "color", "value": "red" }))
        .await;
    assert_eq!(v, json!({ "returnValue": true }));
    assert!(h.prefs_dir.join("com.x").join("prefsDB.sl").is_file());

    let v = h.call("/appProperties/getAppProperty", json!({ "appId": "com.x", "key": "color" })).await;
    assert_eq!(v, json!({ "color": "red", "returnValue": true }));

    let v = h.call("/appProperties/getAppKeysObj", json!({ "appId": "com.x" })).await;
    assert_eq!(v, json!({ "values": ["color"], "returnValue": true }));

    let v = h.call("/appProperties/removeAppProperty", json!({ "appId": "com.x", "key": "color" })).await;
    assert_eq!(v, json!({ "returnValue": true }));

    let v = h.call("/appProperties/getAppProperty", json!({ "appId": "com.x", "key": "color" })).await;
    assert_eq!(v, json!({ "returnValue": false, "errorText": "no such key" }));
    assert!(h.bus.calls().is_empty());
}

#[tokio::test]
async fn backup_and_restore_round_trip() {
    let h = harness();
    for (app, key, value) in [("com.x", "color", json!("red")), ("com.y", "size", json!({ "w": 3 }))] {
        h.call("/appProperties/setAppProperty", json!({ "appId": app, "key": key, "value": value }))
            .await;
    }

    let out = tempfile::tempdir().unwrap();
    let temp_dir = out.path().to_string_lossy().into_owned();
    let v = h.call("/backup/preBackup", json!({ "tempDir": temp_dir })).await;
    let backup_file = out.path().join("lunaprefs_backup.db").to_string_lossy().into_owned();
    assert_eq!(v, json!({ "files": [backup_file], "backupFile": backup_file, "returnValue": true }));

    std::fs::remove_dir_all(h.prefs_dir.join("com.x")).unwrap();
    std::fs::remove_dir_all(h.prefs_dir.join("com.y")).unwrap();

    let v = h
        .call("/backup/postRestore", json!({ "tempDir": temp_dir, "files": ["lunaprefs_backup.db", "unrelated.txt"] }))
        .await;
    assert_eq!(v, json!({ "returnValue": true }));

    let v = h.call("/appProperties/getAppProperty", json!({ "appId": "com.x", "key": "color" })).await;
    assert_eq!(v["color"], "red");
    let v = h.call("/appProperties/getAllAppProperties", json!({ "appId": "com.y" })).await;
    assert_eq!(v, json!([{ "size": { "w": 3 } }]));
}

#[tokio::test]
async fn pre_backup_without_temp_dir_uses_configured_file() {
    let h = harness();
    let v = h.call("/backup/preBackup", json!({})).await;
    let expected = h.prefs_dir.join("lunaprefs_backup.db");
    assert_eq!(v["backupFile"], expected.to_string_lossy().into_owned());
    assert!(expected.is_file());
}

#[tokio::test]
async fn backup_parameter_errors_echo_the_payload() {
    let h = harness();

    let payload = json!({ "tempDir": 5 });
    let v = h.call("/backup/preBackup", payload.clone()).await;
    assert_eq!(v["returnValue"], false);
    assert_eq!(v["errorText"], "Parameter \"tempDir\" must have value type string");
    assert_eq!(v["errorPayload"], payload.to_string());

    let v = h.call("/backup/postRestore", json!({ "files": [] })).await;
    assert_eq!(v["errorText"], "Required parameter \"tempDir\" is missing");

    let v = h.call("/backup/postRestore", json!({ "tempDir": "/tmp", "files": "x" })).await;
    assert_eq!(v["errorText"], "Parameter \"files\" must have value type array");
}

#[tokio::test]
async fn restore_of_corrupt_snapshot_replies_once_with_error() {
    let h = harness();
    let out = tempfile::tempdir().unwrap();
    std::fs::write(out.path().join("lunaprefs_backup.db"), b"definitely not sqlite").unwrap();

    let v = h
        .call(
            "/backup/postRestore",
            json!({ "tempDir": out.path().to_string_lossy(), "files": ["lunaprefs_backup.db"] }),
        )
        .await;
    assert_eq!(v, json!({ "returnValue": false, "errorText": "unable to restore preference db" }));
}

#[tokio::test]
async fn unknown_methods_are_rejected() {
    let h = harness();
    let v = h.call("/systemProperties/setSysProperty", json!({})).await;
    assert_eq!(v, json!({ "returnValue": false, "errorText": "Unknown method \"/systemProperties/setSysProperty\"" }));
    assert_eq!(h.state.lifecycle.outstanding(), 0);

    h.call("/madeUpCategory/whatever", json!({})).await;
    let text = service::observability::encode_metrics().unwrap();
    assert!(!text.contains("madeUpCategory"));
}

#[tokio::test]
async fn health_and_metrics() {
    let h = harness();
    h.call("/appProperties/getAppKeys", json!({ "appId": "com.x" })).await;

    let app = build_router(h.state.clone());
    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&bytes).unwrap(), json!({ "status": "ok" }));

    let resp = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("prefs_requests_total"));
}
