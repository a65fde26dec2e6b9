use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{debug, Level};

use common::types::Health;
use service::bus::{Message, SENDER_HEADER, SENDER_SERVICE_HEADER};
use service::observability;

use crate::dispatch;
use crate::state::ServerState;

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn metrics() -> Response {
    match observability::encode_metrics() {
        Ok(text) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e).into_response(),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// One bus call over HTTP: `POST /<category>/<method>` with the JSON payload
/// as the body. A request released without a reply answers 204.
async fn call(
    State(state): State<ServerState>,
    Path((category, method)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload = match String::from_utf8(body.to_vec()) {
        Ok(p) if p.trim().is_empty() => "{}".to_string(),
        Ok(p) => p,
        Err(_) => return (StatusCode::BAD_REQUEST, "payload is not utf-8").into_response(),
    };
    let (message, reply) = Message::new(category, method, payload);
    let message = Arc::new(
        message
            .with_sender_service(header_value(&headers, SENDER_SERVICE_HEADER))
            .with_sender(header_value(&headers, SENDER_HEADER)),
    );
    let token = message.token();
    dispatch::dispatch(&state, message);

    match reply.await {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(_) => {
            debug!(token, "request released without reply");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

/// Build the router: the bus adapter plus health and metrics.
pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/:category/:method", post(call))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
