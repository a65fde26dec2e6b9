//! Method table: routes an inbound message to its handler.

use std::sync::Arc;

use service::bus::Message;
use service::errors::PrefsError;
use service::lifecycle::Outcome;
use service::observability;
use tracing::{debug, warn};

use crate::handlers::{
    app::{self, AppMethod},
    backup::{self, BackupMethod},
    system::{self, SystemMethod},
};
use crate::state::ServerState;

/// Handle one message. Every path ends in exactly one reply or an explicit drop.
pub fn dispatch(state: &ServerState, message: Arc<Message>) {
    state.idle.reset();
    observability::REQUESTS_TOTAL.with_label_values(&[category_label(message.category())]).inc();
    debug!(token = message.token(), kind = %message.kind(), "dispatching");

    let request = state.lifecycle.acquire(&message);
    let method = message.method();
    match message.category() {
        system::CATEGORY => {
            if let Some(m) = SystemMethod::parse(method) {
                return system::handle(state, request, m);
            }
        }
        app::CATEGORY => {
            if let Some(m) = AppMethod::parse(method) {
                return app::handle(state, request, m);
            }
        }
        backup::CATEGORY => {
            if let Some(m) = BackupMethod::parse(method) {
                return backup::handle(state, request, m);
            }
        }
        _ => {}
    }
    let kind = message.kind();
    warn!(%kind, "unknown method");
    request.finish(Outcome::Failed(PrefsError::UnknownMethod(kind)));
}

/// Metric label for a category: the known constants only, so callers cannot
/// grow the series set.
fn category_label(category: &str) -> &'static str {
    match category {
        system::CATEGORY => system::CATEGORY,
        app::CATEGORY => app::CATEGORY,
        backup::CATEGORY => backup::CATEGORY,
        _ => "unknown",
    }
}
