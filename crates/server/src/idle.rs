//! Inactivity timer.
//!
//! Every handled method resets the timer. Once it runs out with no request in
//! flight the service shuts down; with requests still held it re-arms.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use service::lifecycle::RequestLifecycle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Clone)]
pub struct IdleTimer {
    timeout: Duration,
    last_activity: Arc<Mutex<Instant>>,
    lifecycle: RequestLifecycle,
}

impl IdleTimer {
    pub fn new(timeout: Duration, lifecycle: RequestLifecycle) -> Self {
        Self { timeout, last_activity: Arc::new(Mutex::new(Instant::now())), lifecycle }
    }

    pub fn timeout(&self) -> Duration { self.timeout }

    pub fn reset(&self) {
        *self.last_activity.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
    }

    fn deadline(&self) -> Instant {
        *self.last_activity.lock().unwrap_or_else(|p| p.into_inner()) + self.timeout
    }

    /// Resolves once the timer has run out with nothing in flight.
    pub async fn expired(&self) {
        loop {
            let deadline = self.deadline();
            if Instant::now() < deadline {
                tokio::time::sleep_until(deadline).await;
                continue;
            }
            let outstanding = self.lifecycle.outstanding();
            if outstanding == 0 {
                return;
            }
            debug!(outstanding, "idle timeout with requests in flight; re-arming");
            self.reset();
        }
    }
}
