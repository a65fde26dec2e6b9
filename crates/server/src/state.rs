use std::sync::Arc;

use configs::AppConfig;
use service::access::AccessChecker;
use service::backup::{BackupConsolidator, RestoreDistributor};
use service::bus::{Bus, Message};
use service::lifecycle::RequestLifecycle;
use service::properties::{AppProperties, SystemProperties};

use crate::idle::IdleTimer;

/// Everything a handler needs, cheap to clone into continuations.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<AppConfig>,
    pub lifecycle: RequestLifecycle,
    pub access: AccessChecker,
    pub system: Arc<SystemProperties>,
    pub apps: AppProperties,
    pub backup: BackupConsolidator,
    pub restore: RestoreDistributor,
    pub idle: IdleTimer,
}

impl ServerState {
    pub fn new(config: AppConfig, bus: Arc<dyn Bus>, system: SystemProperties) -> Self {
        let lifecycle = RequestLifecycle::new();
        let storage = &config.storage;
        let apps = AppProperties::new(storage.prefs_dir.clone(), storage.app_store_file.clone());
        let backup = BackupConsolidator::new(storage.prefs_dir.clone(), storage.app_store_file.clone());
        Self {
            access: AccessChecker::new(bus, config.access.oracle_uri.clone()),
            idle: IdleTimer::new(config.service.idle_timeout(), lifecycle.clone()),
            lifecycle,
            system: Arc::new(system),
            apps,
            backup,
            restore: RestoreDistributor::new(storage.prefs_dir.clone()),
            config: Arc::new(config),
        }
    }

    /// URI the permission oracle is asked about: the service root plus the
    /// message kind, e.g. `luna://com.palm.preferences/systemProperties/getSysKeys`.
    pub fn gated_uri(&self, message: &Message) -> String {
        format!("{}{}", self.config.service.root_uri.trim_end_matches('/'), message.kind())
    }
}
