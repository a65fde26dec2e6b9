use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;

pub const DEFAULT_SERVICE_NAME: &str = "com.palm.preferences";
pub const DEFAULT_ROOT_URI: &str = "luna://com.palm.preferences";
pub const DEFAULT_ORACLE_URI: &str = "luna://com.webos.service.bus/isCallAllowed";
pub const DEFAULT_PREFS_DIR: &str = "/var/preferences";
pub const DEFAULT_APP_STORE_FILE: &str = "prefsDB.sl";
pub const DEFAULT_BACKUP_FILE_NAME: &str = "lunaprefs_backup.db";
pub const DEFAULT_BACKUP_FILE: &str = "/var/preferences/lunaprefs_backup.db";
pub const DEFAULT_SYSTEM_PROPERTIES_FILE: &str = "/etc/prefs/system_properties.json";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_root_uri")]
    pub root_uri: String,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            root_uri: default_root_uri(),
            idle_timeout_secs: default_idle_timeout(),
            worker_threads: Some(1),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8089 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_prefs_dir")]
    pub prefs_dir: PathBuf,
    #[serde(default = "default_app_store_file")]
    pub app_store_file: String,
    #[serde(default = "default_backup_file")]
    pub backup_file: PathBuf,
    #[serde(default = "default_backup_file_name")]
    pub backup_file_name: String,
    #[serde(default = "default_system_properties_file")]
    pub system_properties_file: PathBuf,
    #[serde(default = "default_public_keys")]
    pub public_keys: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prefs_dir: default_prefs_dir(),
            app_store_file: default_app_store_file(),
            backup_file: default_backup_file(),
            backup_file_name: default_backup_file_name(),
            system_properties_file: default_system_properties_file(),
            public_keys: default_public_keys(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(default = "default_oracle_uri")]
    pub oracle_uri: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self { oracle_uri: default_oracle_uri() }
    }
}

/// Where nested calls go: bus service name -> HTTP base URL.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BusConfig {
    #[serde(default)]
    pub peers: BTreeMap<String, String>,
}

fn default_service_name() -> String { DEFAULT_SERVICE_NAME.to_string() }
fn default_root_uri() -> String { DEFAULT_ROOT_URI.to_string() }
fn default_idle_timeout() -> u64 { 30 }
fn default_prefs_dir() -> PathBuf { PathBuf::from(DEFAULT_PREFS_DIR) }
fn default_app_store_file() -> String { DEFAULT_APP_STORE_FILE.to_string() }
fn default_backup_file() -> PathBuf { PathBuf::from(DEFAULT_BACKUP_FILE) }
fn default_backup_file_name() -> String { DEFAULT_BACKUP_FILE_NAME.to_string() }
fn default_system_properties_file() -> PathBuf { PathBuf::from(DEFAULT_SYSTEM_PROPERTIES_FILE) }
fn default_oracle_uri() -> String { DEFAULT_ORACLE_URI.to_string() }

fn default_public_keys() -> Vec<String> {
    [
        "com.palm.properties.browserOsName",
        "com.palm.properties.deviceName",
        "com.palm.properties.deviceNameShort",
        "com.palm.properties.deviceNameBranded",
        "com.palm.properties.deviceNameShortBranded",
        "com.palm.properties.productClass",
        "com.palm.properties.productLineName",
        "com.palm.properties.version",
        "com.palm.properties.buildName",
        "com.palm.properties.buildNumber",
        "com.palm.properties.boardType",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect()
}

/// Config path from `CONFIG_PATH`, falling back to `config.toml`.
pub fn default_path() -> String {
    std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string())
}

pub fn load_default() -> Result<AppConfig> {
    load_from_file(&default_path())
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let cfg: AppConfig = toml::from_str(&content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Load from `path` (or the default location), using built-in defaults when
    /// the file does not exist. Parse errors are still reported.
    pub fn load_and_validate(path: Option<&str>) -> Result<Self> {
        let path = path.map(str::to_string).unwrap_or_else(default_path);
        let mut cfg = if std::path::Path::new(&path).exists() {
            load_from_file(&path)?
        } else {
            AppConfig::default()
        };
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.service.normalize()?;
        self.server.normalize()?;
        self.storage.normalize()?;
        self.access.validate()?;
        Ok(())
    }
}

impl ServiceConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.name.trim().is_empty() {
            self.name = default_service_name();
        }
        if self.root_uri.trim().is_empty() {
            self.root_uri = default_root_uri();
        }
        if self.idle_timeout_secs == 0 {
            return Err(anyhow!("service.idle_timeout_secs must be a positive number of seconds"));
        }
        match self.worker_threads {
            Some(0) | None => self.worker_threads = Some(1),
            Some(_) => {}
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be in 1..=65535"));
        }
        Ok(())
    }
}

impl StorageConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.prefs_dir.as_os_str().is_empty() {
            return Err(anyhow!("storage.prefs_dir is empty"));
        }
        if self.backup_file.as_os_str().is_empty() {
            return Err(anyhow!("storage.backup_file is empty"));
        }
        if self.app_store_file.trim().is_empty() {
            self.app_store_file = default_app_store_file();
        }
        if self.backup_file_name.trim().is_empty() {
            self.backup_file_name = default_backup_file_name();
        }
        if self.app_store_file.contains('/') || self.backup_file_name.contains('/') {
            return Err(anyhow!("storage file names must not contain '/'"));
        }
        Ok(())
    }
}

impl AccessConfig {
    fn validate(&self) -> Result<()> {
        if !self.oracle_uri.starts_with("luna://") {
            return Err(anyhow!("access.oracle_uri must start with luna://"));
        }
        Ok(())
    }
}
