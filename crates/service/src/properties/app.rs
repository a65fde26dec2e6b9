use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::PrefsError;
use crate::properties::app_store::AppStore;

/// Application properties, one [`AppStore`] per app under `prefs_dir`.
#[derive(Debug, Clone)]
pub struct AppProperties {
    prefs_dir: PathBuf,
    store_file: String,
}

impl AppProperties {
    pub fn new(prefs_dir: impl Into<PathBuf>, store_file: impl Into<String>) -> Self {
        Self { prefs_dir: prefs_dir.into(), store_file: store_file.into() }
    }

    pub fn prefs_dir(&self) -> &Path { &self.prefs_dir }
    pub fn store_file(&self) -> &str { &self.store_file }

    /// `<prefs_dir>/<appId>/<store_file>`; `appId` must be one path segment.
    pub fn store_path(&self, app_id: &str) -> Result<PathBuf, PrefsError> {
        let app_id = validate_app_id(app_id)?;
        Ok(self.prefs_dir.join(app_id).join(&self.store_file))
    }

    fn open_for_read(&self, app_id: &str) -> Result<Option<AppStore>, PrefsError> {
        let path = self.store_path(app_id)?;
        if !path.exists() {
            return Ok(None);
        }
        AppStore::open_existing(&path).map(Some)
    }

    fn open_for_write(&self, app_id: &str) -> Result<AppStore, PrefsError> {
        let path = self.store_path(app_id)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PrefsError::Io(format!("{}: {e}", parent.display())))?;
        }
        AppStore::open_or_create(&path)
    }

    pub fn keys(&self, app_id: &str) -> Result<Vec<String>, PrefsError> {
        match self.open_for_read(app_id)? {
            Some(store) => store.keys(),
            None => Ok(Vec::new()),
        }
    }

    pub fn all(&self, app_id: &str) -> Result<Vec<(String, String)>, PrefsError> {
        match self.open_for_read(app_id)? {
            Some(store) => store.entries(),
            None => Ok(Vec::new()),
        }
    }

    pub fn value(&self, app_id: &str, key: &str) -> Result<String, PrefsError> {
        self.open_for_read(app_id)?.ok_or(PrefsError::NoSuchKey)?.value(key)
    }

    /// Store a JSON value. Strings are stored as their raw text, everything
    /// else as serialized JSON; `null` has no representation.
    pub fn set(&self, app_id: &str, key: &str, value: &Value) -> Result<(), PrefsError> {
        let text = match value {
            Value::Null => return Err(PrefsError::ValueNotJson),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let how = self.open_for_write(app_id)?.upsert(key, &text)?;
        debug!(%app_id, %key, ?how, "app property set");
        Ok(())
    }

    pub fn remove(&self, app_id: &str, key: &str) -> Result<(), PrefsError> {
        self.open_for_read(app_id)?.ok_or(PrefsError::NoSuchKey)?;
        self.open_for_write(app_id)?.remove(key)
    }
}

fn validate_app_id(app_id: &str) -> Result<&str, PrefsError> {
    let trimmed = app_id.trim();
    if trimmed.is_empty() {
        return Err(PrefsError::missing("appId"));
    }
    if trimmed == "." || trimmed == ".." || trimmed.contains('/') || trimmed.contains('\\') {
        return Err(PrefsError::InvalidParam(format!("invalid appId '{trimmed}'")));
    }
    Ok(trimmed)
}
