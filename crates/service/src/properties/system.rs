use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::errors::PrefsError;
use crate::storage::json_map_store::JsonMapStore;

/// Read-only system properties with a public whitelist.
///
/// Callers the oracle does not fully trust only see whitelisted keys.
pub struct SystemProperties {
    store: JsonMapStore<String>,
    public: BTreeSet<String>,
}

impl SystemProperties {
    pub async fn load(path: impl Into<PathBuf>, public_keys: &[String]) -> Result<Self, PrefsError> {
        let store = JsonMapStore::load(path).await?;
        Ok(Self::from_store(store, public_keys))
    }

    pub fn from_store(store: JsonMapStore<String>, public_keys: &[String]) -> Self {
        Self { store, public: public_keys.iter().cloned().collect() }
    }

    pub fn is_public(&self, key: &str) -> bool {
        self.public.contains(key)
    }

    pub fn keys(&self, public_only: bool) -> Vec<String> {
        self.all(public_only).into_iter().map(|(k, _)| k).collect()
    }

    pub fn all(&self, public_only: bool) -> Vec<(String, String)> {
        self.store
            .list()
            .into_iter()
            .filter(|(k, _)| !public_only || self.is_public(k))
            .collect()
    }

    pub fn value(&self, key: &str) -> Result<String, PrefsError> {
        self.store.get(key).ok_or(PrefsError::NoSuchKey)
    }
}
