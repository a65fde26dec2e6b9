use std::{collections::BTreeMap, path::PathBuf, sync::RwLock};
use tokio::fs;
use tracing::warn;

use crate::errors::PrefsError;

/// Generic JSON file-backed key-value map.
///
/// Loads a `BTreeMap<String, V>` from a JSON object file. A missing file is an
/// empty map; a file that is present but unparsable is an error. Reads are
/// synchronous so they can run inside continuations.
pub struct JsonMapStore<V> {
    inner: RwLock<BTreeMap<String, V>>,
    file_path: PathBuf,
}

impl<V> JsonMapStore<V>
where
    V: serde::de::DeserializeOwned + Clone,
{
    /// Load the map from `path`.
    pub async fn load<P: Into<PathBuf>>(path: P) -> Result<Self, PrefsError> {
        let file_path = path.into();
        let map = match fs::read(&file_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| PrefsError::Io(format!("{}: {e}", file_path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(file = %file_path.display(), "map file missing; starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(PrefsError::Io(format!("{}: {e}", file_path.display()))),
        };
        Ok(Self::from_map(file_path, map))
    }

    pub fn from_map(file_path: PathBuf, map: BTreeMap<String, V>) -> Self {
        Self { inner: RwLock::new(map), file_path }
    }

    pub fn file_path(&self) -> &PathBuf { &self.file_path }

    /// List all entries as `(key, value)` pairs, ordered by key.
    pub fn list(&self) -> Vec<(String, V)> {
        let map = self.inner.read().unwrap_or_else(|p| p.into_inner());
        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Get value by key.
    pub fn get(&self, key: &str) -> Option<V> {
        let map = self.inner.read().unwrap_or_else(|p| p.into_inner());
        map.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let map = self.inner.read().unwrap_or_else(|p| p.into_inner());
        map.contains_key(key)
    }
}
