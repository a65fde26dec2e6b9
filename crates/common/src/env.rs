//! Environment/runtime helpers
//!
//! Sanity checks to ensure expected directories exist at startup.

use std::path::Path;

use tracing::warn;

/// Ensure the preferences root exists and warn when the system property
/// source is missing (the service still starts, serving an empty map).
pub async fn ensure_env(prefs_dir: &Path, system_properties_file: &Path) -> anyhow::Result<()> {
    if tokio::fs::metadata(system_properties_file).await.is_err() {
        warn!(
            file = %system_properties_file.display(),
            "system properties file not found; system keys will be empty"
        );
    }
    tokio::fs::create_dir_all(prefs_dir)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {e}", prefs_dir.display()))?;
    Ok(())
}
