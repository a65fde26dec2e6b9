//! Runtime environment helpers
//!
//! Thin wrapper around `common::env` to keep binary crates importing
//! `service::runtime::ensure_env` without depending directly on `common`.

use std::path::Path;

/// Ensure the preferences root exists; warn when the system properties file is missing.
pub async fn ensure_env(prefs_dir: &Path, system_properties_file: &Path) -> anyhow::Result<()> {
    common::env::ensure_env(prefs_dir, system_properties_file).await
}
