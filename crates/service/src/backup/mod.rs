//! Snapshot backup and restore of every application store.
//!
//! [`BackupConsolidator`] merges all per-app stores under the preferences root
//! into one snapshot file; [`RestoreDistributor`] replays a snapshot back into
//! the stores it came from. Both run to completion synchronously.

pub mod consolidate;
pub mod restore;

use std::path::PathBuf;

use thiserror::Error;

use crate::errors::PrefsError;

pub use consolidate::{BackupConsolidator, BackupReport};
pub use restore::{RestoreDistributor, RestoreReport};

/// Table holding the consolidated rows. `key` alone is the primary key, so two
/// stores sharing a key collide and only the first one merged is kept.
pub const SNAPSHOT_TABLE_DDL: &str =
    "create table if not exists lunaPrefs_backup (appPath string, key string, value string, primary key (key))";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("unable to open backup file {}: {source}", .path.display())]
    Open { path: PathBuf, source: rusqlite::Error },
    #[error("unable to prepare backup file {}: {source}", .path.display())]
    Schema { path: PathBuf, source: rusqlite::Error },
    #[error("backup transaction failed: {0}")]
    Transaction(rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("unable to open backup file {}: {source}", .path.display())]
    Open { path: PathBuf, source: rusqlite::Error },
    #[error("unable to read backup file: {0}")]
    Read(rusqlite::Error),
    #[error("unable to create directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: std::io::Error },
    #[error("unable to restore {}: {source}", .path.display())]
    Store { path: PathBuf, source: PrefsError },
}
