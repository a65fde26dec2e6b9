use std::path::{Path, PathBuf};

use rusqlite::{params, CachedStatement, TransactionBehavior};
use tracing::{debug, info, warn};

use super::{BackupError, SNAPSHOT_TABLE_DDL};
use crate::observability;
use crate::properties::app_store::AppStore;
use crate::storage::sqlite;

const INSERT_ROW: &str = "insert into lunaPrefs_backup (appPath, key, value) values (?1, ?2, ?3)";

/// Result of one backup run. Skipped rows do not make the run a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    pub path: PathBuf,
    pub stores: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
}

#[derive(Debug, Clone)]
pub struct BackupConsolidator {
    prefs_dir: PathBuf,
    store_file: String,
}

impl BackupConsolidator {
    pub fn new(prefs_dir: impl Into<PathBuf>, store_file: impl Into<String>) -> Self {
        Self { prefs_dir: prefs_dir.into(), store_file: store_file.into() }
    }

    /// Where a backup goes: `<temp_dir>/<file_name>` when the caller names a
    /// directory, `default` otherwise.
    pub fn backup_path(temp_dir: Option<&Path>, default: &Path, file_name: &str) -> PathBuf {
        match temp_dir {
            Some(dir) => dir.join(file_name),
            None => default.to_path_buf(),
        }
    }

    /// Store files of every immediate subdirectory of the preferences root
    /// that has one. An unreadable root yields no stores.
    pub fn discover_stores(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.prefs_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.prefs_dir.display(), error = %e, "cannot enumerate preference stores");
                return Vec::new();
            }
        };
        let mut stores: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.path().join(&self.store_file))
            .filter(|candidate| candidate.is_file())
            .collect();
        stores.sort();
        stores
    }

    /// Merge every discovered store into a fresh snapshot at `dest`, inside one
    /// immediate transaction.
    pub fn create_backup(&self, dest: &Path) -> Result<BackupReport, BackupError> {
        match std::fs::remove_file(dest) {
            Ok(()) => debug!(path = %dest.display(), "removed previous backup"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %dest.display(), error = %e, "cannot remove previous backup"),
        }

        let stores = self.discover_stores();
        let mut conn = sqlite::open_or_create(dest)
            .map_err(|source| BackupError::Open { path: dest.to_path_buf(), source })?;
        conn.execute_batch(SNAPSHOT_TABLE_DDL)
            .map_err(|source| BackupError::Schema { path: dest.to_path_buf(), source })?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(BackupError::Transaction)?;
        let mut report = BackupReport { path: dest.to_path_buf(), stores: stores.len(), ..Default::default() };
        {
            let mut insert = tx.prepare_cached(INSERT_ROW).map_err(BackupError::Transaction)?;
            for store in &stores {
                let (written, skipped) = merge_store(&mut insert, store);
                report.rows_written += written;
                report.rows_skipped += skipped;
            }
        }
        tx.commit().map_err(BackupError::Transaction)?;

        observability::BACKUP_ROWS_WRITTEN.inc_by(report.rows_written as u64);
        observability::BACKUP_ROWS_SKIPPED.inc_by(report.rows_skipped as u64);
        info!(
            path = %report.path.display(),
            stores = report.stores,
            written = report.rows_written,
            skipped = report.rows_skipped,
            "backup created"
        );
        Ok(report)
    }
}

/// Copy one store's rows into the snapshot. Returns `(written, skipped)`.
fn merge_store(insert: &mut CachedStatement<'_>, store: &Path) -> (usize, usize) {
    let rows = match AppStore::open_existing(store).and_then(|s| s.entries()) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(store = %store.display(), error = %e, "skipping unreadable store");
            return (0, 0);
        }
    };
    let origin = store.to_string_lossy().into_owned();
    let (mut written, mut skipped) = (0, 0);
    for (key, value) in rows {
        match insert.execute(params![origin, key, value]) {
            Ok(_) => {
                debug!(store = %origin, %key, "row merged");
                written += 1;
            }
            Err(e) if sqlite::is_constraint_violation(&e) => {
                warn!(store = %origin, %key, "key already recorded by another store; row skipped");
                skipped += 1;
            }
            Err(e) => {
                warn!(store = %origin, %key, error = %e, "row skipped");
                skipped += 1;
            }
        }
    }
    (written, skipped)
}
