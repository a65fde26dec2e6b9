use std::path::{Component, Path, PathBuf};

use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

use super::RestoreError;
use crate::observability;
use crate::properties::app_store::AppStore;
use crate::storage::sqlite;

#[cfg(unix)]
const STORE_DIR_MODE: u32 = 0o775;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub stores: usize,
    pub rows: usize,
    /// Origins outside the preferences root, left untouched.
    pub rejected: usize,
}

/// Replays a snapshot into the application stores recorded in it.
#[derive(Debug, Clone)]
pub struct RestoreDistributor {
    prefs_dir: PathBuf,
}

impl RestoreDistributor {
    /// Only origins under `prefs_dir` are restored.
    pub fn new(prefs_dir: impl Into<PathBuf>) -> Self {
        Self { prefs_dir: prefs_dir.into() }
    }

    fn accepts(&self, dest: &Path) -> bool {
        dest.starts_with(&self.prefs_dir)
            && dest != self.prefs_dir.as_path()
            && !dest.components().any(|c| matches!(c, Component::ParentDir))
    }

    /// Restore every store recorded in `snapshot`, upserting row by row.
    ///
    /// A missing snapshot is a successful no-op. The first store that cannot
    /// be restored aborts the run; stores restored before it stay restored.
    /// Origins outside the preferences root are logged and skipped.
    pub fn apply_restore(&self, snapshot: &Path) -> Result<RestoreReport, RestoreError> {
        if !snapshot.exists() {
            info!(path = %snapshot.display(), "no backup to restore");
            return Ok(RestoreReport::default());
        }
        let conn = sqlite::open_read_only(snapshot)
            .map_err(|source| RestoreError::Open { path: snapshot.to_path_buf(), source })?;

        let mut report = RestoreReport::default();
        for origin in origins(&conn)? {
            let dest = PathBuf::from(&origin);
            if !self.accepts(&dest) {
                warn!(store = %dest.display(), root = %self.prefs_dir.display(), "origin outside preferences root; skipped");
                report.rejected += 1;
                continue;
            }
            let rows = rows_for(&conn, &origin)?;
            if let Some(parent) = dest.parent() {
                ensure_dir(parent)?;
            }
            let mut store = AppStore::open_or_create(&dest)
                .map_err(|source| RestoreError::Store { path: dest.clone(), source })?;
            let written = store
                .replay(rows)
                .map_err(|source| RestoreError::Store { path: dest.clone(), source })?;
            debug!(store = %dest.display(), rows = written, "store restored");
            report.stores += 1;
            report.rows += written;
        }

        observability::RESTORE_ROWS.inc_by(report.rows as u64);
        info!(
            path = %snapshot.display(),
            stores = report.stores,
            rows = report.rows,
            rejected = report.rejected,
            "backup restored"
        );
        Ok(report)
    }
}

fn origins(conn: &Connection) -> Result<Vec<String>, RestoreError> {
    let mut stmt = conn
        .prepare("select distinct cast(appPath as text) from lunaPrefs_backup")
        .map_err(RestoreError::Read)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(RestoreError::Read)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(RestoreError::Read)
}

fn rows_for(conn: &Connection, origin: &str) -> Result<Vec<(String, String)>, RestoreError> {
    let mut stmt = conn
        .prepare_cached("select cast(key as text), cast(value as text) from lunaPrefs_backup where appPath = ?1 order by rowid")
        .map_err(RestoreError::Read)?;
    let rows = stmt
        .query_map(params![origin], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(RestoreError::Read)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(RestoreError::Read)
}

fn ensure_dir(dir: &Path) -> Result<(), RestoreError> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(STORE_DIR_MODE);
    }
    builder
        .create(dir)
        .map_err(|source| RestoreError::CreateDir { path: dir.to_path_buf(), source })?;
    debug!(dir = %dir.display(), "created store directory");
    Ok(())
}
