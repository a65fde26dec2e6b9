use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::errors::PrefsError;
use crate::storage::sqlite;

/// Schema of a per-application store. Keys are not declared unique; every
/// writer goes through the count-then-update-or-insert path instead.
///
/// The `string` columns carry NUMERIC affinity, so numeric-looking text is
/// stored as INTEGER or REAL. Every read casts back to text.
pub const DATA_TABLE_DDL: &str = "create table if not exists data (key string, value string)";

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Updated,
    Inserted,
}

/// One application's key-value store: a SQLite file with a `data` table.
///
/// The connection is owned by the value and closed when it is dropped.
pub struct AppStore {
    conn: Connection,
    path: PathBuf,
}

impl AppStore {
    /// Open a store that must already exist, read-only.
    pub fn open_existing(path: &Path) -> Result<Self, PrefsError> {
        let conn = sqlite::open_read_only(path)?;
        Ok(Self { conn, path: path.to_path_buf() })
    }

    /// Open a store for writing, creating the database file and its table.
    pub fn open_or_create(path: &Path) -> Result<Self, PrefsError> {
        let conn = sqlite::open_or_create(path)?;
        let store = Self { conn, path: path.to_path_buf() };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn ensure_schema(&self) -> Result<(), PrefsError> {
        self.conn.execute_batch(DATA_TABLE_DDL)?;
        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<String>, PrefsError> {
        let mut stmt = self.conn.prepare("select cast(key as text) from data")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every `(key, value)` row in table order.
    pub fn entries(&self) -> Result<Vec<(String, String)>, PrefsError> {
        let mut stmt = self.conn.prepare("select cast(key as text), cast(value as text) from data")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn value(&self, key: &str) -> Result<String, PrefsError> {
        self.conn
            .query_row("select cast(value as text) from data where key = ?1", params![key], |row| row.get(0))
            .optional()?
            .ok_or(PrefsError::NoSuchKey)
    }

    pub fn len(&self) -> Result<usize, PrefsError> {
        let n: i64 = self.conn.query_row("select count(*) from data", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool, PrefsError> {
        Ok(self.len()? == 0)
    }

    pub fn upsert(&self, key: &str, value: &str) -> Result<Upserted, PrefsError> {
        upsert_in(&self.conn, key, value)
    }

    /// Replay `rows` inside one transaction. A row that fails is logged and
    /// skipped; the returned count is the number of rows written.
    pub fn replay<I>(&mut self, rows: I) -> Result<usize, PrefsError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let tx = self.conn.transaction()?;
        let mut written = 0;
        for (key, value) in rows {
            match upsert_in(&tx, &key, &value) {
                Ok(how) => {
                    debug!(path = %self.path.display(), %key, ?how, "restored row");
                    written += 1;
                }
                Err(e) => tracing::error!(path = %self.path.display(), %key, error = %e, "failed to restore row"),
            }
        }
        tx.commit()?;
        Ok(written)
    }

    pub fn remove(&self, key: &str) -> Result<(), PrefsError> {
        let n = self.conn.execute("delete from data where key = ?1", params![key])?;
        if n == 0 {
            return Err(PrefsError::NoSuchKey);
        }
        Ok(())
    }
}

/// Update the row for `key` if one exists, insert otherwise.
fn upsert_in(conn: &Connection, key: &str, value: &str) -> Result<Upserted, PrefsError> {
    let count: i64 = conn.query_row("select count(*) from data where key = ?1", params![key], |row| row.get(0))?;
    if count > 0 {
        conn.prepare_cached("update data set value = ?1 where key = ?2")?
            .execute(params![value, key])?;
        Ok(Upserted::Updated)
    } else {
        conn.prepare_cached("insert into data (key, value) values (?1, ?2)")?
            .execute(params![key, value])?;
        Ok(Upserted::Inserted)
    }
}
