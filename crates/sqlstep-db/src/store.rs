use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, ToSql, params};
use serde::{Deserialize, Serialize};
use sqlstep_common::{Error, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const CONTROL_TABLE: &str = "CREATE TABLE IF NOT EXISTS migrations_applied (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    applied_at TEXT NOT NULL
);";

/// One migration that has been applied to the store, as recorded in the
/// control table. Records are append-only: written once inside the apply
/// transaction, never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub id: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Durable record of which migrations have run, plus atomic application of
/// new ones. Owns the single process-wide connection; collaborators that
/// need direct access after migrations run borrow it via [`connection`].
///
/// [`connection`]: MigrationStore::connection
pub struct MigrationStore {
    conn: Mutex<Connection>,
}

impl MigrationStore {
    /// Opens (creating if absent) the store file and ensures the control
    /// table exists. Safe to call on every startup.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::StoreUnavailable(format!(
                    "failed to create {}: {e}",
                    parent.display()
                ))
            })?;
        }

        info!("opening migration store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::StoreUnavailable(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::StoreUnavailable(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_control_table()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::StoreUnavailable(format!("failed to open in-memory database: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_control_table()?;
        Ok(store)
    }

    fn init_control_table(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(CONTROL_TABLE)
            .map_err(|e| Error::StoreUnavailable(format!("failed to create control table: {e}")))?;
        Ok(())
    }

    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("migration store lock poisoned".into()))
    }

    /// Names of every migration currently recorded. Callers use this for
    /// membership testing only; no ordering is guaranteed.
    pub fn list_applied(&self) -> Result<HashSet<String>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare("SELECT name FROM migrations_applied")
            .map_err(|e| Error::Database(format!("failed to prepare applied query: {e}")))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(format!("failed to read applied migrations: {e}")))?;

        rows.collect::<std::result::Result<HashSet<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect applied migrations: {e}")))
    }

    /// Full application history in the order migrations were applied.
    pub fn applied_records(&self) -> Result<Vec<AppliedMigration>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare("SELECT id, name, applied_at FROM migrations_applied ORDER BY id")
            .map_err(|e| Error::Database(format!("failed to prepare history query: {e}")))?;

        let rows = stmt
            .query_map([], row_to_record)
            .map_err(|e| Error::Database(format!("failed to read migration history: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect migration history: {e}")))
    }

    /// Executes `sql` and records `name` in the control table, both inside a
    /// single transaction. If anything fails the transaction rolls back and
    /// neither the schema change nor the record is persisted.
    ///
    /// Re-applying an already-recorded name fails with
    /// [`Error::DuplicateName`]; callers pre-filter with [`list_applied`] in
    /// normal operation.
    ///
    /// [`list_applied`]: MigrationStore::list_applied
    pub fn apply(&self, name: &str, sql: &str) -> Result<()> {
        info!("applying migration {name}");
        let mut conn = self.connection()?;
        let tx = conn.transaction().map_err(|e| Error::Migration {
            name: name.to_string(),
            message: format!("failed to begin transaction: {e}"),
        })?;

        tx.execute_batch(sql).map_err(|e| Error::Migration {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        tx.execute(
            "INSERT INTO migrations_applied (name, applied_at) VALUES (?1, datetime('now'))",
            params![name],
        )
        .map_err(|e| match &e {
            rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
                Error::DuplicateName(name.to_string())
            }
            _ => Error::Migration {
                name: name.to_string(),
                message: format!("failed to record migration: {e}"),
            },
        })?;

        tx.commit().map_err(|e| Error::Migration {
            name: name.to_string(),
            message: format!("failed to commit: {e}"),
        })?;

        Ok(())
    }

    /// Ad hoc read path for debugging and embedding callers. Each result row
    /// becomes a JSON object keyed by column name. Not transactional beyond
    /// the statement itself.
    pub fn query(&self, sql: &str, query_params: &[&dyn ToSql]) -> Result<Vec<serde_json::Value>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt
            .query(query_params)
            .map_err(|e| Error::Database(format!("failed to execute query: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| Error::Database(format!("failed to read query row: {e}")))?
        {
            let mut obj = serde_json::Map::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                let value = row
                    .get_ref(i)
                    .map_err(|e| Error::Database(format!("failed to read column {column}: {e}")))?;
                obj.insert(column.clone(), value_ref_to_json(value));
            }
            out.push(serde_json::Value::Object(obj));
        }

        Ok(out)
    }
}

fn value_ref_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(v) => serde_json::Value::from(v),
        ValueRef::Real(v) => serde_json::Value::from(v),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::Array(
            b.iter().map(|&byte| serde_json::Value::from(byte)).collect(),
        ),
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AppliedMigration> {
    let applied_at_str: String = row.get(2)?;
    let applied_at = parse_timestamp(&applied_at_str).map_err(|e| {
        rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(e.to_string())))
    })?;

    Ok(AppliedMigration {
        id: row.get(0)?,
        name: row.get(1)?,
        applied_at,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }

    Err(Error::Database(format!("invalid timestamp format: {raw}")))
}
