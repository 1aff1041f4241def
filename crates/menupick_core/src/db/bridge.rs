//! SQL bridge contract and its SQLite implementation.
//!
//! # Responsibility
//! - Mirror the native bridge surface: open, execute, select, close.
//! - Convert result sets into column-name keyed rows.
//!
//! # Invariants
//! - `open` is idempotent for the same database name.
//! - Statements issued before `open` fail with `DbError::NotOpen`.

use super::open::{open_db, open_db_in_memory, MEMORY_DB_PATH};
use super::{DbError, DbResult};
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::collections::BTreeMap;
use std::path::Path;

/// One result row, keyed by column name.
pub type SqlRow = BTreeMap<String, Value>;

/// Asynchronous-native SQL bridge as seen from Rust: one logical database.
pub trait SqlBridge: Send {
    /// Opens or creates the named database at `path`.
    fn open(&mut self, name: &str, path: &Path) -> DbResult<()>;
    /// Runs a statement and returns the number of changed rows.
    fn execute_sql(&mut self, sql: &str, params: &[Value]) -> DbResult<usize>;
    /// Runs a row-returning statement (including `... RETURNING`).
    fn select_sql(&mut self, sql: &str, params: &[Value]) -> DbResult<Vec<SqlRow>>;
    fn close(&mut self) -> DbResult<()>;
}

impl<T: SqlBridge + ?Sized> SqlBridge for Box<T> {
    fn open(&mut self, name: &str, path: &Path) -> DbResult<()> {
        (**self).open(name, path)
    }

    fn execute_sql(&mut self, sql: &str, params: &[Value]) -> DbResult<usize> {
        (**self).execute_sql(sql, params)
    }

    fn select_sql(&mut self, sql: &str, params: &[Value]) -> DbResult<Vec<SqlRow>> {
        (**self).select_sql(sql, params)
    }

    fn close(&mut self) -> DbResult<()> {
        (**self).close()
    }
}

/// `rusqlite`-backed bridge.
#[derive(Debug, Default)]
pub struct SqliteBridge {
    conn: Option<Connection>,
    name: Option<String>,
}

impl SqliteBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn conn(&self) -> DbResult<&Connection> {
        self.conn.as_ref().ok_or(DbError::NotOpen)
    }
}

impl SqlBridge for SqliteBridge {
    fn open(&mut self, name: &str, path: &Path) -> DbResult<()> {
        if self.conn.is_some() {
            if self.name.as_deref() == Some(name) {
                return Ok(());
            }
            return Err(DbError::Rejected(format!(
                "bridge already holds database `{}`",
                self.name.as_deref().unwrap_or_default()
            )));
        }

        let conn = if path.as_os_str() == MEMORY_DB_PATH {
            open_db_in_memory()?
        } else {
            open_db(path)?
        };
        info!("event=bridge_open module=db status=ok name={name}");
        self.conn = Some(conn);
        self.name = Some(name.to_string());
        Ok(())
    }

    fn execute_sql(&mut self, sql: &str, params: &[Value]) -> DbResult<usize> {
        let changed = self.conn()?.execute(sql, params_from_iter(params.iter()))?;
        debug!("event=bridge_execute module=db status=ok changed={changed}");
        Ok(changed)
    }

    fn select_sql(&mut self, sql: &str, params: &[Value]) -> DbResult<Vec<SqlRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut mapped = SqlRow::new();
            for (index, column) in columns.iter().enumerate() {
                mapped.insert(column.clone(), row.get::<_, Value>(index)?);
            }
            out.push(mapped);
        }
        debug!("event=bridge_select module=db status=ok rows={}", out.len());
        Ok(out)
    }

    fn close(&mut self) -> DbResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        self.name = None;
        conn.close().map_err(|(_, err)| {
            warn!("event=bridge_close module=db status=error error={err}");
            DbError::from(err)
        })
    }
}
