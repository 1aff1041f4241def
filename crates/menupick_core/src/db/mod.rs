//! SQLite bridge and connection bootstrap.
//!
//! # Responsibility
//! - Define the bridge contract the relational backend talks to.
//! - Open and configure SQLite connections for that bridge.
//!
//! # Invariants
//! - Bridge calls never panic; every failure is a `DbError`.
//! - Rows are returned as column-name to value maps.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod bridge;
mod open;

pub use bridge::{SqlBridge, SqlRow, SqliteBridge};
pub use open::{open_db, open_db_in_memory, MEMORY_DB_PATH};
pub use rusqlite::types::Value as SqlValue;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// A statement was issued before `open` succeeded.
    NotOpen,
    /// The bridge refused the call without a SQLite error.
    Rejected(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::NotOpen => write!(f, "database is not open"),
            Self::Rejected(reason) => write!(f, "sql bridge rejected the call: {reason}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::NotOpen | Self::Rejected(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
