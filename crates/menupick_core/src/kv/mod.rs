//! Persistent key-value medium.
//!
//! # Responsibility
//! - Define the synchronous get/set/remove/clear/info contract the item
//!   adapter is written against.
//! - Provide a file-backed implementation and a volatile in-memory one.
//!
//! # Invariants
//! - A failed `set`/`remove`/`clear` leaves previously visible values intact.
//! - `info().current_size` is the serialized size of all stored values.

use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod file_store;
mod memory_store;

pub use file_store::FileKvStore;
pub use memory_store::MemoryKvStore;

pub type KvResult<T> = Result<T, KvError>;

/// Errors raised by key-value media.
#[derive(Debug)]
pub enum KvError {
    Io(std::io::Error),
    Serde(serde_json::Error),
    /// The write would grow the store past its configured limit.
    LimitExceeded { required: u64, limit: u64 },
    /// The medium refused the call for a reason of its own.
    Rejected(String),
}

impl Display for KvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Serde(err) => write!(f, "{err}"),
            Self::LimitExceeded { required, limit } => write!(
                f,
                "storage limit exceeded: {required} bytes required, {limit} allowed"
            ),
            Self::Rejected(reason) => write!(f, "storage rejected the call: {reason}"),
        }
    }
}

impl Error for KvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Serde(err) => Some(err),
            Self::LimitExceeded { .. } | Self::Rejected(_) => None,
        }
    }
}

impl From<std::io::Error> for KvError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for KvError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Snapshot of a medium's usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvInfo {
    /// Stored keys, sorted.
    pub keys: Vec<String>,
    /// Serialized size in bytes.
    pub current_size: u64,
    /// Configured size limit in bytes, `None` when unbounded.
    pub limit_size: Option<u64>,
}

/// Synchronous key-value contract over JSON values.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> KvResult<Option<Value>>;
    fn set(&mut self, key: &str, value: Value) -> KvResult<()>;
    /// Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> KvResult<()>;
    fn clear(&mut self) -> KvResult<()>;
    fn info(&self) -> KvResult<KvInfo>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &str) -> KvResult<Option<Value>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: Value) -> KvResult<()> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> KvResult<()> {
        (**self).remove(key)
    }

    fn clear(&mut self) -> KvResult<()> {
        (**self).clear()
    }

    fn info(&self) -> KvResult<KvInfo> {
        (**self).info()
    }
}

fn serialized_size(entries: &Map<String, Value>) -> KvResult<u64> {
    let bytes = serde_json::to_vec(entries)?;
    Ok(bytes.len() as u64)
}

fn check_limit(entries: &Map<String, Value>, limit: Option<u64>) -> KvResult<u64> {
    let required = serialized_size(entries)?;
    match limit {
        Some(limit) if required > limit => Err(KvError::LimitExceeded { required, limit }),
        _ => Ok(required),
    }
}

fn info_for(entries: &Map<String, Value>, limit: Option<u64>) -> KvResult<KvInfo> {
    let mut keys = entries.keys().cloned().collect::<Vec<_>>();
    keys.sort();
    Ok(KvInfo {
        keys,
        current_size: serialized_size(entries)?,
        limit_size: limit,
    })
}
