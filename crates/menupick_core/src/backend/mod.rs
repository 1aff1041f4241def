//! Persistence backends behind one capability.
//!
//! # Responsibility
//! - Define `ItemBackend`, the contract both storage media implement.
//! - Separate semantic outcomes (`NotFound`, validation) from transport
//!   failures so the store can decide between surfacing and degrading.
//!
//! # Invariants
//! - `add_item` returns the item exactly as persisted, with its issued id.
//! - `next_id` is strictly greater than every id the medium ever issued.
//! - `update_item`/`delete_item` report `NotFound` without side effects.

use crate::db::DbError;
use crate::kv::{KvError, KvInfo};
use crate::model::item::{Item, ItemId, ItemValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod kv_backend;
mod sql_backend;

pub use kv_backend::{KvItemStore, ITEMS_KEY, NEXT_ID_KEY};
pub use self_test::{SelfTestReport, SELF_TEST_KEY};
pub use sql_backend::{SqlItemBackend, ITEMS_TABLE};

pub type BackendResult<T> = Result<T, BackendError>;

/// Physical medium serving a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Relational,
    KeyValue,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::KeyValue => "key_value",
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-level error.
#[derive(Debug)]
pub enum BackendError {
    /// The medium is not present in this process (e.g. no SQL bridge).
    Unavailable(String),
    NotFound(ItemId),
    Validation(ItemValidationError),
    /// Persisted data cannot be decoded into items.
    InvalidData(String),
    Kv(KvError),
    Db(DbError),
}

impl BackendError {
    /// Whether this error is a transport/medium failure rather than a
    /// semantic rejection of the request.
    pub fn is_medium_failure(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::InvalidData(_) | Self::Kv(_) | Self::Db(_)
        )
    }
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "backend unavailable: {reason}"),
            Self::NotFound(id) => write!(f, "item not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted item data: {message}"),
            Self::Kv(err) => write!(f, "key-value storage failed: {err}"),
            Self::Db(err) => write!(f, "sql storage failed: {err}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Kv(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Unavailable(_) | Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<ItemValidationError> for BackendError {
    fn from(value: ItemValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<KvError> for BackendError {
    fn from(value: KvError) -> Self {
        Self::Kv(value)
    }
}

impl From<DbError> for BackendError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Storage usage reported to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    pub keys: Vec<String>,
    /// Bytes.
    pub current_size: u64,
    /// Bytes; `None` when unbounded.
    pub limit_size: Option<u64>,
    pub active_backend: BackendKind,
}

impl StorageInfo {
    pub(crate) fn from_kv(info: KvInfo, active_backend: BackendKind) -> Self {
        Self {
            keys: info.keys,
            current_size: info.current_size,
            limit_size: info.limit_size,
            active_backend,
        }
    }
}

/// Persistence capability shared by the relational and key-value media.
///
/// Names passed to writes are already normalized by the caller; backends
/// trim them again but do not enforce uniqueness.
pub trait ItemBackend: Send {
    /// Preferred medium of this backend.
    fn kind(&self) -> BackendKind;

    /// Brings the medium up and returns the medium that will serve calls.
    ///
    /// # Errors
    /// - `Unavailable` when the preferred medium is absent; the backend stays
    ///   usable through its fallback.
    fn init(&mut self) -> BackendResult<BackendKind>;

    /// All items, newest first.
    fn get_all_items(&mut self) -> BackendResult<Vec<Item>>;

    fn add_item(&mut self, name: &str, image: &str) -> BackendResult<Item>;

    fn update_item(&mut self, id: ItemId, name: &str, image: &str) -> BackendResult<Item>;

    fn delete_item(&mut self, id: ItemId) -> BackendResult<()>;

    /// Case-insensitive name lookup, ignoring `exclude_id`.
    fn name_exists(&mut self, name: &str, exclude_id: Option<ItemId>) -> BackendResult<bool>;

    /// Next id this medium would issue.
    fn next_id(&mut self) -> BackendResult<ItemId>;

    /// Replaces the whole collection and counter (seeding).
    fn replace_all(&mut self, items: &[Item], next_id: ItemId) -> BackendResult<()>;

    /// Empties the collection and resets the counter.
    fn clear_all(&mut self) -> BackendResult<()>;

    fn storage_info(&self) -> BackendResult<StorageInfo>;

    /// Medium that served the most recent call.
    fn last_served(&self) -> BackendKind {
        self.kind()
    }

    /// Write/read/delete round trip against the live media.
    fn self_test(&mut self) -> SelfTestReport;

    /// Releases the medium. Later calls may fall back or fail.
    fn close(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

impl<T: ItemBackend + ?Sized> ItemBackend for Box<T> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    fn init(&mut self) -> BackendResult<BackendKind> {
        (**self).init()
    }

    fn get_all_items(&mut self) -> BackendResult<Vec<Item>> {
        (**self).get_all_items()
    }

    fn add_item(&mut self, name: &str, image: &str) -> BackendResult<Item> {
        (**self).add_item(name, image)
    }

    fn update_item(&mut self, id: ItemId, name: &str, image: &str) -> BackendResult<Item> {
        (**self).update_item(id, name, image)
    }

    fn delete_item(&mut self, id: ItemId) -> BackendResult<()> {
        (**self).delete_item(id)
    }

    fn name_exists(&mut self, name: &str, exclude_id: Option<ItemId>) -> BackendResult<bool> {
        (**self).name_exists(name, exclude_id)
    }

    fn next_id(&mut self) -> BackendResult<ItemId> {
        (**self).next_id()
    }

    fn replace_all(&mut self, items: &[Item], next_id: ItemId) -> BackendResult<()> {
        (**self).replace_all(items, next_id)
    }

    fn clear_all(&mut self) -> BackendResult<()> {
        (**self).clear_all()
    }

    fn storage_info(&self) -> BackendResult<StorageInfo> {
        (**self).storage_info()
    }

    fn last_served(&self) -> BackendKind {
        (**self).last_served()
    }

    fn self_test(&mut self) -> SelfTestReport {
        (**self).self_test()
    }

    fn close(&mut self) -> BackendResult<()> {
        (**self).close()
    }
}
