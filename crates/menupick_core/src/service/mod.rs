//! Store use-case layer.
//!
//! # Responsibility
//! - Reconcile the in-memory item cache with whichever backend is active.
//! - Build a store from configuration, choosing the backend once.

pub mod item_store;
pub mod seed;

use crate::backend::{ItemBackend, KvItemStore, SqlItemBackend};
use crate::config::{BackendMode, StoreConfig};
use crate::db::SqliteBridge;
use crate::kv::{FileKvStore, KeyValueStore, MemoryKvStore};
use item_store::{ItemStore, StoreOptions};
use log::error;

/// Store over a backend chosen at runtime.
pub type DynItemStore = ItemStore<Box<dyn ItemBackend>>;

/// Builds an uninitialized store for `config`.
///
/// An unreadable key-value file is logged and replaced by a volatile
/// in-memory medium so the store can still come up.
pub fn open_store(config: &StoreConfig) -> DynItemStore {
    let kv: Box<dyn KeyValueStore> = match FileKvStore::open(&config.kv_path) {
        Ok(store) => Box::new(store),
        Err(err) => {
            error!(
                "event=store_open module=service status=degraded error_code=kv_open_failed error={}",
                err
            );
            Box::new(MemoryKvStore::new())
        }
    };
    let kv_items = KvItemStore::new(kv);

    let backend: Box<dyn ItemBackend> = match config.backend_mode {
        BackendMode::KeyValue => Box::new(kv_items),
        BackendMode::Relational => Box::new(SqlItemBackend::new(
            Some(SqliteBridge::new()),
            config.db_name.clone(),
            config.db_path.clone(),
            kv_items,
        )),
    };

    ItemStore::new(backend, StoreOptions::from(config))
}
