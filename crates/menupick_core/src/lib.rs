//! Core of MenuPick: a persisted dish list with random picking.
//! Every storage and consistency rule lives in this crate.

pub mod backend;
pub mod config;
pub mod db;
pub mod kv;
pub mod logging;
pub mod model;
pub mod service;

pub use backend::{
    BackendError, BackendKind, ItemBackend, KvItemStore, SelfTestReport, SqlItemBackend,
    StorageInfo,
};
pub use config::{BackendMode, ConfigError, FailurePolicy, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::item::{Item, ItemId, ItemValidationError};
pub use service::item_store::{ItemStore, StoreError, StoreOptions, StoreResult, StoreState};
pub use service::{open_store, DynItemStore};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
