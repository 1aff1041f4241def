//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the process-wide item store to Dart via FRB.
//! - Flatten core errors into `ok + message` envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - One store per process, built from environment configuration on
//!   first use.

use log::warn;
use menupick_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, open_store,
    DynItemStore, Item, SelfTestReport, StoreConfig, StoreError,
};
use std::sync::{Mutex, OnceLock};

static STORE: OnceLock<Mutex<DynItemStore>> = OnceLock::new();

/// Expose core crate version through FFI.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory for rolling log files.
///
/// Returns an empty string on success and the error message otherwise.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Item as seen by Dart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    /// Image reference; empty when unset.
    pub image: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<Item> for MenuItem {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            name: item.name,
            image: item.image,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

/// Store lifecycle snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    /// `uninitialized|initializing|ready|ready_degraded`.
    pub state: String,
    /// `relational|key_value`.
    pub active_backend: String,
    pub item_count: u32,
    pub next_id: i64,
    pub message: String,
}

/// List envelope for reads and random picks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemListResponse {
    pub ok: bool,
    pub items: Vec<MenuItem>,
    pub message: String,
}

/// Envelope for single-item mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemActionResponse {
    pub ok: bool,
    /// Affected item for add/update.
    pub item: Option<MenuItem>,
    pub message: String,
}

impl ItemActionResponse {
    fn success(message: impl Into<String>, item: Option<Item>) -> Self {
        Self {
            ok: true,
            item: item.map(MenuItem::from),
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            item: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfoResponse {
    pub ok: bool,
    pub keys: Vec<String>,
    pub current_size: u64,
    pub limit_size: Option<u64>,
    pub active_backend: String,
    pub message: String,
}

/// Outcome of one storage self-check, one flag per step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfTestResponse {
    pub ok: bool,
    pub set_value: bool,
    pub get_value: bool,
    pub remove_value: bool,
    pub add_item: bool,
    pub update_item: bool,
    pub delete_item: bool,
    pub errors: Vec<String>,
}

impl From<SelfTestReport> for SelfTestResponse {
    fn from(report: SelfTestReport) -> Self {
        Self {
            ok: report.passed(),
            set_value: report.set_value,
            get_value: report.get_value,
            remove_value: report.remove_value,
            add_item: report.add_item,
            update_item: report.update_item,
            delete_item: report.delete_item,
            errors: report.errors,
        }
    }
}

/// Brings the store up. Idempotent.
///
/// # FFI contract
/// - Sync call; opens storage on first use.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn store_init() -> StoreStatus {
    match with_store(|store| {
        store.initialize();
        status_of(store)
    }) {
        Ok(status) => status,
        Err(message) => StoreStatus {
            state: "uninitialized".to_string(),
            active_backend: String::new(),
            item_count: 0,
            next_id: 0,
            message,
        },
    }
}

/// Cached items, newest first.
#[flutter_rust_bridge::frb(sync)]
pub fn item_list() -> ItemListResponse {
    list_response(with_store(|store| store.items().to_vec()))
}

/// Adds an item. `image` defaults to empty.
#[flutter_rust_bridge::frb(sync)]
pub fn item_add(name: String, image: Option<String>) -> ItemActionResponse {
    let image = image.unwrap_or_default();
    match with_store(|store| store.add(&name, &image)) {
        Ok(Ok(item)) => ItemActionResponse::success("Item added.", Some(item)),
        Ok(Err(err)) => action_failure("item_add", &err),
        Err(message) => ItemActionResponse::failure(message),
    }
}

/// Renames an item and replaces its image.
#[flutter_rust_bridge::frb(sync)]
pub fn item_update(id: i64, name: String, image: Option<String>) -> ItemActionResponse {
    let image = image.unwrap_or_default();
    match with_store(|store| store.update(id, &name, &image)) {
        Ok(Ok(item)) => ItemActionResponse::success("Item updated.", Some(item)),
        Ok(Err(err)) => action_failure("item_update", &err),
        Err(message) => ItemActionResponse::failure(message),
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn item_remove(id: i64) -> ItemActionResponse {
    match with_store(|store| store.remove(id)) {
        Ok(Ok(())) => ItemActionResponse::success("Item removed.", None),
        Ok(Err(err)) => action_failure("item_remove", &err),
        Err(message) => ItemActionResponse::failure(message),
    }
}

/// Case-insensitive name check; `false` when the store is unreachable.
#[flutter_rust_bridge::frb(sync)]
pub fn item_name_exists(name: String, exclude_id: Option<i64>) -> bool {
    with_store(|store| store.name_exists(&name, exclude_id)).unwrap_or(false)
}

/// Up to `count` distinct random items; every item when `count` exceeds
/// the collection.
#[flutter_rust_bridge::frb(sync)]
pub fn item_random_pick(count: u32) -> ItemListResponse {
    let count = usize::try_from(count).unwrap_or(usize::MAX);
    list_response(with_store(|store| store.random_select(count)))
}

/// Deletes every item and resets ids.
#[flutter_rust_bridge::frb(sync)]
pub fn item_clear_all() -> ItemActionResponse {
    match with_store(|store| store.clear_all()) {
        Ok(Ok(())) => ItemActionResponse::success("All items cleared.", None),
        Ok(Err(err)) => action_failure("item_clear_all", &err),
        Err(message) => ItemActionResponse::failure(message),
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn storage_info() -> StorageInfoResponse {
    match with_store(|store| store.get_storage_info()) {
        Ok(Ok(info)) => StorageInfoResponse {
            ok: true,
            keys: info.keys,
            current_size: info.current_size,
            limit_size: info.limit_size,
            active_backend: info.active_backend.to_string(),
            message: String::new(),
        },
        Ok(Err(err)) => storage_failure(err.to_string()),
        Err(message) => storage_failure(message),
    }
}

/// Round-trips a scratch value and a scratch item through storage.
///
/// # FFI contract
/// - Sync call; consumes one item id.
/// - Never panics; failures are listed in `errors`.
#[flutter_rust_bridge::frb(sync)]
pub fn storage_self_test() -> SelfTestResponse {
    let report = match with_store(|store| store.self_test()) {
        Ok(Ok(report)) => report,
        Ok(Err(err)) => SelfTestReport {
            errors: vec![format!("self_test failed: {err}")],
            ..SelfTestReport::default()
        },
        Err(message) => SelfTestReport {
            errors: vec![message],
            ..SelfTestReport::default()
        },
    };
    SelfTestResponse::from(report)
}

fn with_store<T>(f: impl FnOnce(&mut DynItemStore) -> T) -> Result<T, String> {
    let store = STORE.get_or_init(|| Mutex::new(open_store(&resolve_config())));
    let mut guard = store
        .lock()
        .map_err(|_| "item store is unavailable after a previous panic".to_string())?;
    Ok(f(&mut *guard))
}

fn resolve_config() -> StoreConfig {
    StoreConfig::from_env().unwrap_or_else(|err| {
        warn!("event=ffi_config module=ffi status=fallback error={err}");
        StoreConfig::default()
    })
}

fn status_of(store: &DynItemStore) -> StoreStatus {
    StoreStatus {
        state: store.state().to_string(),
        active_backend: store.active_backend().to_string(),
        item_count: u32::try_from(store.items().len()).unwrap_or(u32::MAX),
        next_id: store.next_id(),
        message: String::new(),
    }
}

fn list_response(result: Result<Vec<Item>, String>) -> ItemListResponse {
    match result {
        Ok(items) => ItemListResponse {
            ok: true,
            items: items.into_iter().map(MenuItem::from).collect(),
            message: String::new(),
        },
        Err(message) => ItemListResponse {
            ok: false,
            items: Vec::new(),
            message,
        },
    }
}

fn action_failure(operation: &str, err: &StoreError) -> ItemActionResponse {
    ItemActionResponse::failure(format!("{operation} failed: {err}"))
}

fn storage_failure(message: String) -> StorageInfoResponse {
    StorageInfoResponse {
        ok: false,
        keys: Vec::new(),
        current_size: 0,
        limit_size: None,
        active_backend: String::new(),
        message,
    }
}
