//! Item store: the cache-reconciling façade over one backend.
//!
//! # Responsibility
//! - Hold the authoritative in-memory item cache and id counter.
//! - Enforce case-insensitive name uniqueness before any write.
//! - Keep the cache in step with the backend after every mutation.
//!
//! # Invariants
//! - Cached ids are unique.
//! - `next_id` is strictly greater than every id issued so far.
//! - A rejected operation leaves the cache exactly as it was.
//! - State only moves forward: `Uninitialized -> Initializing -> Ready`,
//!   and `Ready -> ReadyDegraded` when a write lands in memory only.
//!
//! # Cache policy
//! - `add` reloads the full collection so backend-issued ids stay
//!   authoritative. When the write was served by a fallback medium, or the
//!   reload fails or disagrees with the created record, the created item is
//!   patched into the current cache instead.
//! - `update` and `remove` patch the single affected entry.

use super::seed;
use crate::backend::{
    BackendError, BackendKind, BackendResult, ItemBackend, SelfTestReport, StorageInfo,
};
use crate::config::{FailurePolicy, StoreConfig};
use crate::model::item::{
    contains_name, next_id_after, normalize_name, Item, ItemId, ItemValidationError,
    FIRST_ITEM_ID,
};
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type StoreResult<T> = Result<T, StoreError>;

/// Lifecycle of one store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Initializing,
    Ready,
    /// Ready, but the cache holds changes that never reached a backend.
    /// Further mutations stay in memory.
    ReadyDegraded,
}

impl StoreState {
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready | Self::ReadyDegraded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::ReadyDegraded => "ready_degraded",
        }
    }
}

impl Display for StoreState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced to store callers. `Display` is the user-facing reason.
#[derive(Debug)]
pub enum StoreError {
    /// A mutation was issued before `initialize` completed.
    NotReady(StoreState),
    Validation(ItemValidationError),
    DuplicateName(String),
    NotFound(ItemId),
    /// Every medium rejected the write (strict policy only).
    WriteFailed(String),
    /// Storage metadata could not be read.
    StorageUnavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReady(state) => write!(f, "store is not ready (state: {state})"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::DuplicateName(name) => write!(f, "an item named `{name}` already exists"),
            Self::NotFound(id) => write!(f, "item not found: {id}"),
            Self::WriteFailed(reason) => write!(f, "write failed: {reason}"),
            Self::StorageUnavailable(reason) => write!(f, "storage unavailable: {reason}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ItemValidationError> for StoreError {
    fn from(value: ItemValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<BackendError> for StoreError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::NotFound(id) => Self::NotFound(id),
            BackendError::Validation(err) => Self::Validation(err),
            other => Self::WriteFailed(other.to_string()),
        }
    }
}

/// Per-store behavior fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub failure_policy: FailurePolicy,
    pub seed_when_empty: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Strict,
            seed_when_empty: true,
        }
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            failure_policy: config.failure_policy,
            seed_when_empty: config.seed_when_empty,
        }
    }
}

/// Cache-reconciling store over one [`ItemBackend`].
///
/// Mutations take `&mut self`, so two of them can never interleave on the
/// same instance.
pub struct ItemStore<B: ItemBackend> {
    backend: B,
    options: StoreOptions,
    state: StoreState,
    items: Vec<Item>,
    next_id: ItemId,
    active_backend: BackendKind,
}

impl<B: ItemBackend> ItemStore<B> {
    pub fn new(backend: B, options: StoreOptions) -> Self {
        let active_backend = backend.kind();
        Self {
            backend,
            options,
            state: StoreState::Uninitialized,
            items: Vec::new(),
            next_id: FIRST_ITEM_ID,
            active_backend,
        }
    }

    /// Cached items, newest first.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn next_id(&self) -> ItemId {
        self.next_id
    }

    /// Medium that serves calls after initialization.
    pub fn active_backend(&self) -> BackendKind {
        self.active_backend
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Brings up the backend and loads the cache.
    ///
    /// Always ends in a ready state. An empty medium that never issued an id
    /// is seeded with the default dishes; a medium that cannot be read is
    /// left as is and the defaults are served from memory. Repeated calls
    /// are no-ops.
    pub fn initialize(&mut self) -> StoreState {
        if self.state.is_ready() {
            debug!(
                "event=store_init module=service status=skipped state={}",
                self.state
            );
            return self.state;
        }

        let started_at = Instant::now();
        self.state = StoreState::Initializing;
        info!(
            "event=store_init module=service status=start backend={}",
            self.backend.kind()
        );

        self.active_backend = match self.backend.init() {
            Ok(kind) => kind,
            Err(err) => {
                warn!(
                    "event=store_init module=service status=fallback backend=key_value error={}",
                    err
                );
                BackendKind::KeyValue
            }
        };

        match self.backend.get_all_items() {
            Ok(items) if items.is_empty() && self.options.seed_when_empty && self.is_pristine() => {
                let persisted = self
                    .backend
                    .replace_all(&seed::default_items(), seed::default_next_id());
                self.install_defaults(persisted);
            }
            Ok(items) => {
                self.items = items;
                self.refresh_next_id();
                self.state = StoreState::Ready;
            }
            Err(err) => {
                // Unreadable data stays on the medium; defaults live in memory only.
                error!(
                    "event=store_init module=service status=error error_code=load_failed error={}",
                    err
                );
                self.install_defaults(Err(err));
            }
        }

        info!(
            "event=store_init module=service status=ok state={} backend={} items={} next_id={} duration_ms={}",
            self.state,
            self.active_backend,
            self.items.len(),
            self.next_id,
            started_at.elapsed().as_millis()
        );
        self.state
    }

    /// Case-insensitive name check against the cache and the backend.
    ///
    /// A name held by either counts, so a backend that sees only part of the
    /// collection cannot let a duplicate through.
    pub fn name_exists(&mut self, name: &str, exclude_id: Option<ItemId>) -> bool {
        let cached = contains_name(&self.items, name, exclude_id);
        if cached || self.state == StoreState::ReadyDegraded {
            return cached;
        }
        match self.backend.name_exists(name, exclude_id) {
            Ok(exists) => exists,
            Err(err) => {
                warn!(
                    "event=name_exists module=service status=fallback source=cache error={}",
                    err
                );
                false
            }
        }
    }

    /// Adds a new item and returns it with its issued id.
    ///
    /// # Errors
    /// - `Validation` when `name` is blank.
    /// - `DuplicateName` when another item has the same name (any case).
    /// - `WriteFailed` when every medium rejected the write (strict policy).
    pub fn add(&mut self, name: &str, image: &str) -> StoreResult<Item> {
        self.ensure_ready("item_add")?;
        let name = normalize_name(name)?;
        if self.name_exists(&name, None) {
            info!("event=item_add module=service status=rejected reason=duplicate_name");
            return Err(StoreError::DuplicateName(name));
        }
        if self.state == StoreState::ReadyDegraded {
            return Ok(self.add_local(name, image));
        }

        match self.backend.add_item(&name, image) {
            Ok(created) => {
                self.sync_after_add(&created);
                info!(
                    "event=item_add module=service status=ok id={} next_id={}",
                    created.id, self.next_id
                );
                Ok(created)
            }
            Err(err) => {
                self.absorb_write_failure("item_add", err)?;
                Ok(self.add_local(name, image))
            }
        }
    }

    /// Renames an item and replaces its image.
    ///
    /// # Errors
    /// - `DuplicateName` when another item already has `name`.
    /// - `NotFound` when `id` is unknown; the cache is untouched.
    /// - `WriteFailed` when every medium rejected the write (strict policy).
    pub fn update(&mut self, id: ItemId, name: &str, image: &str) -> StoreResult<Item> {
        self.ensure_ready("item_update")?;
        let name = normalize_name(name)?;
        if self.name_exists(&name, Some(id)) {
            info!("event=item_update module=service status=rejected reason=duplicate_name id={id}");
            return Err(StoreError::DuplicateName(name));
        }
        if self.state == StoreState::ReadyDegraded {
            return self.update_local(id, &name, image);
        }

        match self.backend.update_item(id, &name, image) {
            Ok(updated) => {
                self.patch_cached(updated.clone());
                info!("event=item_update module=service status=ok id={id}");
                Ok(updated)
            }
            Err(err) => {
                self.absorb_write_failure("item_update", err)?;
                self.update_local(id, &name, image)
            }
        }
    }

    /// Deletes an item by id.
    ///
    /// # Errors
    /// - `NotFound` when `id` is unknown; the cache is untouched.
    /// - `WriteFailed` when every medium rejected the write (strict policy).
    pub fn remove(&mut self, id: ItemId) -> StoreResult<()> {
        self.ensure_ready("item_remove")?;
        if self.state == StoreState::ReadyDegraded {
            return self.remove_local(id);
        }

        match self.backend.delete_item(id) {
            Ok(()) => {
                self.items.retain(|item| item.id != id);
                info!("event=item_remove module=service status=ok id={id}");
                Ok(())
            }
            Err(err) => {
                self.absorb_write_failure("item_remove", err)?;
                self.remove_local(id)
            }
        }
    }

    /// Up to `count` distinct cached items in random order.
    pub fn random_select(&self, count: usize) -> Vec<Item> {
        self.random_select_with(count, &mut rand::thread_rng())
    }

    /// [`random_select`](Self::random_select) with a caller-supplied RNG.
    pub fn random_select_with<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<Item> {
        let mut shuffled = self.items.clone();
        shuffled.shuffle(rng);
        shuffled.truncate(count);
        shuffled
    }

    /// Empties the collection and resets the counter everywhere.
    pub fn clear_all(&mut self) -> StoreResult<()> {
        self.ensure_ready("items_clear")?;
        if self.state != StoreState::ReadyDegraded {
            if let Err(err) = self.backend.clear_all() {
                self.absorb_write_failure("items_clear", err)?;
            }
        }
        self.items.clear();
        self.next_id = FIRST_ITEM_ID;
        info!("event=items_clear module=service status=ok state={}", self.state);
        Ok(())
    }

    pub fn get_storage_info(&self) -> StoreResult<StorageInfo> {
        self.backend
            .storage_info()
            .map_err(|err| StoreError::StorageUnavailable(err.to_string()))
    }

    /// Exercises the key-value medium and one item add/update/delete cycle.
    ///
    /// The cycle consumes one id. A degraded store reports failure without
    /// touching any medium.
    pub fn self_test(&mut self) -> StoreResult<SelfTestReport> {
        self.ensure_ready("self_test")?;
        if self.state == StoreState::ReadyDegraded {
            return Ok(SelfTestReport {
                errors: vec!["store is degraded; media were not exercised".to_string()],
                ..SelfTestReport::default()
            });
        }

        let report = self.backend.self_test();
        self.refresh_next_id();
        if report.passed() {
            info!("event=self_test module=service status=ok next_id={}", self.next_id);
        } else {
            warn!(
                "event=self_test module=service status=error errors={}",
                report.errors.len()
            );
        }
        Ok(report)
    }

    /// Releases the backend. The cache stays readable.
    pub fn close(&mut self) -> StoreResult<()> {
        self.backend.close().map_err(StoreError::from)
    }

    fn ensure_ready(&self, operation: &str) -> StoreResult<()> {
        if self.state.is_ready() {
            return Ok(());
        }
        warn!(
            "event={} module=service status=rejected reason=not_ready state={}",
            operation, self.state
        );
        Err(StoreError::NotReady(self.state))
    }

    fn is_pristine(&mut self) -> bool {
        matches!(self.backend.next_id(), Ok(FIRST_ITEM_ID))
    }

    fn install_defaults(&mut self, persisted: BackendResult<()>) {
        self.items = seed::default_items();
        self.next_id = seed::default_next_id();
        self.state = StoreState::Ready;

        match persisted {
            Ok(()) => info!(
                "event=store_seed module=service status=ok items={}",
                self.items.len()
            ),
            Err(err) => match self.options.failure_policy {
                FailurePolicy::Strict => error!(
                    "event=store_seed module=service status=error error_code=seed_not_persisted error={}",
                    err
                ),
                FailurePolicy::Degrade => self.enter_degraded("store_seed", &err),
            },
        }
    }

    /// Decides what a failed backend write means for the caller.
    ///
    /// Semantic errors are always returned. Medium failures are returned as
    /// `WriteFailed` under the strict policy; under the degrade policy the
    /// store enters `ReadyDegraded` and the caller applies the change locally.
    fn absorb_write_failure(
        &mut self,
        operation: &'static str,
        err: BackendError,
    ) -> StoreResult<()> {
        if !err.is_medium_failure() {
            return Err(err.into());
        }
        match self.options.failure_policy {
            FailurePolicy::Strict => {
                error!(
                    "event={} module=service status=error error_code=write_failed error={}",
                    operation, err
                );
                Err(StoreError::WriteFailed(err.to_string()))
            }
            FailurePolicy::Degrade => {
                self.enter_degraded(operation, &err);
                Ok(())
            }
        }
    }

    fn enter_degraded(&mut self, operation: &str, err: &BackendError) {
        if self.state != StoreState::ReadyDegraded {
            error!(
                "event={} module=service status=degraded from_state={} error={}",
                operation, self.state, err
            );
        }
        self.state = StoreState::ReadyDegraded;
    }

    fn sync_after_add(&mut self, created: &Item) {
        let served = self.backend.last_served();
        if served != self.backend.kind() {
            // Written through the fallback; a reload may come from either medium.
            debug!(
                "event=item_add module=service status=fallback source=cache_patch served_by={}",
                served
            );
            self.insert_created(created);
            self.refresh_next_id();
            return;
        }

        match self.backend.get_all_items() {
            Ok(items) if self.backend.last_served() == served => {
                self.adopt_reload(items, created)
            }
            Ok(_) => {
                warn!(
                    "event=item_add module=service status=fallback source=cache_patch reason=reload_switched_medium"
                );
                self.insert_created(created);
            }
            Err(err) => {
                warn!(
                    "event=item_add module=service status=fallback source=cache_patch error={}",
                    err
                );
                self.insert_created(created);
            }
        }
        self.refresh_next_id();
    }

    /// Takes a reloaded collection unless it contradicts `created`.
    fn adopt_reload(&mut self, mut items: Vec<Item>, created: &Item) {
        match items.iter().find(|item| item.id == created.id) {
            Some(stored) if stored == created => self.items = items,
            Some(stored) => {
                error!(
                    "event=item_add module=service status=error error_code=id_conflict id={} stored_name={} created_name={}",
                    created.id, stored.name, created.name
                );
                self.insert_created(created);
            }
            None => {
                warn!(
                    "event=item_add module=service status=fallback reason=created_missing id={}",
                    created.id
                );
                items.insert(0, created.clone());
                self.items = items;
            }
        }
    }

    fn insert_created(&mut self, created: &Item) {
        self.items.retain(|item| item.id != created.id);
        self.items.insert(0, created.clone());
    }

    fn patch_cached(&mut self, updated: Item) {
        if let Some(slot) = self.items.iter_mut().find(|item| item.id == updated.id) {
            *slot = updated;
            return;
        }
        warn!(
            "event=item_update module=service status=fallback reason=cache_miss id={}",
            updated.id
        );
        match self.backend.get_all_items() {
            Ok(items) => {
                self.items = items;
                self.refresh_next_id();
            }
            Err(err) => {
                warn!("event=cache_reload module=service status=error error={err}");
                self.items.insert(0, updated);
            }
        }
    }

    fn refresh_next_id(&mut self) {
        let from_backend = match self.backend.next_id() {
            Ok(id) => id,
            Err(err) => {
                warn!("event=next_id module=service status=fallback source=cache error={err}");
                FIRST_ITEM_ID
            }
        };
        self.next_id = self
            .next_id
            .max(next_id_after(&self.items))
            .max(from_backend);
    }

    fn add_local(&mut self, name: String, image: &str) -> Item {
        let item = Item::new(self.next_id, name, image);
        self.next_id += 1;
        self.items.insert(0, item.clone());
        warn!(
            "event=item_add module=service status=degraded id={} next_id={}",
            item.id, self.next_id
        );
        item
    }

    fn update_local(&mut self, id: ItemId, name: &str, image: &str) -> StoreResult<Item> {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            return Err(StoreError::NotFound(id));
        };
        item.apply_edit(name, image);
        warn!("event=item_update module=service status=degraded id={id}");
        Ok(item.clone())
    }

    fn remove_local(&mut self, id: ItemId) -> StoreResult<()> {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        if self.items.len() == before {
            return Err(StoreError::NotFound(id));
        }
        warn!("event=item_remove module=service status=degraded id={id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ItemStore, StoreError, StoreOptions, StoreState};
    use crate::backend::KvItemStore;
    use crate::kv::MemoryKvStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn ready_store(names: &[&str]) -> ItemStore<KvItemStore<MemoryKvStore>> {
        let options = StoreOptions {
            seed_when_empty: false,
            ..StoreOptions::default()
        };
        let mut store = ItemStore::new(KvItemStore::new(MemoryKvStore::new()), options);
        store.initialize();
        for name in names {
            store.add(name, "").unwrap();
        }
        store
    }

    #[test]
    fn mutations_before_initialize_are_rejected() {
        let mut store = ItemStore::new(
            KvItemStore::new(MemoryKvStore::new()),
            StoreOptions::default(),
        );
        let err = store.add("Burger", "").unwrap_err();
        assert!(matches!(err, StoreError::NotReady(StoreState::Uninitialized)));
        assert!(store.items().is_empty());
    }

    #[test]
    fn random_select_bounds_and_distinctness() {
        let store = ready_store(&["a", "b", "c", "d"]);
        let mut rng = StdRng::seed_from_u64(7);
        for count in 0..6 {
            let picked = store.random_select_with(count, &mut rng);
            assert_eq!(picked.len(), count.min(4));
            let ids = picked.iter().map(|item| item.id).collect::<HashSet<_>>();
            assert_eq!(ids.len(), picked.len());
            assert!(picked.iter().all(|item| store.items().contains(item)));
        }
    }

    #[test]
    fn random_select_does_not_reorder_cache() {
        let store = ready_store(&["a", "b", "c"]);
        let before = store.items().to_vec();
        let _ = store.random_select(3);
        assert_eq!(store.items(), before.as_slice());
    }

    #[test]
    fn random_select_on_empty_cache_is_empty() {
        let store = ready_store(&[]);
        assert!(store.random_select(3).is_empty());
    }

    #[test]
    fn random_select_returns_every_item_when_count_matches_a_large_cache() {
        let names = (0..60).map(|n| format!("dish {n}")).collect::<Vec<_>>();
        let refs = names.iter().map(String::as_str).collect::<Vec<_>>();
        let store = ready_store(&refs);
        let picked = store.random_select_with(60, &mut StdRng::seed_from_u64(3));
        assert_eq!(picked.len(), 60);
        assert_eq!(store.random_select(usize::MAX).len(), 60);
    }

    #[test]
    fn self_test_passes_and_keeps_the_cache() {
        let mut store = ready_store(&["Burger"]);
        let before = store.items().to_vec();
        let report = store.self_test().unwrap();
        assert!(report.passed(), "{report:?}");
        assert_eq!(store.items(), before.as_slice());
        assert_eq!(store.next_id(), 3);
        assert_eq!(store.add("Pizza", "").unwrap().id, 3);
    }

    #[test]
    fn self_test_requires_a_ready_store() {
        let mut store = ItemStore::new(
            KvItemStore::new(MemoryKvStore::new()),
            StoreOptions::default(),
        );
        assert!(matches!(
            store.self_test(),
            Err(StoreError::NotReady(StoreState::Uninitialized))
        ));
    }

    #[test]
    fn blank_name_is_a_validation_error() {
        let mut store = ready_store(&[]);
        let err = store.add("   ", "").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
