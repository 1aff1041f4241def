#![allow(dead_code)]

use menupick_core::backend::{KvItemStore, SqlItemBackend};
use menupick_core::config::FailurePolicy;
use menupick_core::db::{
    DbError, DbResult, SqlBridge, SqlRow, SqlValue, SqliteBridge, MEMORY_DB_PATH,
};
use menupick_core::kv::{KeyValueStore, KvError, KvInfo, KvResult, MemoryKvStore};
use menupick_core::{Item, ItemStore, StoreOptions};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared on/off flag for injecting failures after ownership moved.
#[derive(Debug, Clone, Default)]
pub struct Switch(Arc<AtomicBool>);

impl Switch {
    pub fn on(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn off(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// SQLite bridge that rejects every call while its switch is on.
#[derive(Debug, Default)]
pub struct FlakyBridge {
    inner: SqliteBridge,
    offline: Switch,
}

impl FlakyBridge {
    pub fn new(offline: Switch) -> Self {
        Self {
            inner: SqliteBridge::new(),
            offline,
        }
    }

    fn check(&self) -> DbResult<()> {
        if self.offline.is_on() {
            return Err(DbError::Rejected("bridge offline".to_string()));
        }
        Ok(())
    }
}

impl SqlBridge for FlakyBridge {
    fn open(&mut self, name: &str, path: &Path) -> DbResult<()> {
        self.check()?;
        self.inner.open(name, path)
    }

    fn execute_sql(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<usize> {
        self.check()?;
        self.inner.execute_sql(sql, params)
    }

    fn select_sql(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<SqlRow>> {
        self.check()?;
        self.inner.select_sql(sql, params)
    }

    fn close(&mut self) -> DbResult<()> {
        self.inner.close()
    }
}

/// In-memory key-value medium whose writes fail while its switch is on.
#[derive(Debug, Default)]
pub struct FlakyKv {
    inner: MemoryKvStore,
    read_only: Switch,
}

impl FlakyKv {
    pub fn new(read_only: Switch) -> Self {
        Self {
            inner: MemoryKvStore::new(),
            read_only,
        }
    }

    fn check(&self) -> KvResult<()> {
        if self.read_only.is_on() {
            return Err(KvError::Rejected("medium is read-only".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for FlakyKv {
    fn get(&self, key: &str) -> KvResult<Option<Value>> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: Value) -> KvResult<()> {
        self.check()?;
        self.inner.set(key, value)
    }

    fn remove(&mut self, key: &str) -> KvResult<()> {
        self.check()?;
        self.inner.remove(key)
    }

    fn clear(&mut self) -> KvResult<()> {
        self.check()?;
        self.inner.clear()
    }

    fn info(&self) -> KvResult<KvInfo> {
        self.inner.info()
    }
}

pub type KvStore = ItemStore<KvItemStore<FlakyKv>>;
pub type SqlStore<B> = ItemStore<SqlItemBackend<B, FlakyKv>>;

pub fn options(policy: FailurePolicy, seed_when_empty: bool) -> StoreOptions {
    StoreOptions {
        failure_policy: policy,
        seed_when_empty,
    }
}

/// Strict, unseeded options.
pub fn plain() -> StoreOptions {
    options(FailurePolicy::Strict, false)
}

pub fn kv_store(options: StoreOptions) -> (KvStore, Switch) {
    kv_store_with(FlakyKv::default(), options)
}

pub fn kv_store_with(kv: FlakyKv, options: StoreOptions) -> (KvStore, Switch) {
    let read_only = kv.read_only.clone();
    (ItemStore::new(KvItemStore::new(kv), options), read_only)
}

/// Relational store on an in-memory database, with bridge and fallback
/// switches.
pub fn sql_store(options: StoreOptions) -> (SqlStore<FlakyBridge>, Switch, Switch) {
    let offline = Switch::default();
    let read_only = Switch::default();
    let backend = SqlItemBackend::new(
        Some(FlakyBridge::new(offline.clone())),
        "menupick",
        MEMORY_DB_PATH,
        KvItemStore::new(FlakyKv::new(read_only.clone())),
    );
    (ItemStore::new(backend, options), offline, read_only)
}

/// Relational store on a host with no SQL bridge at all.
pub fn bridgeless_store(options: StoreOptions) -> SqlStore<SqliteBridge> {
    let backend = SqlItemBackend::new(
        None,
        "menupick",
        MEMORY_DB_PATH,
        KvItemStore::new(FlakyKv::default()),
    );
    ItemStore::new(backend, options)
}

/// `(id, name, image)` triples, ignoring timestamps.
pub fn shape(items: &[Item]) -> Vec<(i64, String, String)> {
    items
        .iter()
        .map(|item| (item.id, item.name.clone(), item.image.clone()))
        .collect()
}

pub fn names(items: &[Item]) -> Vec<&str> {
    items.iter().map(|item| item.name.as_str()).collect()
}
