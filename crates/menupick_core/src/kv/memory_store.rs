//! Volatile key-value medium.

use super::{check_limit, info_for, KeyValueStore, KvInfo, KvResult};
use serde_json::{Map, Value};

/// In-process key-value store. Contents vanish with the value.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    entries: Map<String, Value>,
    limit: Option<u64>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the serialized size; writes past it fail with `LimitExceeded`.
    pub fn with_limit(mut self, limit_bytes: u64) -> Self {
        self.limit = Some(limit_bytes);
        self
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> KvResult<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> KvResult<()> {
        let mut staged = self.entries.clone();
        staged.insert(key.to_string(), value);
        check_limit(&staged, self.limit)?;
        self.entries = staged;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> KvResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> KvResult<()> {
        self.entries.clear();
        Ok(())
    }

    fn info(&self) -> KvResult<KvInfo> {
        info_for(&self.entries, self.limit)
    }
}
