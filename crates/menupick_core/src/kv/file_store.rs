//! File-backed key-value medium.
//!
//! # Responsibility
//! - Keep all entries in one JSON object file.
//! - Persist every mutation before reporting success.
//!
//! # Invariants
//! - The on-disk file is replaced atomically (temp file + rename).
//! - In-memory entries only change after the file write succeeded.

use super::{check_limit, info_for, KeyValueStore, KvError, KvInfo, KvResult};
use log::{debug, error, info};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// JSON-file key-value store.
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    entries: Map<String, Value>,
    limit: Option<u64>,
}

impl FileKvStore {
    /// Opens (or lazily creates) the store at `path`.
    ///
    /// A missing file is an empty store; the file is created on first write.
    ///
    /// # Errors
    /// - Returns `Io` when the file exists but cannot be read.
    /// - Returns `Serde` when the file is not a JSON object.
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Map::new(),
            Ok(bytes) => serde_json::from_slice::<Map<String, Value>>(&bytes).map_err(|err| {
                error!(
                    "event=kv_open module=kv status=error error_code=kv_corrupt path={} error={}",
                    path.display(),
                    err
                );
                KvError::from(err)
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(err) => {
                error!(
                    "event=kv_open module=kv status=error error_code=kv_read_failed path={} error={}",
                    path.display(),
                    err
                );
                return Err(err.into());
            }
        };

        info!(
            "event=kv_open module=kv status=ok path={} keys={}",
            path.display(),
            entries.len()
        );
        Ok(Self {
            path,
            entries,
            limit: None,
        })
    }

    /// Caps the serialized size; writes past it fail with `LimitExceeded`.
    pub fn with_limit(mut self, limit_bytes: u64) -> Self {
        self.limit = Some(limit_bytes);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn commit(&mut self, staged: Map<String, Value>) -> KvResult<()> {
        check_limit(&staged, self.limit)?;
        let bytes = serde_json::to_vec(&staged)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &self.path)?;

        debug!(
            "event=kv_commit module=kv status=ok bytes={} keys={}",
            bytes.len(),
            staged.len()
        );
        self.entries = staged;
        Ok(())
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> KvResult<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> KvResult<()> {
        let mut staged = self.entries.clone();
        staged.insert(key.to_string(), value);
        self.commit(staged)
    }

    fn remove(&mut self, key: &str) -> KvResult<()> {
        if !self.entries.contains_key(key) {
            return Ok(());
        }
        let mut staged = self.entries.clone();
        staged.remove(key);
        self.commit(staged)
    }

    fn clear(&mut self) -> KvResult<()> {
        self.commit(Map::new())
    }

    fn info(&self) -> KvResult<KvInfo> {
        info_for(&self.entries, self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::FileKvStore;
    use crate::kv::{KeyValueStore, KvError};
    use serde_json::json;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("kv.json");

        let mut store = FileKvStore::open(&path).unwrap();
        store.set("next_item_id", json!(4)).unwrap();
        drop(store);

        let reopened = FileKvStore::open(&path).unwrap();
        assert_eq!(reopened.get("next_item_id").unwrap(), Some(json!(4)));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");
        std::fs::write(&path, b"[not an object").unwrap();

        let err = FileKvStore::open(&path).unwrap_err();
        assert!(matches!(err, KvError::Serde(_)));
    }

    #[test]
    fn failed_limit_check_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");

        let mut store = FileKvStore::open(&path).unwrap().with_limit(16);
        store.set("a", json!(1)).unwrap();
        assert!(store.set("b", json!("this will not fit")).is_err());
        drop(store);

        let reopened = FileKvStore::open(&path).unwrap();
        assert_eq!(reopened.get("b").unwrap(), None);
        assert_eq!(reopened.get("a").unwrap(), Some(json!(1)));
    }

    #[test]
    fn clear_empties_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");

        let mut store = FileKvStore::open(&path).unwrap();
        store.set("a", json!(1)).unwrap();
        store.clear().unwrap();
        assert!(store.info().unwrap().keys.is_empty());

        let reopened = FileKvStore::open(&path).unwrap();
        assert_eq!(reopened.get("a").unwrap(), None);
    }
}
