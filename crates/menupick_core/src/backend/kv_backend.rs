//! Key-value item adapter.
//!
//! # Responsibility
//! - Persist the item collection and the id counter under two keys.
//! - Serve as the standalone backend and as the relational fallback.
//!
//! # Invariants
//! - The counter is written before the collection on add, so a partial
//!   failure can skip an id but never reissue one.
//! - Writes never overwrite a collection that failed to decode.
//! - New items are prepended (newest first).

use super::self_test::{check_item_round_trip, SelfTestReport, SELF_TEST_KEY};
use super::{BackendError, BackendKind, BackendResult, ItemBackend, StorageInfo};
use crate::kv::KeyValueStore;
use crate::model::item::{
    contains_name, next_id_after, normalize_name, now_timestamp, Item, ItemId, FIRST_ITEM_ID,
};
use log::{debug, info, warn};
use serde_json::{json, Value};

/// Key holding the serialized item list.
pub const ITEMS_KEY: &str = "items_list";
/// Key holding the next identifier to issue.
pub const NEXT_ID_KEY: &str = "next_item_id";

/// Item persistence over any [`KeyValueStore`].
#[derive(Debug)]
pub struct KvItemStore<S: KeyValueStore> {
    kv: S,
}

impl<S: KeyValueStore> KvItemStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    /// All stored items; empty when absent or unreadable (failure is logged).
    pub fn items(&self) -> Vec<Item> {
        match self.load_items() {
            Ok(items) => items,
            Err(err) => {
                warn!(
                    "event=kv_items_read module=backend status=error error_code=kv_read_failed error={}",
                    err
                );
                Vec::new()
            }
        }
    }

    /// Overwrites the stored collection. Returns `false` on failure (logged).
    pub fn save_all_items(&mut self, items: &[Item]) -> bool {
        match self.write_items(items) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event=kv_items_write module=backend status=error error_code=kv_write_failed error={}",
                    err
                );
                false
            }
        }
    }

    /// Stored counter, or the first id when absent or unreadable.
    pub fn get_next_id(&self) -> ItemId {
        self.read_counter().unwrap_or_else(|err| {
            warn!(
                "event=kv_counter_read module=backend status=error error_code=kv_read_failed error={}",
                err
            );
            FIRST_ITEM_ID
        })
    }

    /// Overwrites the stored counter. Returns `false` on failure (logged).
    pub fn set_next_id(&mut self, next_id: ItemId) -> bool {
        match self.write_next_id(next_id) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event=kv_counter_write module=backend status=error error_code=kv_write_failed error={}",
                    err
                );
                false
            }
        }
    }

    /// Lifts the stored counter to at least `floor`; never lowers it.
    /// Returns `false` on failure (logged). An unreadable counter is left
    /// as is.
    pub fn raise_next_id(&mut self, floor: ItemId) -> bool {
        match self.read_counter() {
            Ok(current) if current >= floor => true,
            Ok(_) => self.set_next_id(floor),
            Err(err) => {
                warn!(
                    "event=kv_counter_raise module=backend status=error error_code=kv_read_failed error={}",
                    err
                );
                false
            }
        }
    }

    /// Set/get/remove round trip on a scratch key of the medium.
    pub(crate) fn check_medium(&mut self, report: &mut SelfTestReport) {
        let value = json!({ "checkedAt": now_timestamp() });
        match self.kv.set(SELF_TEST_KEY, value.clone()) {
            Ok(()) => report.set_value = true,
            Err(err) => report.errors.push(format!("set failed: {err}")),
        }
        match self.kv.get(SELF_TEST_KEY) {
            Ok(found) => report.get_value = found.as_ref() == Some(&value),
            Err(err) => report.errors.push(format!("get failed: {err}")),
        }
        match self.kv.remove(SELF_TEST_KEY) {
            Ok(()) => report.remove_value = true,
            Err(err) => report.errors.push(format!("remove failed: {err}")),
        }
    }

    fn load_items(&self) -> BackendResult<Vec<Item>> {
        match self.kv.get(ITEMS_KEY)? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value::<Vec<Item>>(value)
                .map_err(|err| BackendError::InvalidData(format!("{ITEMS_KEY}: {err}"))),
        }
    }

    fn read_counter(&self) -> BackendResult<ItemId> {
        match self.kv.get(NEXT_ID_KEY)? {
            None | Some(Value::Null) => Ok(FIRST_ITEM_ID),
            Some(value) => value
                .as_i64()
                .filter(|id| *id >= FIRST_ITEM_ID)
                .ok_or_else(|| {
                    BackendError::InvalidData(format!("{NEXT_ID_KEY}: unexpected value {value}"))
                }),
        }
    }

    fn write_items(&mut self, items: &[Item]) -> BackendResult<()> {
        let value = serde_json::to_value(items)
            .map_err(|err| BackendError::InvalidData(format!("{ITEMS_KEY}: {err}")))?;
        self.kv.set(ITEMS_KEY, value)?;
        Ok(())
    }

    fn write_next_id(&mut self, next_id: ItemId) -> BackendResult<()> {
        self.kv.set(NEXT_ID_KEY, Value::from(next_id))?;
        Ok(())
    }

    fn derive_next_id(&self, items: &[Item]) -> BackendResult<ItemId> {
        Ok(self.read_counter()?.max(next_id_after(items)))
    }
}

impl<S: KeyValueStore> ItemBackend for KvItemStore<S> {
    fn kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    fn init(&mut self) -> BackendResult<BackendKind> {
        let info = self.kv.info()?;
        info!(
            "event=backend_init module=backend status=ok backend=key_value keys={} bytes={}",
            info.keys.len(),
            info.current_size
        );
        Ok(BackendKind::KeyValue)
    }

    fn get_all_items(&mut self) -> BackendResult<Vec<Item>> {
        self.load_items()
    }

    fn add_item(&mut self, name: &str, image: &str) -> BackendResult<Item> {
        let name = normalize_name(name)?;
        let mut items = self.load_items()?;
        let id = self.derive_next_id(&items)?;
        let item = Item::new(id, name, image);

        self.write_next_id(id + 1)?;
        items.insert(0, item.clone());
        self.write_items(&items)?;

        debug!("event=item_add module=backend status=ok backend=key_value id={id}");
        Ok(item)
    }

    fn update_item(&mut self, id: ItemId, name: &str, image: &str) -> BackendResult<Item> {
        let name = normalize_name(name)?;
        let mut items = self.load_items()?;
        let Some(item) = items.iter_mut().find(|item| item.id == id) else {
            return Err(BackendError::NotFound(id));
        };
        item.apply_edit(&name, image);
        let updated = item.clone();
        self.write_items(&items)?;

        debug!("event=item_update module=backend status=ok backend=key_value id={id}");
        Ok(updated)
    }

    fn delete_item(&mut self, id: ItemId) -> BackendResult<()> {
        let mut items = self.load_items()?;
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Err(BackendError::NotFound(id));
        }
        self.write_items(&items)?;

        debug!("event=item_delete module=backend status=ok backend=key_value id={id}");
        Ok(())
    }

    fn name_exists(&mut self, name: &str, exclude_id: Option<ItemId>) -> BackendResult<bool> {
        Ok(contains_name(&self.load_items()?, name, exclude_id))
    }

    fn next_id(&mut self) -> BackendResult<ItemId> {
        let items = self.load_items()?;
        self.derive_next_id(&items)
    }

    fn replace_all(&mut self, items: &[Item], next_id: ItemId) -> BackendResult<()> {
        for item in items {
            item.validate()?;
        }
        self.write_next_id(next_id.max(next_id_after(items)))?;
        self.write_items(items)?;
        info!(
            "event=items_replace module=backend status=ok backend=key_value count={}",
            items.len()
        );
        Ok(())
    }

    fn clear_all(&mut self) -> BackendResult<()> {
        self.kv.remove(ITEMS_KEY)?;
        self.kv.remove(NEXT_ID_KEY)?;
        info!("event=items_clear module=backend status=ok backend=key_value");
        Ok(())
    }

    fn storage_info(&self) -> BackendResult<StorageInfo> {
        Ok(StorageInfo::from_kv(self.kv.info()?, BackendKind::KeyValue))
    }

    fn self_test(&mut self) -> SelfTestReport {
        let mut report = SelfTestReport::default();
        self.check_medium(&mut report);
        check_item_round_trip(self, &mut report);
        report
    }
}
