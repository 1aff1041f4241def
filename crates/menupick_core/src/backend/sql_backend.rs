//! Relational item adapter with per-call key-value fallback.
//!
//! # Responsibility
//! - Persist items in one SQLite table through a [`SqlBridge`].
//! - Re-run any call whose SQL path fails at the bridge level against the
//!   key-value adapter, so callers see a single reliable backend.
//! - Present the table and the rows written during bridge outages as one
//!   collection.
//!
//! # Invariants
//! - Only bridge failures trigger fallback; `NotFound` and validation
//!   errors from the SQL path are returned as-is.
//! - Reads are ordered by `id DESC` to match the key-value convention.
//! - Ids come from `AUTOINCREMENT` and are never reused after deletion.
//! - The two id counters only move up and each is kept at or above the
//!   other, so an id issued by one medium is never issued by the other.

use super::self_test::{check_item_round_trip, SelfTestReport};
use super::{BackendError, BackendKind, BackendResult, ItemBackend, KvItemStore, StorageInfo};
use crate::db::{SqlBridge, SqlRow, SqlValue};
use crate::kv::KeyValueStore;
use crate::model::item::{
    contains_name, next_id_after, normalize_name, now_timestamp, Item, ItemId, FIRST_ITEM_ID,
};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::path::PathBuf;

/// Table owned by the relational adapter.
pub const ITEMS_TABLE: &str = "items";

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    image TEXT NOT NULL DEFAULT '',
    created_at TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT
);";

const ITEM_COLUMNS: &str = "id, name, image, created_at, updated_at";

/// SQLite-first backend; `bridge = None` means the bridge is absent.
pub struct SqlItemBackend<B: SqlBridge, S: KeyValueStore> {
    bridge: Option<B>,
    db_name: String,
    db_path: PathBuf,
    sql_ready: bool,
    last_served: BackendKind,
    fallback: KvItemStore<S>,
}

impl<B: SqlBridge, S: KeyValueStore> SqlItemBackend<B, S> {
    pub fn new(
        bridge: Option<B>,
        db_name: impl Into<String>,
        db_path: impl Into<PathBuf>,
        fallback: KvItemStore<S>,
    ) -> Self {
        Self {
            bridge,
            db_name: db_name.into(),
            db_path: db_path.into(),
            sql_ready: false,
            last_served: BackendKind::Relational,
            fallback,
        }
    }

    /// Whether calls currently attempt the SQL path first.
    pub fn sql_ready(&self) -> bool {
        self.sql_ready && self.bridge.is_some()
    }

    pub fn fallback(&self) -> &KvItemStore<S> {
        &self.fallback
    }

    /// Runs `sql` when the bridge is up; on a bridge failure (or when the
    /// bridge is down) runs `kv` against the fallback store instead.
    fn with_fallback<T>(
        &mut self,
        operation: &'static str,
        sql: impl FnOnce(&mut B, &mut KvItemStore<S>) -> BackendResult<T>,
        kv: impl FnOnce(&mut KvItemStore<S>) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let Self {
            bridge,
            sql_ready,
            last_served,
            fallback,
            ..
        } = self;

        let bridge = match bridge.as_mut() {
            Some(bridge) if *sql_ready => bridge,
            _ => {
                debug!("event={operation} module=backend status=fallback reason=bridge_down");
                *last_served = BackendKind::KeyValue;
                return kv(fallback);
            }
        };

        match sql(bridge, &mut *fallback) {
            Err(BackendError::Db(err)) => {
                warn!(
                    "event={} module=backend status=fallback reason=bridge_error error={}",
                    operation, err
                );
                *last_served = BackendKind::KeyValue;
                kv(fallback)
            }
            other => {
                *last_served = BackendKind::Relational;
                other
            }
        }
    }
}

impl<B: SqlBridge, S: KeyValueStore> ItemBackend for SqlItemBackend<B, S> {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn init(&mut self) -> BackendResult<BackendKind> {
        let Some(bridge) = self.bridge.as_mut() else {
            warn!("event=backend_init module=backend status=fallback reason=bridge_absent");
            self.sql_ready = false;
            return Err(BackendError::Unavailable(
                "sql bridge is not present".to_string(),
            ));
        };

        if self.sql_ready {
            return Ok(BackendKind::Relational);
        }

        let opened = bridge
            .open(&self.db_name, &self.db_path)
            .and_then(|()| bridge.execute_sql(CREATE_TABLE_SQL, &[]));
        if let Err(err) = opened {
            error!(
                "event=backend_init module=backend status=fallback reason=bridge_error error={}",
                err
            );
            return Err(BackendError::Unavailable(err.to_string()));
        }

        self.sql_ready = true;
        // Rows written during an earlier outage may sit above the sequence.
        match self.next_id() {
            Ok(next_id) => {
                self.fallback.raise_next_id(next_id);
            }
            Err(err) => warn!(
                "event=backend_init module=backend status=error error_code=next_id_failed error={}",
                err
            ),
        }
        info!(
            "event=backend_init module=backend status=ok backend=relational db={}",
            self.db_name
        );
        Ok(BackendKind::Relational)
    }

    fn get_all_items(&mut self) -> BackendResult<Vec<Item>> {
        self.with_fallback(
            "items_load",
            |bridge, fallback| {
                let rows = bridge.select_sql(
                    &format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY id DESC;"),
                    &[],
                )?;
                let items = rows
                    .iter()
                    .map(parse_item_row)
                    .collect::<BackendResult<Vec<_>>>()?;
                Ok(merge_outage_rows(items, fallback.items()))
            },
            |kv| kv.get_all_items(),
        )
    }

    fn add_item(&mut self, name: &str, image: &str) -> BackendResult<Item> {
        let name = normalize_name(name)?;
        self.with_fallback(
            "item_add",
            |bridge, fallback| {
                raise_sequence(bridge, fallback.get_next_id() - 1)?;
                let rows = bridge.select_sql(
                    &format!(
                        "INSERT INTO items (name, image, created_at) VALUES (?1, ?2, ?3)
                         RETURNING {ITEM_COLUMNS};"
                    ),
                    &[
                        SqlValue::Text(name.clone()),
                        SqlValue::Text(image.to_string()),
                        SqlValue::Text(now_timestamp()),
                    ],
                )?;
                let row = rows.first().ok_or_else(|| {
                    BackendError::InvalidData("insert returned no row".to_string())
                })?;
                let item = parse_item_row(row)?;
                fallback.raise_next_id(item.id + 1);
                Ok(item)
            },
            |kv| kv.add_item(&name, image),
        )
    }

    fn update_item(&mut self, id: ItemId, name: &str, image: &str) -> BackendResult<Item> {
        let name = normalize_name(name)?;
        self.with_fallback(
            "item_update",
            |bridge, fallback| {
                let rows = bridge.select_sql(
                    &format!(
                        "UPDATE items SET name = ?1, image = ?2, updated_at = ?3
                         WHERE id = ?4
                         RETURNING {ITEM_COLUMNS};"
                    ),
                    &[
                        SqlValue::Text(name.clone()),
                        SqlValue::Text(image.to_string()),
                        SqlValue::Text(now_timestamp()),
                        SqlValue::Integer(id),
                    ],
                )?;
                match rows.first() {
                    Some(row) => parse_item_row(row),
                    // Possibly written during an outage.
                    None => fallback.update_item(id, &name, image),
                }
            },
            |kv| kv.update_item(id, &name, image),
        )
    }

    fn delete_item(&mut self, id: ItemId) -> BackendResult<()> {
        self.with_fallback(
            "item_delete",
            |bridge, fallback| {
                let changed = bridge
                    .execute_sql("DELETE FROM items WHERE id = ?1;", &[SqlValue::Integer(id)])?;
                if changed == 0 {
                    return fallback.delete_item(id);
                }
                Ok(())
            },
            |kv| kv.delete_item(id),
        )
    }

    fn name_exists(&mut self, name: &str, exclude_id: Option<ItemId>) -> BackendResult<bool> {
        // SQLite LOWER() only folds ASCII; compare in Rust for full Unicode.
        self.with_fallback(
            "name_exists",
            |bridge, fallback| {
                let rows = bridge.select_sql(&format!("SELECT {ITEM_COLUMNS} FROM items;"), &[])?;
                let items = rows
                    .iter()
                    .map(parse_item_row)
                    .collect::<BackendResult<Vec<_>>>()?;
                Ok(contains_name(&items, name, exclude_id)
                    || contains_name(&fallback.items(), name, exclude_id))
            },
            |kv| kv.name_exists(name, exclude_id),
        )
    }

    fn next_id(&mut self) -> BackendResult<ItemId> {
        self.with_fallback(
            "next_id",
            |bridge, fallback| {
                let rows = bridge.select_sql(
                    "SELECT
                        COALESCE((SELECT seq FROM sqlite_sequence WHERE name = 'items'), 0) AS seq,
                        COALESCE((SELECT MAX(id) FROM items), 0) AS max_id;",
                    &[],
                )?;
                let row = rows.first().ok_or_else(|| {
                    BackendError::InvalidData("sequence query returned no row".to_string())
                })?;
                let seq = integer_column(row, "seq")?;
                let max_id = integer_column(row, "max_id")?;
                Ok((seq.max(max_id) + 1).max(fallback.get_next_id()))
            },
            |kv| kv.next_id(),
        )
    }

    fn replace_all(&mut self, items: &[Item], next_id: ItemId) -> BackendResult<()> {
        for item in items {
            item.validate()?;
        }
        let next_id = next_id.max(next_id_after(items)).max(FIRST_ITEM_ID);
        self.with_fallback(
            "items_replace",
            |bridge, fallback| {
                bridge.execute_sql("BEGIN IMMEDIATE;", &[])?;
                let result = replace_rows(bridge, items, next_id - 1).and_then(|()| {
                    bridge.execute_sql("COMMIT;", &[])?;
                    Ok(())
                });
                if let Err(err) = &result {
                    if let Err(rollback_err) = bridge.execute_sql("ROLLBACK;", &[]) {
                        warn!(
                            "event=items_replace module=backend status=error error_code=rollback_failed error={} cause={}",
                            rollback_err, err
                        );
                    }
                    return result;
                }
                // Outage rows must not resurface next to the new set.
                if !fallback.items().is_empty() {
                    fallback.save_all_items(&[]);
                }
                fallback.raise_next_id(next_id);
                result
            },
            |kv| kv.replace_all(items, next_id),
        )
    }

    fn clear_all(&mut self) -> BackendResult<()> {
        let result = self.with_fallback(
            "items_clear",
            |bridge, _| {
                bridge.execute_sql("DELETE FROM items;", &[])?;
                bridge.execute_sql("DELETE FROM sqlite_sequence WHERE name = 'items';", &[])?;
                Ok(())
            },
            |kv| kv.clear_all(),
        );

        // Items written through earlier fallbacks must not resurface.
        if result.is_ok() && self.sql_ready() {
            if let Err(err) = self.fallback.clear_all() {
                warn!(
                    "event=items_clear module=backend status=error backend=key_value error={}",
                    err
                );
            }
        }
        result
    }

    fn storage_info(&self) -> BackendResult<StorageInfo> {
        let active = if self.sql_ready() {
            BackendKind::Relational
        } else {
            BackendKind::KeyValue
        };
        let info = self.fallback.storage_info()?;
        Ok(StorageInfo {
            active_backend: active,
            ..info
        })
    }

    fn last_served(&self) -> BackendKind {
        self.last_served
    }

    fn self_test(&mut self) -> SelfTestReport {
        let mut report = SelfTestReport::default();
        self.fallback.check_medium(&mut report);
        check_item_round_trip(self, &mut report);
        report
    }

    fn close(&mut self) -> BackendResult<()> {
        self.sql_ready = false;
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.close()?;
            info!("event=backend_close module=backend status=ok backend=relational");
        }
        Ok(())
    }
}

/// Appends rows that only the fallback holds, newest first.
fn merge_outage_rows(mut items: Vec<Item>, outage_rows: Vec<Item>) -> Vec<Item> {
    if outage_rows.is_empty() {
        return items;
    }
    let known = items.iter().map(|item| item.id).collect::<HashSet<_>>();
    items.extend(outage_rows.into_iter().filter(|item| !known.contains(&item.id)));
    items.sort_by(|left, right| right.id.cmp(&left.id));
    items
}

/// Lifts the `items` sequence to at least `floor`; never lowers it.
fn raise_sequence<B: SqlBridge>(bridge: &mut B, floor: ItemId) -> BackendResult<()> {
    if floor < FIRST_ITEM_ID {
        return Ok(());
    }
    let raised = bridge.execute_sql(
        "UPDATE sqlite_sequence SET seq = ?1 WHERE name = 'items' AND seq < ?1;",
        &[SqlValue::Integer(floor)],
    )?;
    if raised == 0 {
        bridge.execute_sql(
            "INSERT INTO sqlite_sequence (name, seq)
             SELECT 'items', ?1
             WHERE NOT EXISTS (SELECT 1 FROM sqlite_sequence WHERE name = 'items');",
            &[SqlValue::Integer(floor)],
        )?;
    }
    Ok(())
}

fn replace_rows<B: SqlBridge>(bridge: &mut B, items: &[Item], floor: ItemId) -> BackendResult<()> {
    bridge.execute_sql("DELETE FROM items;", &[])?;
    // Oldest first so rowid order matches id order.
    for item in items.iter().rev() {
        bridge.execute_sql(
            "INSERT INTO items (id, name, image, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            &[
                SqlValue::Integer(item.id),
                SqlValue::Text(item.name.trim().to_string()),
                SqlValue::Text(item.image.clone()),
                optional_text(item.created_at.as_deref()),
                optional_text(item.updated_at.as_deref()),
            ],
        )?;
    }
    bridge.execute_sql("DELETE FROM sqlite_sequence WHERE name = 'items';", &[])?;
    if floor > 0 {
        bridge.execute_sql(
            "INSERT INTO sqlite_sequence (name, seq) VALUES ('items', ?1);",
            &[SqlValue::Integer(floor)],
        )?;
    }
    Ok(())
}

fn parse_item_row(row: &SqlRow) -> BackendResult<Item> {
    let item = Item {
        id: integer_column(row, "id")?,
        name: text_column(row, "name")?.ok_or_else(|| {
            BackendError::InvalidData("null value in items.name".to_string())
        })?,
        image: text_column(row, "image")?.unwrap_or_default(),
        created_at: text_column(row, "created_at")?,
        updated_at: text_column(row, "updated_at")?,
    };
    item.validate()?;
    Ok(item)
}

fn integer_column(row: &SqlRow, column: &str) -> BackendResult<i64> {
    match row.get(column) {
        Some(SqlValue::Integer(value)) => Ok(*value),
        Some(other) => Err(BackendError::InvalidData(format!(
            "unexpected value {other:?} in column `{column}`"
        ))),
        None => Err(missing_column(column)),
    }
}

fn text_column(row: &SqlRow, column: &str) -> BackendResult<Option<String>> {
    match row.get(column) {
        Some(SqlValue::Text(value)) => Ok(Some(value.clone())),
        Some(SqlValue::Null) => Ok(None),
        Some(other) => Err(BackendError::InvalidData(format!(
            "unexpected value {other:?} in column `{column}`"
        ))),
        None => Err(missing_column(column)),
    }
}

fn missing_column(column: &str) -> BackendError {
    BackendError::InvalidData(format!("missing column `{column}`"))
}

fn optional_text(value: Option<&str>) -> SqlValue {
    value.map_or(SqlValue::Null, |text| SqlValue::Text(text.to_string()))
}
