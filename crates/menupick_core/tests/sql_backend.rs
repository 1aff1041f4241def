mod common;

use common::{FlakyBridge, FlakyKv, Switch};
use menupick_core::backend::{
    BackendError, BackendKind, ItemBackend, KvItemStore, SqlItemBackend, SELF_TEST_KEY,
};
use menupick_core::db::{
    DbError, DbResult, SqlBridge, SqlRow, SqlValue, SqliteBridge, MEMORY_DB_PATH,
};
use menupick_core::kv::{KeyValueStore, MemoryKvStore};
use menupick_core::service::seed;
use std::path::Path;

fn memory_backend() -> SqlItemBackend<SqliteBridge, MemoryKvStore> {
    SqlItemBackend::new(
        Some(SqliteBridge::new()),
        "menupick",
        MEMORY_DB_PATH,
        KvItemStore::new(MemoryKvStore::new()),
    )
}

fn ids(backend: &mut impl ItemBackend) -> Vec<i64> {
    backend
        .get_all_items()
        .unwrap()
        .iter()
        .map(|item| item.id)
        .collect()
}

#[test]
fn sql_path_lists_newest_first_and_never_reuses_ids() {
    let mut backend = memory_backend();
    assert_eq!(backend.init().unwrap(), BackendKind::Relational);

    for name in ["a", "b", "c"] {
        backend.add_item(name, "").unwrap();
    }
    backend.delete_item(3).unwrap();
    let d = backend.add_item("d", "/img/d.png").unwrap();

    assert_eq!(d.id, 4);
    assert_eq!(d.image, "/img/d.png");
    assert!(d.created_at.is_some());
    assert_eq!(ids(&mut backend), vec![4, 2, 1]);
    assert_eq!(backend.next_id().unwrap(), 5);
    assert!(backend.fallback().items().is_empty());
}

#[test]
fn sql_add_trims_names() {
    let mut backend = memory_backend();
    backend.init().unwrap();
    let item = backend.add_item("  Ramen  ", "").unwrap();
    assert_eq!(item.name, "Ramen");
}

#[test]
fn name_exists_folds_unicode_case() {
    let mut backend = memory_backend();
    backend.init().unwrap();
    let item = backend.add_item("Crème Brûlée", "").unwrap();

    assert!(backend.name_exists(" CRÈME BRÛLÉE ", None).unwrap());
    assert!(!backend.name_exists("crème brûlée", Some(item.id)).unwrap());
    assert!(!backend.name_exists("Tiramisu", None).unwrap());
}

#[test]
fn missing_rows_report_not_found_without_fallback() {
    let mut backend = memory_backend();
    backend.init().unwrap();

    assert!(matches!(
        backend.update_item(99, "x", ""),
        Err(BackendError::NotFound(99))
    ));
    assert!(matches!(
        backend.delete_item(99),
        Err(BackendError::NotFound(99))
    ));
    assert!(backend.fallback().items().is_empty());
}

#[test]
fn update_returns_edited_row() {
    let mut backend = memory_backend();
    backend.init().unwrap();
    let item = backend.add_item("Pizza", "").unwrap();

    let updated = backend.update_item(item.id, "Pizza Margherita", "/p.png").unwrap();
    assert_eq!(updated.id, item.id);
    assert_eq!(updated.name, "Pizza Margherita");
    assert_eq!(updated.image, "/p.png");
    assert_eq!(updated.created_at, item.created_at);
    assert!(updated.updated_at.is_some());
}

#[test]
fn replace_all_keeps_ids_and_counter_floor() {
    let mut backend = memory_backend();
    backend.init().unwrap();
    backend
        .replace_all(&seed::default_items(), seed::default_next_id())
        .unwrap();

    assert_eq!(ids(&mut backend), (1..=10).rev().collect::<Vec<_>>());
    assert_eq!(backend.next_id().unwrap(), 11);
    assert_eq!(backend.add_item("Tacos", "").unwrap().id, 11);
}

#[test]
fn replace_all_honors_counter_above_data() {
    let mut backend = memory_backend();
    backend.init().unwrap();
    backend.replace_all(&[], 40).unwrap();

    assert_eq!(backend.next_id().unwrap(), 40);
    assert_eq!(backend.add_item("x", "").unwrap().id, 40);
}

#[test]
fn clear_all_resets_the_sequence() {
    let mut backend = memory_backend();
    backend.init().unwrap();
    backend.add_item("a", "").unwrap();
    backend.add_item("b", "").unwrap();

    backend.clear_all().unwrap();
    assert!(ids(&mut backend).is_empty());
    assert_eq!(backend.next_id().unwrap(), 1);
    assert_eq!(backend.add_item("c", "").unwrap().id, 1);
}

#[test]
fn absent_bridge_serves_everything_from_key_value() {
    let mut backend: SqlItemBackend<SqliteBridge, MemoryKvStore> = SqlItemBackend::new(
        None,
        "menupick",
        MEMORY_DB_PATH,
        KvItemStore::new(MemoryKvStore::new()),
    );
    assert!(matches!(backend.init(), Err(BackendError::Unavailable(_))));
    assert!(!backend.sql_ready());

    let item = backend.add_item("Sushi", "").unwrap();
    assert_eq!(item.id, 1);
    assert_eq!(backend.fallback().items(), vec![item]);
    assert!(backend.name_exists("sushi", None).unwrap());
    assert_eq!(
        backend.storage_info().unwrap().active_backend,
        BackendKind::KeyValue
    );
}

#[test]
fn bridge_failure_at_init_leaves_key_value_active() {
    let offline = Switch::default();
    offline.on();
    let mut backend = SqlItemBackend::new(
        Some(FlakyBridge::new(offline.clone())),
        "menupick",
        MEMORY_DB_PATH,
        KvItemStore::new(FlakyKv::default()),
    );

    assert!(matches!(backend.init(), Err(BackendError::Unavailable(_))));
    offline.off();
    backend.add_item("Steak", "").unwrap();
    assert_eq!(backend.fallback().items().len(), 1);
}

#[test]
fn bridge_errors_fall_back_per_call() {
    let offline = Switch::default();
    let mut backend = SqlItemBackend::new(
        Some(FlakyBridge::new(offline.clone())),
        "menupick",
        MEMORY_DB_PATH,
        KvItemStore::new(FlakyKv::default()),
    );
    backend.init().unwrap();
    backend.add_item("Salad", "").unwrap();

    offline.on();
    let stored = backend.add_item("Hot Pot", "").unwrap();
    assert_eq!(backend.fallback().items(), vec![stored]);
    assert!(backend.name_exists("hot pot", None).unwrap());
    assert_eq!(
        backend.storage_info().unwrap().active_backend,
        BackendKind::Relational
    );

    offline.off();
    let names = backend
        .get_all_items()
        .unwrap()
        .into_iter()
        .map(|item| item.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Hot Pot".to_string(), "Salad".to_string()]);
}

fn flaky_backend() -> (SqlItemBackend<FlakyBridge, FlakyKv>, Switch) {
    let offline = Switch::default();
    let backend = SqlItemBackend::new(
        Some(FlakyBridge::new(offline.clone())),
        "menupick",
        MEMORY_DB_PATH,
        KvItemStore::new(FlakyKv::default()),
    );
    (backend, offline)
}

#[test]
fn ids_issued_during_an_outage_are_not_reissued() {
    let (mut backend, offline) = flaky_backend();
    backend.init().unwrap();
    let salad = backend.add_item("Salad", "").unwrap();

    offline.on();
    let hot_pot = backend.add_item("Hot Pot", "").unwrap();
    assert_eq!(backend.last_served(), BackendKind::KeyValue);
    assert!(hot_pot.id > salad.id);

    offline.off();
    let tacos = backend.add_item("Tacos", "").unwrap();
    assert_eq!(backend.last_served(), BackendKind::Relational);
    assert!(tacos.id > hot_pot.id);
    assert_eq!(ids(&mut backend), vec![tacos.id, hot_pot.id, salad.id]);
    assert_eq!(backend.next_id().unwrap(), tacos.id + 1);
    assert!(backend.name_exists("HOT POT", None).unwrap());
}

#[test]
fn outage_rows_stay_editable_after_recovery() {
    let (mut backend, offline) = flaky_backend();
    backend.init().unwrap();
    backend.add_item("Salad", "").unwrap();

    offline.on();
    let hot_pot = backend.add_item("Hot Pot", "").unwrap();
    offline.off();

    let renamed = backend.update_item(hot_pot.id, "Mala Hot Pot", "").unwrap();
    assert_eq!(renamed.id, hot_pot.id);
    assert_eq!(backend.fallback().items(), vec![renamed]);

    backend.delete_item(hot_pot.id).unwrap();
    assert_eq!(ids(&mut backend), vec![1]);
    assert!(matches!(
        backend.delete_item(hot_pot.id),
        Err(BackendError::NotFound(_))
    ));
}

#[test]
fn late_init_continues_after_key_value_ids() {
    let (mut backend, offline) = flaky_backend();
    offline.on();
    assert!(backend.init().is_err());
    backend.add_item("Salad", "").unwrap();
    backend.add_item("Hot Pot", "").unwrap();

    offline.off();
    assert_eq!(backend.init().unwrap(), BackendKind::Relational);
    assert_eq!(backend.next_id().unwrap(), 3);
    let tacos = backend.add_item("Tacos", "").unwrap();
    assert_eq!(tacos.id, 3);
    assert_eq!(ids(&mut backend), vec![3, 2, 1]);
}

#[test]
fn replace_all_drops_outage_rows() {
    let (mut backend, offline) = flaky_backend();
    backend.init().unwrap();
    offline.on();
    backend.add_item("Hot Pot", "").unwrap();
    offline.off();

    backend
        .replace_all(&seed::default_items(), seed::default_next_id())
        .unwrap();
    assert!(backend.fallback().items().is_empty());
    assert_eq!(ids(&mut backend), (1..=10).rev().collect::<Vec<_>>());
    assert_eq!(backend.add_item("Tacos", "").unwrap().id, 11);
}

#[test]
fn self_test_round_trips_through_sql() {
    let mut backend = memory_backend();
    backend.init().unwrap();
    backend.add_item("Burger", "").unwrap();

    let report = backend.self_test();
    assert!(report.passed(), "{report:?}");
    assert_eq!(ids(&mut backend), vec![1]);
    assert_eq!(backend.next_id().unwrap(), 3);
    assert!(backend.fallback().items().is_empty());
    assert_eq!(backend.fallback().kv().get(SELF_TEST_KEY).unwrap(), None);
}

#[test]
fn file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("data").join("menupick.sqlite3");
    let open = |path: &Path| {
        SqlItemBackend::new(
            Some(SqliteBridge::new()),
            "menupick",
            path,
            KvItemStore::new(MemoryKvStore::new()),
        )
    };

    let mut first = open(&db_path);
    first.init().unwrap();
    first.add_item("Burger", "").unwrap();
    let removed = first.add_item("Pizza", "").unwrap();
    first.delete_item(removed.id).unwrap();
    first.close().unwrap();

    let mut second = open(&db_path);
    second.init().unwrap();
    let items = second.get_all_items().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Burger");
    assert_eq!(second.next_id().unwrap(), 3);
}

/// Rejects statements starting with any of `refused`.
struct RefusingBridge {
    inner: SqliteBridge,
    refused: &'static [&'static str],
}

impl RefusingBridge {
    fn check(&self, sql: &str) -> DbResult<()> {
        let sql = sql.trim_start();
        if self.refused.iter().any(|prefix| sql.starts_with(prefix)) {
            return Err(DbError::Rejected(format!("refused: {sql}")));
        }
        Ok(())
    }
}

impl SqlBridge for RefusingBridge {
    fn open(&mut self, name: &str, path: &Path) -> DbResult<()> {
        self.inner.open(name, path)
    }

    fn execute_sql(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<usize> {
        self.check(sql)?;
        self.inner.execute_sql(sql, params)
    }

    fn select_sql(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<SqlRow>> {
        self.check(sql)?;
        self.inner.select_sql(sql, params)
    }

    fn close(&mut self) -> DbResult<()> {
        self.inner.close()
    }
}

#[test]
fn failed_commit_and_rollback_fall_back_to_key_value() {
    let bridge = RefusingBridge {
        inner: SqliteBridge::new(),
        refused: &["COMMIT", "ROLLBACK"],
    };
    let mut backend = SqlItemBackend::new(
        Some(bridge),
        "menupick",
        MEMORY_DB_PATH,
        KvItemStore::new(MemoryKvStore::new()),
    );
    backend.init().unwrap();

    backend
        .replace_all(&seed::default_items(), seed::default_next_id())
        .unwrap();
    assert_eq!(backend.last_served(), BackendKind::KeyValue);
    assert_eq!(backend.fallback().items().len(), 10);
    assert_eq!(backend.fallback().get_next_id(), 11);
}
