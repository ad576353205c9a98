use std::thread;
use std::time::Duration;

use denseorder_core::{Error, OrderingConfig, Partition, SequenceMutator};
use denseorder_sqlite::SqliteRowStore;
use denseorder_test_support as suite;
use denseorder_test_support::TestRow;

fn in_memory(config: &OrderingConfig) -> SqliteRowStore {
    let mut store = SqliteRowStore::new_in_memory().unwrap();
    store.ensure_table(config).unwrap();
    store
}

#[test]
fn set_order_lower_stays_in_partition() {
    suite::set_order_lower_stays_in_partition(in_memory);
}

#[test]
fn set_order_higher_clamps_to_last() {
    suite::set_order_higher_clamps_to_last(in_memory);
}

#[test]
fn long_moves_stay_dense() {
    suite::long_moves_stay_dense(in_memory);
}

#[test]
fn delete_resyncs_only_its_partition() {
    suite::delete_resyncs_only_its_partition(in_memory);
}

#[test]
fn creates_append() {
    suite::creates_append(in_memory);
}

#[test]
fn boundary_moves_are_noops() {
    suite::boundary_moves_are_noops(in_memory);
}

#[test]
fn swap_is_atomic() {
    suite::swap_is_atomic(in_memory);
}

#[test]
fn stale_rows_move_by_persisted_order() {
    suite::stale_rows_move_by_persisted_order(in_memory);
}

#[test]
fn sync_repairs_and_is_idempotent() {
    suite::sync_repairs_and_is_idempotent(in_memory);
}

#[test]
fn all_scenarios_share_one_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ordering.sqlite");
    suite::run_all(|config: &OrderingConfig| {
        let mut store = SqliteRowStore::open(&path).unwrap();
        store.ensure_table(config).unwrap();
        store
    });
}

#[test]
fn order_survives_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ordering.sqlite");
    let config = suite::list_config("lessons");

    {
        let mut store = SqliteRowStore::open(&path).unwrap();
        store.ensure_table(&config).unwrap();
        let mut m = SequenceMutator::new(store, config.clone()).unwrap();
        let mut rows: Vec<TestRow> = (1..=4).map(|id| TestRow::new(id).in_list(3)).collect();
        for row in &mut rows {
            m.create(row).unwrap();
        }
        m.move_to_start(&mut rows[3]).unwrap();
    }

    let store = SqliteRowStore::open(&path).unwrap();
    let m = SequenceMutator::new(store, config).unwrap();
    let ids: Vec<i64> = m
        .query()
        .list_ordered(&Partition::new([("list_id", 3)]))
        .unwrap()
        .into_iter()
        .map(|r| r.id.0)
        .collect();
    assert_eq!(ids, vec![4, 1, 2, 3]);
}

#[test]
fn busy_commit_rolls_back_and_frees_the_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ordering.sqlite");
    let config = suite::unpartitioned_config("items");

    let mut store = SqliteRowStore::open(&path).unwrap();
    store.ensure_table(&config).unwrap();
    store
        .connection()
        .busy_timeout(Duration::from_millis(50))
        .unwrap();
    let mut m = SequenceMutator::new(store, config.clone()).unwrap();
    let mut rows: Vec<TestRow> = (1..=3).map(TestRow::new).collect();
    for row in &mut rows {
        m.create(row).unwrap();
    }

    // An open read transaction keeps a shared lock, so COMMIT cannot get the exclusive one.
    let reader = rusqlite::Connection::open(&path).unwrap();
    reader.execute_batch("BEGIN").unwrap();
    let count: i64 = reader
        .query_row("SELECT COUNT(*) FROM \"items\"", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 3);

    let err = m.move_to_start(&mut rows[2]).unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert!(m.store().connection().is_autocommit());
    assert_eq!(rows[2].order, Some(2));

    reader.execute_batch("COMMIT").unwrap();

    let whole = Partition::whole_table();
    m.query().validate(&whole).unwrap();
    let ids: Vec<i64> = m
        .query()
        .list_ordered(&whole)
        .unwrap()
        .into_iter()
        .map(|r| r.id.0)
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);

    m.move_to_start(&mut rows[2]).unwrap();
    assert_eq!(m.refresh(&mut rows[2]).unwrap(), 0);
}

#[test]
fn concurrent_movers_on_one_file_keep_the_partition_dense() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ordering.sqlite");
    let config = suite::list_config("lessons");

    let rows: Vec<TestRow> = {
        let mut store = SqliteRowStore::open(&path).unwrap();
        store.ensure_table(&config).unwrap();
        let mut m = SequenceMutator::new(store, config.clone()).unwrap();
        let mut rows: Vec<TestRow> = (1..=8).map(|id| TestRow::new(id).in_list(1)).collect();
        for row in &mut rows {
            m.create(row).unwrap();
        }
        rows
    };

    thread::scope(|scope| {
        for worker in 0..2usize {
            let (path, config, mut rows) = (&path, config.clone(), rows.clone());
            scope.spawn(move || {
                let store = SqliteRowStore::open(path).unwrap();
                store
                    .connection()
                    .busy_timeout(Duration::from_secs(10))
                    .unwrap();
                let mut m = SequenceMutator::new(store, config).unwrap();
                for step in 0..40usize {
                    let pick = (step * 3 + worker) % rows.len();
                    let row = &mut rows[pick];
                    let moved = match step % 4 {
                        0 => m.set_order(row, ((step + worker) % 8) as i64),
                        1 => m.move_to_start(row),
                        2 => m.move_up(row),
                        _ => m.move_to_end(row),
                    };
                    moved.unwrap();
                }
            });
        }
    });

    let store = SqliteRowStore::open(&path).unwrap();
    let m = SequenceMutator::new(store, config).unwrap();
    let lesson_list = Partition::new([("list_id", 1)]);
    m.query().validate(&lesson_list).unwrap();
    assert_eq!(m.query().count(&lesson_list).unwrap(), 8);
}
