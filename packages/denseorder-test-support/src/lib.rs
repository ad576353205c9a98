//! Backend conformance suite shared by every `RowTable` implementation.
//!
//! Each check takes a factory that returns an empty store whose table for the given config
//! already exists, runs one scenario through `SequenceMutator`, and panics on divergence.

use denseorder_core::{
    Error, Order, OrderingConfig, Orderable, Partition, PartitionValue, RowId, RowTable,
    SequenceMutator,
};

#[derive(Clone, Debug)]
pub struct TestRow {
    pub id: RowId,
    pub order: Option<Order>,
    pub list_id: Option<i64>,
    pub kind: Option<String>,
}

impl TestRow {
    pub fn new(id: i64) -> Self {
        Self {
            id: RowId(id),
            order: None,
            list_id: None,
            kind: None,
        }
    }

    pub fn in_list(mut self, list_id: i64) -> Self {
        self.list_id = Some(list_id);
        self
    }

    pub fn of_kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }

    pub fn at(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }
}

impl Orderable for TestRow {
    fn row_id(&self) -> RowId {
        self.id
    }

    fn order(&self) -> Option<Order> {
        self.order
    }

    fn set_order(&mut self, order: Order) {
        self.order = Some(order);
    }

    fn partition_value(&self, column: &str) -> Option<PartitionValue> {
        match column {
            "list_id" => self.list_id.map(PartitionValue::Integer),
            "kind" => self.kind.clone().map(PartitionValue::Text),
            _ => None,
        }
    }
}

pub fn unpartitioned_config(table: &str) -> OrderingConfig {
    OrderingConfig::new(table)
}

pub fn list_config(table: &str) -> OrderingConfig {
    OrderingConfig::new(table).with_partition_key("list_id")
}

pub fn list_kind_config(table: &str) -> OrderingConfig {
    OrderingConfig::new(table).with_partition_keys(["list_id", "kind"])
}

fn mutator<S, F>(make: &mut F, config: OrderingConfig) -> SequenceMutator<S>
where
    S: RowTable,
    F: FnMut(&OrderingConfig) -> S,
{
    let store = make(&config);
    SequenceMutator::new(store, config).unwrap()
}

fn create_all<S: RowTable>(m: &mut SequenceMutator<S>, mut rows: Vec<TestRow>) -> Vec<TestRow> {
    for row in &mut rows {
        m.create(row).unwrap();
    }
    rows
}

fn list(m: &mut SequenceMutator<impl RowTable>, first_id: i64, list_id: i64, count: i64) -> Vec<TestRow> {
    let rows = (0..count)
        .map(|i| TestRow::new(first_id + i).in_list(list_id).at(i))
        .collect();
    create_all(m, rows)
}

fn orders<S: RowTable>(m: &SequenceMutator<S>, rows: &mut [TestRow]) -> Vec<Order> {
    rows.iter_mut().map(|row| m.refresh(row).unwrap()).collect()
}

fn list_partition(list_id: i64) -> Partition {
    Partition::new([("list_id", list_id)])
}

/// Moving the last row to position 1 shifts only its partition.
pub fn set_order_lower_stays_in_partition<S, F>(mut make: F)
where
    S: RowTable,
    F: FnMut(&OrderingConfig) -> S,
{
    let mut m = mutator(&mut make, list_config("conformance_lower"));
    let mut first = list(&mut m, 1, 0, 3);
    let mut second = list(&mut m, 10, 1, 3);

    assert_eq!(m.set_order(&mut first[2], 1).unwrap(), 1);

    assert_eq!(orders(&m, &mut first), vec![0, 2, 1]);
    assert_eq!(orders(&m, &mut second), vec![0, 1, 2]);
}

/// Moving towards the end, including a request past the end that clamps to the last slot.
pub fn set_order_higher_clamps_to_last<S, F>(mut make: F)
where
    S: RowTable,
    F: FnMut(&OrderingConfig) -> S,
{
    let mut m = mutator(&mut make, list_config("conformance_higher"));
    let mut rows = list(&mut m, 1, 0, 3);

    m.set_order(&mut rows[1], 2).unwrap();
    assert_eq!(orders(&m, &mut rows), vec![0, 2, 1]);

    assert_eq!(m.set_order(&mut rows[0], 9).unwrap(), 2);
    assert_eq!(orders(&m, &mut rows), vec![2, 1, 0]);

    let err = m.set_order(&mut rows[0], -3).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(orders(&m, &mut rows), vec![2, 1, 0]);
}

/// Long moves in both directions over a larger partition keep it dense.
pub fn long_moves_stay_dense<S, F>(mut make: F)
where
    S: RowTable,
    F: FnMut(&OrderingConfig) -> S,
{
    let mut m = mutator(&mut make, list_config("conformance_long"));
    let mut rows = list(&mut m, 1, 0, 6);

    m.set_order(&mut rows[5], 1).unwrap();
    assert_eq!(orders(&m, &mut rows), vec![0, 2, 3, 4, 5, 1]);

    m.set_order(&mut rows[1], 5).unwrap();
    assert_eq!(orders(&m, &mut rows), vec![0, 5, 2, 3, 4, 1]);

    m.query().validate(&list_partition(0)).unwrap();
}

/// Deleting a row resyncs its own partition and nothing else.
pub fn delete_resyncs_only_its_partition<S, F>(mut make: F)
where
    S: RowTable,
    F: FnMut(&OrderingConfig) -> S,
{
    let mut m = mutator(&mut make, list_config("conformance_delete"));
    let mut first = list(&mut m, 1, 0, 4);
    let mut second = list(&mut m, 10, 1, 3);

    let removed = first.remove(1);
    assert_eq!(m.delete(&removed).unwrap(), 2);

    assert_eq!(orders(&m, &mut first), vec![0, 1, 2]);
    assert_eq!(orders(&m, &mut second), vec![0, 1, 2]);
    assert_eq!(m.query().count(&list_partition(0)).unwrap(), 3);
}

/// Rows created without an order append to the end of their partition.
pub fn creates_append<S, F>(mut make: F)
where
    S: RowTable,
    F: FnMut(&OrderingConfig) -> S,
{
    let mut m = mutator(&mut make, list_config("conformance_create"));

    let mut rows = create_all(
        &mut m,
        vec![
            TestRow::new(1).in_list(0),
            TestRow::new(2).in_list(0),
            TestRow::new(3).in_list(1),
            TestRow::new(4).in_list(0),
        ],
    );

    assert_eq!(orders(&m, &mut rows), vec![0, 1, 0, 2]);
}

/// `move_up` on the last row and `move_down` on the first are no-ops.
pub fn boundary_moves_are_noops<S, F>(mut make: F)
where
    S: RowTable,
    F: FnMut(&OrderingConfig) -> S,
{
    let mut m = mutator(&mut make, unpartitioned_config("conformance_bounds"));
    let mut rows = create_all(&mut m, (1..=3).map(TestRow::new).collect());

    assert!(m.is_last(&rows[2]).unwrap());
    m.move_up(&mut rows[2]).unwrap();
    m.move_down(&mut rows[0]).unwrap();

    assert_eq!(orders(&m, &mut rows), vec![0, 1, 2]);
    assert!(m.is_first(&rows[0]));
}

/// Swaps exchange two positions; swaps across partitions and half-failed swaps change nothing.
pub fn swap_is_atomic<S, F>(mut make: F)
where
    S: RowTable,
    F: FnMut(&OrderingConfig) -> S,
{
    let mut m = mutator(&mut make, list_config("conformance_swap"));
    let mut first = list(&mut m, 1, 0, 3);
    let mut second = list(&mut m, 10, 1, 3);

    {
        let (head, tail) = first.split_at_mut(2);
        m.swap_order(&mut head[0], &mut tail[0]).unwrap();
    }
    assert_eq!(orders(&m, &mut first), vec![2, 1, 0]);

    let err = m.swap_order(&mut first[0], &mut second[0]).unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));

    // A row that was never persisted is rejected before either write.
    let mut ghost = TestRow::new(99).in_list(0).at(1);
    let err = m.swap_order(&mut first[1], &mut ghost).unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));

    assert_eq!(orders(&m, &mut first), vec![2, 1, 0]);
    assert_eq!(orders(&m, &mut second), vec![0, 1, 2]);
}

/// Moves of rows whose in-memory order went stale after earlier moves use the persisted order,
/// for the moved row and for the row it is placed against.
pub fn stale_rows_move_by_persisted_order<S, F>(mut make: F)
where
    S: RowTable,
    F: FnMut(&OrderingConfig) -> S,
{
    let mut m = mutator(&mut make, list_config("conformance_stale"));
    let mut rows = list(&mut m, 1, 0, 4);

    m.set_order(&mut rows[0], 3).unwrap();
    assert_eq!(rows[1].order(), Some(1));
    assert_eq!(m.set_order(&mut rows[1], 3).unwrap(), 3);
    m.query().validate(&list_partition(0)).unwrap();

    {
        let (head, tail) = rows.split_at_mut(3);
        m.swap_order(&mut head[2], &mut tail[0]).unwrap();
    }
    assert_eq!(rows[2].order(), Some(1));
    assert_eq!(rows[3].order(), Some(0));

    m.move_to_start(&mut rows[1]).unwrap();
    let target = rows[3].clone();
    assert_eq!(m.move_before(&mut rows[0], &target).unwrap(), 1);

    assert_eq!(orders(&m, &mut rows), vec![1, 0, 3, 2]);
    m.query().validate(&list_partition(0)).unwrap();
}

/// Sync repairs gaps and duplicates by (order, id) and is a no-op the second time.
pub fn sync_repairs_and_is_idempotent<S, F>(mut make: F)
where
    S: RowTable,
    F: FnMut(&OrderingConfig) -> S,
{
    let mut m = mutator(&mut make, list_kind_config("conformance_sync"));
    let mut rows = create_all(
        &mut m,
        vec![
            TestRow::new(1).in_list(0).of_kind("a").at(4),
            TestRow::new(2).in_list(0).of_kind("a").at(0),
            TestRow::new(3).in_list(0).of_kind("a").at(4),
            TestRow::new(4).in_list(0).of_kind("b").at(7),
        ],
    );
    let a = Partition::new([("list_id", PartitionValue::from(0)), ("kind", "a".into())]);

    assert_eq!(m.sync_sequence(&a).unwrap(), 2);
    assert_eq!(m.sync_sequence(&a).unwrap(), 0);

    assert_eq!(orders(&m, &mut rows), vec![1, 0, 2, 7]);
    m.query().validate(&a).unwrap();
}

pub fn run_all<S, F>(mut make: F)
where
    S: RowTable,
    F: FnMut(&OrderingConfig) -> S,
{
    set_order_lower_stays_in_partition(&mut make);
    set_order_higher_clamps_to_last(&mut make);
    long_moves_stay_dense(&mut make);
    delete_resyncs_only_its_partition(&mut make);
    creates_append(&mut make);
    boundary_moves_are_noops(&mut make);
    swap_is_atomic(&mut make);
    stale_rows_move_by_persisted_order(&mut make);
    sync_repairs_and_is_idempotent(&mut make);
}
