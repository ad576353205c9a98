use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;

use crate::config::OrderingConfig;
use crate::error::{Error, Result};
use crate::ids::{Order, RowId, RowRef};
use crate::partition::{Partition, PartitionValue};

/// Capability implemented by any row type that takes part in a dense sequence.
pub trait Orderable {
    fn row_id(&self) -> RowId;
    /// Current position, or `None` for a row that has not been created yet.
    fn order(&self) -> Option<Order>;
    fn set_order(&mut self, order: Order);
    /// Value of the named partition-key column on this row.
    fn partition_value(&self, column: &str) -> Option<PartitionValue>;
}

/// Storage collaborator that owns persistence and transaction boundaries.
///
/// Every method is scoped by `config` (table and column names) and most by a partition filter.
/// Mutating calls are expected to run between `begin_unit` and `commit_unit`.
pub trait RowStore {
    fn begin_unit(&mut self) -> Result<()>;
    fn commit_unit(&mut self) -> Result<()>;
    fn rollback_unit(&mut self) -> Result<()>;

    fn find_highest_order(
        &self,
        config: &OrderingConfig,
        partition: &Partition,
    ) -> Result<Option<Order>>;

    /// Members of the partition ascending by order, ties broken by ascending id.
    fn list_ordered(&self, config: &OrderingConfig, partition: &Partition) -> Result<Vec<RowRef>>;

    /// Add `delta` to the order of every partition member whose order lies in `range`.
    /// Returns the number of rows updated.
    fn shift_orders(
        &mut self,
        config: &OrderingConfig,
        partition: &Partition,
        range: RangeInclusive<Order>,
        delta: i64,
    ) -> Result<u64>;

    /// Fails with `Error::Precondition` when no row has the given id.
    fn write_order(&mut self, config: &OrderingConfig, id: RowId, value: Order) -> Result<()>;

    /// Persisted order of the row, `None` when no row has the given id.
    fn load_order(&self, config: &OrderingConfig, id: RowId) -> Result<Option<Order>>;
}

/// Row persistence used by the lifecycle helpers (`create`, `delete`).
pub trait RowTable: RowStore {
    fn insert_row(
        &mut self,
        config: &OrderingConfig,
        id: RowId,
        order: Order,
        partition: &Partition,
    ) -> Result<()>;
    /// Returns `false` when no row had the given id.
    fn delete_row(&mut self, config: &OrderingConfig, id: RowId) -> Result<bool>;
}

impl<S: RowStore + ?Sized> RowStore for &mut S {
    fn begin_unit(&mut self) -> Result<()> {
        (**self).begin_unit()
    }

    fn commit_unit(&mut self) -> Result<()> {
        (**self).commit_unit()
    }

    fn rollback_unit(&mut self) -> Result<()> {
        (**self).rollback_unit()
    }

    fn find_highest_order(
        &self,
        config: &OrderingConfig,
        partition: &Partition,
    ) -> Result<Option<Order>> {
        (**self).find_highest_order(config, partition)
    }

    fn list_ordered(&self, config: &OrderingConfig, partition: &Partition) -> Result<Vec<RowRef>> {
        (**self).list_ordered(config, partition)
    }

    fn shift_orders(
        &mut self,
        config: &OrderingConfig,
        partition: &Partition,
        range: RangeInclusive<Order>,
        delta: i64,
    ) -> Result<u64> {
        (**self).shift_orders(config, partition, range, delta)
    }

    fn write_order(&mut self, config: &OrderingConfig, id: RowId, value: Order) -> Result<()> {
        (**self).write_order(config, id, value)
    }

    fn load_order(&self, config: &OrderingConfig, id: RowId) -> Result<Option<Order>> {
        (**self).load_order(config, id)
    }
}

impl<S: RowTable + ?Sized> RowTable for &mut S {
    fn insert_row(
        &mut self,
        config: &OrderingConfig,
        id: RowId,
        order: Order,
        partition: &Partition,
    ) -> Result<()> {
        (**self).insert_row(config, id, order, partition)
    }

    fn delete_row(&mut self, config: &OrderingConfig, id: RowId) -> Result<bool> {
        (**self).delete_row(config, id)
    }
}

#[derive(Clone, Debug)]
struct MemoryRow {
    order: Order,
    keys: BTreeMap<String, PartitionValue>,
}

type MemoryTable = BTreeMap<RowId, MemoryRow>;

/// In-memory row store for tests and prototyping.
///
/// A unit of work snapshots every table and the write counter on begin; rollback restores
/// both.
#[derive(Default)]
pub struct MemoryRowStore {
    tables: HashMap<String, MemoryTable>,
    unit_snapshot: Option<(HashMap<String, MemoryTable>, u64)>,
    writes: u64,
    fail_row_writes: bool,
    fail_commits: bool,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of row updates applied so far (shifted rows plus point writes).
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Make every subsequent `write_order` fail with a storage error.
    pub fn set_fail_row_writes(&mut self, fail: bool) {
        self.fail_row_writes = fail;
    }

    /// Make every subsequent `commit_unit` fail with a storage error, leaving the unit open
    /// the way a busy database does.
    pub fn set_fail_commits(&mut self, fail: bool) {
        self.fail_commits = fail;
    }

    pub fn in_unit(&self) -> bool {
        self.unit_snapshot.is_some()
    }

    fn table(&self, config: &OrderingConfig) -> Option<&MemoryTable> {
        self.tables.get(&config.table)
    }

    fn table_mut(&mut self, config: &OrderingConfig) -> &mut MemoryTable {
        self.tables.entry(config.table.clone()).or_default()
    }

    fn members<'a>(
        table: Option<&'a MemoryTable>,
        partition: &'a Partition,
    ) -> impl Iterator<Item = (&'a RowId, &'a MemoryRow)> + 'a {
        table
            .into_iter()
            .flat_map(|rows| rows.iter())
            .filter(move |(_, row)| partition.matches(&row.keys))
    }
}

impl RowStore for MemoryRowStore {
    fn begin_unit(&mut self) -> Result<()> {
        if self.unit_snapshot.is_some() {
            return Err(Error::Storage("unit of work already open".into()));
        }
        self.unit_snapshot = Some((self.tables.clone(), self.writes));
        Ok(())
    }

    fn commit_unit(&mut self) -> Result<()> {
        if self.fail_commits && self.unit_snapshot.is_some() {
            return Err(Error::Storage("commit rejected: database is locked".into()));
        }
        self.unit_snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::Storage("commit without an open unit of work".into()))
    }

    fn rollback_unit(&mut self) -> Result<()> {
        let (tables, writes) = self
            .unit_snapshot
            .take()
            .ok_or_else(|| Error::Storage("rollback without an open unit of work".into()))?;
        self.tables = tables;
        self.writes = writes;
        Ok(())
    }

    fn find_highest_order(
        &self,
        config: &OrderingConfig,
        partition: &Partition,
    ) -> Result<Option<Order>> {
        Ok(Self::members(self.table(config), partition)
            .map(|(_, row)| row.order)
            .max())
    }

    fn list_ordered(&self, config: &OrderingConfig, partition: &Partition) -> Result<Vec<RowRef>> {
        let mut rows: Vec<RowRef> = Self::members(self.table(config), partition)
            .map(|(id, row)| RowRef::new(*id, row.order))
            .collect();
        rows.sort_by_key(|r| (r.order, r.id));
        Ok(rows)
    }

    fn shift_orders(
        &mut self,
        config: &OrderingConfig,
        partition: &Partition,
        range: RangeInclusive<Order>,
        delta: i64,
    ) -> Result<u64> {
        let mut shifted = 0u64;
        for row in self.table_mut(config).values_mut() {
            if partition.matches(&row.keys) && range.contains(&row.order) {
                row.order += delta;
                shifted += 1;
            }
        }
        self.writes += shifted;
        Ok(shifted)
    }

    fn write_order(&mut self, config: &OrderingConfig, id: RowId, value: Order) -> Result<()> {
        if self.fail_row_writes {
            return Err(Error::Storage(format!("write of row {id} rejected")));
        }
        let row = self.table_mut(config).get_mut(&id).ok_or_else(|| {
            Error::Precondition(format!("row {id} does not exist in `{}`", config.table))
        })?;
        row.order = value;
        self.writes += 1;
        Ok(())
    }

    fn load_order(&self, config: &OrderingConfig, id: RowId) -> Result<Option<Order>> {
        Ok(self
            .table(config)
            .and_then(|rows| rows.get(&id))
            .map(|row| row.order))
    }
}

impl RowTable for MemoryRowStore {
    fn insert_row(
        &mut self,
        config: &OrderingConfig,
        id: RowId,
        order: Order,
        partition: &Partition,
    ) -> Result<()> {
        let table = self.table_mut(config);
        if table.contains_key(&id) {
            return Err(Error::Storage(format!(
                "duplicate row {id} in `{}`",
                config.table
            )));
        }
        let keys = partition
            .keys()
            .iter()
            .map(|(c, v)| (c.clone(), v.clone()))
            .collect();
        table.insert(id, MemoryRow { order, keys });
        Ok(())
    }

    fn delete_row(&mut self, config: &OrderingConfig, id: RowId) -> Result<bool> {
        Ok(self.table_mut(config).remove(&id).is_some())
    }
}
