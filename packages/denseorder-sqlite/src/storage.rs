use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::Path;
use std::rc::Rc;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use denseorder_core::sql::{
    quote_ident, sequence_index_columns, sequence_index_name, Placeholder, SequenceSql,
};
use denseorder_core::{
    Error, Order, OrderingConfig, Partition, PartitionValue, Result, RowId, RowRef, RowStore,
    RowTable,
};

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

fn to_value(value: &PartitionValue) -> Value {
    match value {
        PartitionValue::Integer(v) => Value::Integer(*v),
        PartitionValue::Text(v) => Value::Text(v.clone()),
    }
}

fn partition_values(config: &OrderingConfig, partition: &Partition) -> Result<Vec<Value>> {
    config.check_partition(partition)?;
    Ok(partition.keys().iter().map(|(_, v)| to_value(v)).collect())
}

/// SQLite-backed `RowStore` operating on caller-owned tables.
pub struct SqliteRowStore {
    conn: Connection,
    statements: RefCell<HashMap<OrderingConfig, Rc<SequenceSql>>>,
}

impl SqliteRowStore {
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage_err)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            statements: RefCell::new(HashMap::new()),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create the ordered table and its `(partition keys…, order)` index if missing.
    /// Partition-key columns are left untyped.
    pub fn ensure_table(&mut self, config: &OrderingConfig) -> Result<()> {
        config.validate()?;
        let mut columns = vec![
            format!("{} INTEGER PRIMARY KEY", quote_ident(&config.id_column)),
            format!("{} INTEGER NOT NULL", quote_ident(&config.order_column)),
        ];
        columns.extend(config.partition_keys.iter().map(|k| quote_ident(k)));
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} ({columns});
             CREATE INDEX IF NOT EXISTS {index} ON {table} ({index_columns});",
            table = quote_ident(&config.table),
            columns = columns.join(", "),
            index = sequence_index_name(config),
            index_columns = sequence_index_columns(config),
        );
        self.conn.execute_batch(&ddl).map_err(storage_err)?;
        debug!(table = %config.table, "ensured sqlite table");
        Ok(())
    }

    fn sql(&self, config: &OrderingConfig) -> Rc<SequenceSql> {
        if let Some(sql) = self.statements.borrow().get(config) {
            return Rc::clone(sql);
        }
        let sql = Rc::new(SequenceSql::new(config, Placeholder::Question));
        self.statements
            .borrow_mut()
            .insert(config.clone(), Rc::clone(&sql));
        sql
    }
}

impl RowStore for SqliteRowStore {
    fn begin_unit(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE").map_err(storage_err)
    }

    fn commit_unit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT").map_err(storage_err)
    }

    fn rollback_unit(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK").map_err(storage_err)
    }

    fn find_highest_order(
        &self,
        config: &OrderingConfig,
        partition: &Partition,
    ) -> Result<Option<Order>> {
        let values = partition_values(config, partition)?;
        let sql = self.sql(config);
        let mut stmt = self.conn.prepare_cached(&sql.highest_order).map_err(storage_err)?;
        stmt.query_row(params_from_iter(values), |row| row.get::<_, Option<i64>>(0))
            .map_err(storage_err)
    }

    fn list_ordered(&self, config: &OrderingConfig, partition: &Partition) -> Result<Vec<RowRef>> {
        let values = partition_values(config, partition)?;
        let sql = self.sql(config);
        let mut stmt = self.conn.prepare_cached(&sql.list_ordered).map_err(storage_err)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(RowRef::new(RowId(row.get(0)?), row.get(1)?))
            })
            .map_err(storage_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(storage_err)?);
        }
        Ok(out)
    }

    fn shift_orders(
        &mut self,
        config: &OrderingConfig,
        partition: &Partition,
        range: RangeInclusive<Order>,
        delta: i64,
    ) -> Result<u64> {
        let mut values = vec![
            Value::Integer(delta),
            Value::Integer(*range.start()),
            Value::Integer(*range.end()),
        ];
        values.extend(partition_values(config, partition)?);
        let sql = self.sql(config);
        let changed = self
            .conn
            .prepare_cached(&sql.shift_orders)
            .and_then(|mut stmt| stmt.execute(params_from_iter(values)))
            .map_err(storage_err)?;
        Ok(changed as u64)
    }

    fn write_order(&mut self, config: &OrderingConfig, id: RowId, value: Order) -> Result<()> {
        let sql = self.sql(config);
        let changed = self
            .conn
            .prepare_cached(&sql.write_order)
            .and_then(|mut stmt| stmt.execute(params![value, id.0]))
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(Error::Precondition(format!(
                "row {id} does not exist in `{}`",
                config.table
            )));
        }
        Ok(())
    }

    fn load_order(&self, config: &OrderingConfig, id: RowId) -> Result<Option<Order>> {
        let sql = self.sql(config);
        self.conn
            .prepare_cached(&sql.load_order)
            .and_then(|mut stmt| {
                stmt.query_row(params![id.0], |row| row.get::<_, i64>(0))
                    .optional()
            })
            .map_err(storage_err)
    }
}

impl RowTable for SqliteRowStore {
    fn insert_row(
        &mut self,
        config: &OrderingConfig,
        id: RowId,
        order: Order,
        partition: &Partition,
    ) -> Result<()> {
        let mut values = vec![Value::Integer(id.0), Value::Integer(order)];
        values.extend(partition_values(config, partition)?);
        let sql = self.sql(config);
        self.conn
            .prepare_cached(&sql.insert_row)
            .and_then(|mut stmt| stmt.execute(params_from_iter(values)))
            .map_err(storage_err)?;
        Ok(())
    }

    fn delete_row(&mut self, config: &OrderingConfig, id: RowId) -> Result<bool> {
        let sql = self.sql(config);
        let changed = self
            .conn
            .prepare_cached(&sql.delete_row)
            .and_then(|mut stmt| stmt.execute(params![id.0]))
            .map_err(storage_err)?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OrderingConfig {
        OrderingConfig::new("sections").with_partition_keys(["course_id", "kind"])
    }

    fn partition(course: i64, kind: &str) -> Partition {
        Partition::new([("course_id", PartitionValue::from(course)), ("kind", kind.into())])
    }

    fn store() -> SqliteRowStore {
        let mut store = SqliteRowStore::new_in_memory().unwrap();
        store.ensure_table(&config()).unwrap();
        store
    }

    #[test]
    fn highest_order_is_scoped_to_partition() {
        let config = config();
        let mut store = store();
        store.insert_row(&config, RowId(1), 0, &partition(1, "a")).unwrap();
        store.insert_row(&config, RowId(2), 1, &partition(1, "a")).unwrap();
        store.insert_row(&config, RowId(3), 5, &partition(1, "b")).unwrap();

        assert_eq!(store.find_highest_order(&config, &partition(1, "a")).unwrap(), Some(1));
        assert_eq!(store.find_highest_order(&config, &partition(1, "b")).unwrap(), Some(5));
        assert_eq!(store.find_highest_order(&config, &partition(2, "a")).unwrap(), None);
    }

    #[test]
    fn shift_touches_only_the_range() {
        let config = config();
        let mut store = store();
        for (id, order) in [(1, 0), (2, 1), (3, 2), (4, 3)] {
            store.insert_row(&config, RowId(id), order, &partition(1, "a")).unwrap();
        }

        let shifted = store
            .shift_orders(&config, &partition(1, "a"), 1..=2, 1)
            .unwrap();

        assert_eq!(shifted, 2);
        let orders: Vec<(i64, i64)> = store
            .list_ordered(&config, &partition(1, "a"))
            .unwrap()
            .into_iter()
            .map(|r| (r.id.0, r.order))
            .collect();
        assert_eq!(orders, vec![(1, 0), (2, 2), (3, 3), (4, 3)]);
    }

    #[test]
    fn rollback_discards_unit() {
        let config = config();
        let mut store = store();
        store.insert_row(&config, RowId(1), 0, &partition(1, "a")).unwrap();

        store.begin_unit().unwrap();
        store.write_order(&config, RowId(1), 4).unwrap();
        store.rollback_unit().unwrap();

        assert_eq!(store.load_order(&config, RowId(1)).unwrap(), Some(0));
    }

    #[test]
    fn write_order_of_missing_row_is_a_precondition_failure() {
        let config = config();
        let mut store = store();
        let err = store.write_order(&config, RowId(7), 0).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(!store.delete_row(&config, RowId(7)).unwrap());
        assert_eq!(store.load_order(&config, RowId(7)).unwrap(), None);
    }

    #[test]
    fn statements_are_rendered_once_per_config() {
        let store = store();
        let first = store.sql(&config());
        let second = store.sql(&config());
        assert!(Rc::ptr_eq(&first, &second));
        assert!(!Rc::ptr_eq(&first, &store.sql(&OrderingConfig::new("other"))));
    }

    #[test]
    fn missing_table_surfaces_as_storage_error() {
        let store = SqliteRowStore::new_in_memory().unwrap();
        let err = store
            .find_highest_order(&OrderingConfig::new("absent"), &Partition::whole_table())
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
