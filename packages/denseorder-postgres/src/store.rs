use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::rc::Rc;

use postgres::types::ToSql;
use postgres::{Client, Statement};

use denseorder_core::sql::{Placeholder, SequenceSql};
use denseorder_core::{
    Error, Order, OrderingConfig, Partition, PartitionValue, Result, RowId, RowRef, RowStore,
    RowTable,
};

type Param = Box<dyn ToSql + Sync>;

pub(crate) fn storage_debug<E: std::fmt::Debug>(e: E) -> Error {
    Error::Storage(format!("{e:?}"))
}

fn to_param(value: &PartitionValue) -> Param {
    match value {
        PartitionValue::Integer(v) => Box::new(*v),
        PartitionValue::Text(v) => Box::new(v.clone()),
    }
}

fn partition_params(config: &OrderingConfig, partition: &Partition) -> Result<Vec<Param>> {
    config.check_partition(partition)?;
    Ok(partition.keys().iter().map(|(_, v)| to_param(v)).collect())
}

fn as_refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p.as_ref()).collect()
}

/// PostgreSQL-backed `RowStore`.
///
/// Ordered tables must use `BIGINT` id and order columns, and `BIGINT` or `TEXT` partition-key
/// columns (`ensure_table` creates them that way). A unit of work is a plain `BEGIN`;
/// concurrent movers in one partition serialize on the row locks taken by the shift updates.
pub struct PgRowStore {
    client: Rc<RefCell<Client>>,
    sql: RefCell<HashMap<OrderingConfig, Rc<SequenceSql>>>,
    prepared: RefCell<HashMap<String, Statement>>,
}

impl PgRowStore {
    pub fn new(client: Rc<RefCell<Client>>) -> Self {
        Self {
            client,
            sql: RefCell::new(HashMap::new()),
            prepared: RefCell::new(HashMap::new()),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self::new(Rc::new(RefCell::new(client)))
    }

    pub fn client(&self) -> Rc<RefCell<Client>> {
        self.client.clone()
    }

    fn statements(&self, config: &OrderingConfig) -> Rc<SequenceSql> {
        if let Some(sql) = self.sql.borrow().get(config) {
            return Rc::clone(sql);
        }
        let sql = Rc::new(SequenceSql::new(config, Placeholder::Dollar));
        self.sql.borrow_mut().insert(config.clone(), Rc::clone(&sql));
        sql
    }

    fn prepare(&self, sql: &str) -> Result<Statement> {
        if let Some(stmt) = self.prepared.borrow().get(sql) {
            return Ok(stmt.clone());
        }
        let stmt = self.client.borrow_mut().prepare(sql).map_err(storage_debug)?;
        self.prepared.borrow_mut().insert(sql.to_string(), stmt.clone());
        Ok(stmt)
    }

    fn execute(&self, sql: &str, params: &[Param]) -> Result<u64> {
        let stmt = self.prepare(sql)?;
        self.client
            .borrow_mut()
            .execute(&stmt, &as_refs(params))
            .map_err(storage_debug)
    }

    fn query(&self, sql: &str, params: &[Param]) -> Result<Vec<postgres::Row>> {
        let stmt = self.prepare(sql)?;
        self.client
            .borrow_mut()
            .query(&stmt, &as_refs(params))
            .map_err(storage_debug)
    }
}

impl RowStore for PgRowStore {
    fn begin_unit(&mut self) -> Result<()> {
        self.client.borrow_mut().batch_execute("BEGIN").map_err(storage_debug)
    }

    fn commit_unit(&mut self) -> Result<()> {
        self.client.borrow_mut().batch_execute("COMMIT").map_err(storage_debug)
    }

    fn rollback_unit(&mut self) -> Result<()> {
        self.client.borrow_mut().batch_execute("ROLLBACK").map_err(storage_debug)
    }

    fn find_highest_order(
        &self,
        config: &OrderingConfig,
        partition: &Partition,
    ) -> Result<Option<Order>> {
        let params = partition_params(config, partition)?;
        let rows = self.query(&self.statements(config).highest_order, &params)?;
        let row = rows
            .first()
            .ok_or_else(|| Error::Storage("MAX() returned no row".into()))?;
        row.try_get::<_, Option<i64>>(0).map_err(storage_debug)
    }

    fn list_ordered(&self, config: &OrderingConfig, partition: &Partition) -> Result<Vec<RowRef>> {
        let params = partition_params(config, partition)?;
        let rows = self.query(&self.statements(config).list_ordered, &params)?;
        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get(0).map_err(storage_debug)?;
                let order: i64 = row.try_get(1).map_err(storage_debug)?;
                Ok(RowRef::new(RowId(id), order))
            })
            .collect()
    }

    fn shift_orders(
        &mut self,
        config: &OrderingConfig,
        partition: &Partition,
        range: RangeInclusive<Order>,
        delta: i64,
    ) -> Result<u64> {
        let mut params: Vec<Param> = vec![
            Box::new(delta),
            Box::new(*range.start()),
            Box::new(*range.end()),
        ];
        params.extend(partition_params(config, partition)?);
        self.execute(&self.statements(config).shift_orders, &params)
    }

    fn write_order(&mut self, config: &OrderingConfig, id: RowId, value: Order) -> Result<()> {
        let params: Vec<Param> = vec![Box::new(value), Box::new(id.0)];
        let changed = self.execute(&self.statements(config).write_order, &params)?;
        if changed == 0 {
            return Err(Error::Precondition(format!(
                "row {id} does not exist in `{}`",
                config.table
            )));
        }
        Ok(())
    }

    fn load_order(&self, config: &OrderingConfig, id: RowId) -> Result<Option<Order>> {
        let params: Vec<Param> = vec![Box::new(id.0)];
        let rows = self.query(&self.statements(config).load_order, &params)?;
        rows.first()
            .map(|row| row.try_get::<_, i64>(0).map_err(storage_debug))
            .transpose()
    }
}

impl RowTable for PgRowStore {
    fn insert_row(
        &mut self,
        config: &OrderingConfig,
        id: RowId,
        order: Order,
        partition: &Partition,
    ) -> Result<()> {
        let mut params: Vec<Param> = vec![Box::new(id.0), Box::new(order)];
        params.extend(partition_params(config, partition)?);
        self.execute(&self.statements(config).insert_row, &params)?;
        Ok(())
    }

    fn delete_row(&mut self, config: &OrderingConfig, id: RowId) -> Result<bool> {
        let params: Vec<Param> = vec![Box::new(id.0)];
        Ok(self.execute(&self.statements(config).delete_row, &params)? > 0)
    }
}
