//! Statement text shared by the SQL-backed row stores.
//!
//! Every statement is derived from an `OrderingConfig` that already passed `validate()`, so
//! identifiers are plain ASCII words; they are still quoted because `order` is reserved.
//! Partition-key values are always bound as parameters, in configuration order, after the
//! statement's fixed parameters.

use crate::config::OrderingConfig;

/// Placeholder syntax of the target database.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Placeholder {
    /// `?1`, `?2`, … (SQLite)
    Question,
    /// `$1`, `$2`, … (PostgreSQL)
    Dollar,
}

impl Placeholder {
    pub fn nth(self, n: usize) -> String {
        match self {
            Placeholder::Question => format!("?{n}"),
            Placeholder::Dollar => format!("${n}"),
        }
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Pre-rendered statements for one ordered table.
#[derive(Clone, Debug)]
pub struct SequenceSql {
    pub highest_order: String,
    pub list_ordered: String,
    pub shift_orders: String,
    pub write_order: String,
    pub insert_row: String,
    pub delete_row: String,
    pub load_order: String,
}

impl SequenceSql {
    pub fn new(config: &OrderingConfig, placeholder: Placeholder) -> Self {
        let table = quote_ident(&config.table);
        let id = quote_ident(&config.id_column);
        let order = quote_ident(&config.order_column);
        let p = |n: usize| placeholder.nth(n);

        let keys: Vec<String> = config.partition_keys.iter().map(|k| quote_ident(k)).collect();
        let filter = |first: usize| -> String {
            if keys.is_empty() {
                return "1 = 1".to_string();
            }
            keys.iter()
                .enumerate()
                .map(|(i, key)| format!("{key} = {}", p(first + i)))
                .collect::<Vec<_>>()
                .join(" AND ")
        };

        let mut insert_columns = vec![id.clone(), order.clone()];
        insert_columns.extend(keys.iter().cloned());
        let insert_values: Vec<String> = (1..=insert_columns.len()).map(|n| p(n)).collect();

        Self {
            highest_order: format!("SELECT MAX({order}) FROM {table} WHERE {}", filter(1)),
            list_ordered: format!(
                "SELECT {id}, {order} FROM {table} WHERE {} ORDER BY {order} ASC, {id} ASC",
                filter(1)
            ),
            shift_orders: format!(
                "UPDATE {table} SET {order} = {order} + {} WHERE {order} BETWEEN {} AND {} AND {}",
                p(1),
                p(2),
                p(3),
                filter(4)
            ),
            write_order: format!("UPDATE {table} SET {order} = {} WHERE {id} = {}", p(1), p(2)),
            insert_row: format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                insert_columns.join(", "),
                insert_values.join(", ")
            ),
            delete_row: format!("DELETE FROM {table} WHERE {id} = {}", p(1)),
            load_order: format!("SELECT {order} FROM {table} WHERE {id} = {} LIMIT 1", p(1)),
        }
    }
}

/// Name of the `(partition keys…, order)` index created alongside a table.
pub fn sequence_index_name(config: &OrderingConfig) -> String {
    quote_ident(&format!("idx_{}_sequence", config.table))
}

/// Column list of the sequence index, partition keys first.
pub fn sequence_index_columns(config: &OrderingConfig) -> String {
    config
        .partition_keys
        .iter()
        .chain(std::iter::once(&config.order_column))
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}
