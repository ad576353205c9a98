use postgres::Client;
use tracing::debug;

use denseorder_core::sql::{quote_ident, sequence_index_columns, sequence_index_name};
use denseorder_core::{Error, OrderingConfig, PartitionValueKind, Result};

use crate::store::storage_debug;

const SCHEMA_LOCK_KEY: i64 = 0x64656e73656f7264; // "denseord"

fn column_type(kind: PartitionValueKind) -> &'static str {
    match kind {
        PartitionValueKind::Integer => "BIGINT",
        PartitionValueKind::Text => "TEXT",
    }
}

/// Create an ordered table plus its `(partition keys…, order)` index.
///
/// `key_kinds` gives the column type of each configured partition key, in order.
pub fn ensure_table(
    client: &mut Client,
    config: &OrderingConfig,
    key_kinds: &[PartitionValueKind],
) -> Result<()> {
    config.validate()?;
    if key_kinds.len() != config.partition_keys.len() {
        return Err(Error::Validation(format!(
            "table `{}` has {} partition keys but {} column types were given",
            config.table,
            config.partition_keys.len(),
            key_kinds.len()
        )));
    }

    let mut columns = vec![
        format!("{} BIGINT PRIMARY KEY", quote_ident(&config.id_column)),
        format!("{} BIGINT NOT NULL", quote_ident(&config.order_column)),
    ];
    for (key, kind) in config.partition_keys.iter().zip(key_kinds) {
        columns.push(format!("{} {} NOT NULL", quote_ident(key), column_type(*kind)));
    }
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {table} ({columns});
         CREATE INDEX IF NOT EXISTS {index} ON {table} ({index_columns});",
        table = quote_ident(&config.table),
        columns = columns.join(", "),
        index = sequence_index_name(config),
        index_columns = sequence_index_columns(config),
    );

    // `CREATE TABLE IF NOT EXISTS` can still race on the catalog; serialize across processes.
    client
        .query_one("SELECT pg_advisory_lock($1)", &[&SCHEMA_LOCK_KEY])
        .map_err(storage_debug)?;

    let res = client
        .batch_execute(&ddl)
        .map_err(storage_debug);

    // Best-effort unlock. Locks are also released when the connection is dropped.
    let _ = client.query_one("SELECT pg_advisory_unlock($1)", &[&SCHEMA_LOCK_KEY]);

    if res.is_ok() {
        debug!(table = %config.table, "ensured postgres table");
    }
    res
}

pub fn drop_table_for_tests(client: &mut Client, config: &OrderingConfig) -> Result<()> {
    config.validate()?;
    client
        .batch_execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&config.table)))
        .map_err(storage_debug)
}
