#![forbid(unsafe_code)]
//! Dense, zero-based ordering of table rows, optionally partitioned by key columns.
//! The crate owns only the sequence arithmetic; persistence and transactions are delegated to a
//! `RowStore` so the same logic runs on SQLite, PostgreSQL, or the in-memory store shipped here.

pub mod config;
pub mod error;
pub mod ids;
pub mod mutator;
pub mod partition;
pub mod query;
#[cfg(feature = "sql-storage")]
pub mod sql;
pub mod traits;

pub use config::OrderingConfig;
pub use error::{Error, Result};
pub use ids::{Order, RowId, RowRef};
pub use mutator::SequenceMutator;
pub use partition::{Partition, PartitionValue, PartitionValueKind};
pub use query::SequenceQuery;
pub use traits::{MemoryRowStore, Orderable, RowStore, RowTable};
