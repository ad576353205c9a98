#![forbid(unsafe_code)]
//! SQLite row store for `denseorder-core`.
//! Units of work map onto `BEGIN IMMEDIATE` transactions so concurrent writers on the same
//! database file serialize on SQLite's write lock instead of interleaving their shifts.

mod storage;

pub use storage::SqliteRowStore;
