#![forbid(unsafe_code)]
//! PostgreSQL row store for `denseorder-core`.
//!
//! All sequence arithmetic stays in `denseorder-core`; this crate only renders the statements
//! against vanilla PostgreSQL and maps units of work onto `BEGIN`/`COMMIT`/`ROLLBACK`.

mod schema;
mod store;

pub use schema::{drop_table_for_tests, ensure_table};
pub use store::PgRowStore;
