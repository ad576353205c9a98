use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Zero-based position of a row within its partition.
pub type Order = i64;

/// Identity of a row within its table. Backed by the integer primary key of the host table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RowId(pub i64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lightweight `(id, order)` pair returned by ordered partition listings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RowRef {
    pub id: RowId,
    pub order: Order,
}

impl RowRef {
    pub fn new(id: RowId, order: Order) -> Self {
        Self { id, order }
    }
}
