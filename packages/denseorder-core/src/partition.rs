use std::collections::BTreeMap;
use std::fmt;

use crate::config::OrderingConfig;
use crate::error::{Error, Result};
use crate::traits::Orderable;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Value of a single partition-key column.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(untagged))]
pub enum PartitionValue {
    Integer(i64),
    Text(String),
}

/// Storage type of a partition-key column, used by backends when creating tables.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PartitionValueKind {
    Integer,
    Text,
}

impl PartitionValue {
    pub fn kind(&self) -> PartitionValueKind {
        match self {
            PartitionValue::Integer(_) => PartitionValueKind::Integer,
            PartitionValue::Text(_) => PartitionValueKind::Text,
        }
    }
}

impl From<i64> for PartitionValue {
    fn from(v: i64) -> Self {
        PartitionValue::Integer(v)
    }
}

impl From<i32> for PartitionValue {
    fn from(v: i32) -> Self {
        PartitionValue::Integer(v.into())
    }
}

impl From<&str> for PartitionValue {
    fn from(v: &str) -> Self {
        PartitionValue::Text(v.to_string())
    }
}

impl From<String> for PartitionValue {
    fn from(v: String) -> Self {
        PartitionValue::Text(v)
    }
}

impl fmt::Display for PartitionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionValue::Integer(v) => write!(f, "{v}"),
            PartitionValue::Text(v) => write!(f, "{v:?}"),
        }
    }
}

/// Filter selecting the rows that share one set of partition-key values.
///
/// Keys are kept in configuration order. An empty partition spans the whole table.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Partition {
    keys: Vec<(String, PartitionValue)>,
}

impl Partition {
    pub fn whole_table() -> Self {
        Self::default()
    }

    pub fn new<I, C, V>(keys: I) -> Self
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<PartitionValue>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        }
    }

    /// Build the partition a row belongs to by reading every configured key column from it.
    pub fn of<R: Orderable + ?Sized>(config: &OrderingConfig, row: &R) -> Result<Self> {
        let mut keys = Vec::with_capacity(config.partition_keys.len());
        for column in &config.partition_keys {
            let value = row.partition_value(column).ok_or_else(|| {
                Error::Validation(format!(
                    "row {} is missing partition key `{column}` of table `{}`",
                    row.row_id(),
                    config.table
                ))
            })?;
            keys.push((column.clone(), value));
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[(String, PartitionValue)] {
        &self.keys
    }

    pub fn is_whole_table(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn value(&self, column: &str) -> Option<&PartitionValue> {
        self.keys.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// True when a stored row with the given key columns falls inside this partition.
    pub fn matches(&self, columns: &BTreeMap<String, PartitionValue>) -> bool {
        self.keys
            .iter()
            .all(|(column, value)| columns.get(column) == Some(value))
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.keys.is_empty() {
            return f.write_str("<whole table>");
        }
        for (i, (column, value)) in self.keys.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{column}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_keys_in_configuration_order() {
        let partition = Partition::new([("course_id", PartitionValue::from(3)), ("kind", "video".into())]);
        assert_eq!(partition.to_string(), "course_id=3,kind=\"video\"");
        assert_eq!(Partition::whole_table().to_string(), "<whole table>");
    }

    #[test]
    fn matches_requires_every_key() {
        let partition = Partition::new([("a", 1), ("b", 2)]);
        let mut columns = BTreeMap::new();
        columns.insert("a".to_string(), PartitionValue::Integer(1));
        assert!(!partition.matches(&columns));
        columns.insert("b".to_string(), PartitionValue::Integer(2));
        assert!(partition.matches(&columns));
        columns.insert("b".to_string(), PartitionValue::Integer(3));
        assert!(!partition.matches(&columns));
        assert!(Partition::whole_table().matches(&columns));
    }
}
