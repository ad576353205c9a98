use crate::error::{Error, Result};
use crate::partition::Partition;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const DEFAULT_ID_COLUMN: &str = "id";
const DEFAULT_ORDER_COLUMN: &str = "order";

/// Per-table ordering metadata, supplied once when the mutator is built.
///
/// `partition_keys` lists the columns whose values split the table into independently ordered
/// partitions; leave it empty to order the whole table as one sequence.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct OrderingConfig {
    pub table: String,
    #[cfg_attr(feature = "serde", serde(default = "default_id_column"))]
    pub id_column: String,
    #[cfg_attr(feature = "serde", serde(default = "default_order_column"))]
    pub order_column: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub partition_keys: Vec<String>,
}

#[cfg(feature = "serde")]
fn default_id_column() -> String {
    DEFAULT_ID_COLUMN.to_string()
}

#[cfg(feature = "serde")]
fn default_order_column() -> String {
    DEFAULT_ORDER_COLUMN.to_string()
}

impl OrderingConfig {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id_column: DEFAULT_ID_COLUMN.to_string(),
            order_column: DEFAULT_ORDER_COLUMN.to_string(),
            partition_keys: Vec::new(),
        }
    }

    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    pub fn with_order_column(mut self, column: impl Into<String>) -> Self {
        self.order_column = column.into();
        self
    }

    pub fn with_partition_key(mut self, column: impl Into<String>) -> Self {
        self.partition_keys.push(column.into());
        self
    }

    pub fn with_partition_keys<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.partition_keys.extend(columns.into_iter().map(Into::into));
        self
    }

    #[cfg(feature = "serde")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Validation(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject names that cannot be safely quoted as SQL identifiers, and overlapping columns.
    pub fn validate(&self) -> Result<()> {
        check_identifier("table", &self.table)?;
        check_identifier("id column", &self.id_column)?;
        check_identifier("order column", &self.order_column)?;
        if self.id_column == self.order_column {
            return Err(Error::Validation(format!(
                "id and order column are both `{}`",
                self.id_column
            )));
        }
        for (i, column) in self.partition_keys.iter().enumerate() {
            check_identifier("partition key", column)?;
            if column == &self.id_column || column == &self.order_column {
                return Err(Error::Validation(format!(
                    "partition key `{column}` reuses the id or order column"
                )));
            }
            if self.partition_keys[..i].contains(column) {
                return Err(Error::Validation(format!(
                    "partition key `{column}` is listed twice"
                )));
            }
        }
        Ok(())
    }

    /// Ensure a caller-built partition names exactly the configured key columns, in order.
    pub fn check_partition(&self, partition: &Partition) -> Result<()> {
        let columns: Vec<&str> = partition.keys().iter().map(|(c, _)| c.as_str()).collect();
        let expected: Vec<&str> = self.partition_keys.iter().map(String::as_str).collect();
        if columns != expected {
            return Err(Error::Validation(format!(
                "partition [{partition}] does not match the keys {expected:?} of table `{}`",
                self.table
            )));
        }
        Ok(())
    }
}

fn check_identifier(what: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic());
    if !valid_start || !chars.all(|c| c == '_' || c.is_ascii_alphanumeric()) {
        return Err(Error::Validation(format!(
            "{what} `{name}` is not a valid identifier"
        )));
    }
    Ok(())
}
