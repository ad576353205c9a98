use crate::config::OrderingConfig;
use crate::error::{Error, Result};
use crate::ids::{Order, RowRef};
use crate::partition::Partition;
use crate::traits::RowStore;

/// Read-only view of a table's partitions.
///
/// Queries run against whatever unit of work the store currently has open; callers that need a
/// consistent read-modify-write cycle should go through `SequenceMutator`.
pub struct SequenceQuery<'a, S: RowStore + ?Sized> {
    store: &'a S,
    config: &'a OrderingConfig,
}

impl<'a, S: RowStore + ?Sized> SequenceQuery<'a, S> {
    pub fn new(store: &'a S, config: &'a OrderingConfig) -> Self {
        Self { store, config }
    }

    /// Highest order value in the partition, `None` when it has no rows.
    pub fn highest_order(&self, partition: &Partition) -> Result<Option<Order>> {
        self.config.check_partition(partition)?;
        self.store.find_highest_order(self.config, partition)
    }

    /// Partition members ascending by order.
    pub fn list_ordered(&self, partition: &Partition) -> Result<Vec<RowRef>> {
        self.config.check_partition(partition)?;
        self.store.list_ordered(self.config, partition)
    }

    pub fn count(&self, partition: &Partition) -> Result<usize> {
        Ok(self.list_ordered(partition)?.len())
    }

    /// Check that the partition holds exactly `0..N` with no gaps or duplicates.
    pub fn validate(&self, partition: &Partition) -> Result<()> {
        let rows = self.list_ordered(partition)?;
        for (rank, row) in rows.iter().enumerate() {
            if row.order != rank as Order {
                return Err(Error::InconsistentState(format!(
                    "table `{}` partition [{partition}]: row {} holds order {} at rank {rank}",
                    self.config.table, row.id, row.order
                )));
            }
        }
        Ok(())
    }
}
