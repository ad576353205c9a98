use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::config::OrderingConfig;
use crate::error::{Error, Result};
use crate::ids::{Order, RowId};
use crate::partition::Partition;
use crate::query::SequenceQuery;
use crate::traits::{Orderable, RowStore, RowTable};

/// Reorders rows inside their partition while keeping the partition dense.
///
/// Every mutating call reads the high-water mark, computes the shift range and writes all
/// affected rows inside one unit of work on the injected store. The in-memory row is updated
/// only after the unit commits.
pub struct SequenceMutator<S> {
    store: S,
    config: OrderingConfig,
}

/// Run `f` between `begin_unit` and `commit_unit`, rolling back on any error.
fn run_in_unit<S, T, F>(store: &mut S, op: &'static str, f: F) -> Result<T>
where
    S: RowStore + ?Sized,
    F: FnOnce(&mut S) -> Result<T>,
{
    store.begin_unit()?;
    let result = f(&mut *store).and_then(|value| store.commit_unit().map(|()| value));
    if let Err(e) = &result {
        // A failed commit can leave the transaction open; close it either way.
        warn!(op, error = %e, "rolling back unit of work");
        if let Err(rollback) = store.rollback_unit() {
            warn!(op, error = %rollback, "rollback failed");
        }
    }
    result
}

/// Where a repositioned row should go, resolved against persisted state inside the unit.
#[derive(Clone, Copy, Debug)]
enum Target {
    At(Order),
    End,
    Up,
    Down,
    Before(RowId),
    After(RowId),
}

/// Clamp a requested position into `0..=high`. An empty partition leaves the request as is.
fn clamp_target(high: Option<Order>, requested: Order) -> Order {
    match high {
        Some(high) => requested.max(0).min(high),
        None => requested,
    }
}

fn current_order<R: Orderable + ?Sized>(row: &R) -> Result<Order> {
    match row.order() {
        Some(order) if order >= 0 => Ok(order),
        _ => Err(Error::Precondition(format!(
            "row {} has no order value; create it before reordering",
            row.row_id()
        ))),
    }
}

/// Order of `id` as persisted by the store.
fn persisted_order<S: RowStore + ?Sized>(
    store: &S,
    config: &OrderingConfig,
    id: RowId,
) -> Result<Order> {
    store.load_order(config, id)?.ok_or_else(|| {
        Error::Precondition(format!("row {id} does not exist in `{}`", config.table))
    })
}

/// Requested position for `target`, before clamping.
fn requested_order<S: RowStore + ?Sized>(
    store: &S,
    config: &OrderingConfig,
    target: Target,
    high: Option<Order>,
    current: Order,
) -> Result<Order> {
    let requested = match target {
        Target::At(order) => order,
        Target::End => high.unwrap_or(0),
        Target::Up => high.unwrap_or(0).min(current.saturating_add(1)),
        Target::Down => (current - 1).max(0),
        Target::Before(sibling) => persisted_order(store, config, sibling)?.max(0),
        Target::After(sibling) => {
            let sibling = persisted_order(store, config, sibling)?;
            let wanted = if sibling == 0 { 1 } else { sibling };
            match high {
                Some(high) => high.min(wanted),
                None => 0,
            }
        }
    };
    Ok(requested)
}

fn next_order<S: RowStore + ?Sized>(
    store: &S,
    config: &OrderingConfig,
    partition: &Partition,
    existing: Option<Order>,
) -> Result<Order> {
    if let Some(order) = existing.filter(|o| *o >= 0) {
        return Ok(order);
    }
    let high = SequenceQuery::new(store, config).highest_order(partition)?;
    Ok(high.map_or(0, |h| h + 1))
}

fn densify<S: RowStore + ?Sized>(
    store: &mut S,
    config: &OrderingConfig,
    partition: &Partition,
) -> Result<usize> {
    let rows = SequenceQuery::new(&*store, config).list_ordered(partition)?;
    let mut rewritten = 0;
    for (rank, row) in rows.iter().enumerate() {
        let order = rank as Order;
        if row.order != order {
            store.write_order(config, row.id, order)?;
            rewritten += 1;
        }
    }
    debug!(
        table = %config.table,
        partition = %partition,
        members = rows.len(),
        rewritten,
        "synced sequence"
    );
    Ok(rewritten)
}

impl<S: RowStore> SequenceMutator<S> {
    pub fn new(store: S, config: OrderingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &OrderingConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn query(&self) -> SequenceQuery<'_, S> {
        SequenceQuery::new(&self.store, &self.config)
    }

    pub fn partition_of<R: Orderable + ?Sized>(&self, row: &R) -> Result<Partition> {
        Partition::of(&self.config, row)
    }

    /// Highest order in the row's partition.
    pub fn highest_order_of<R: Orderable + ?Sized>(&self, row: &R) -> Result<Option<Order>> {
        let partition = self.partition_of(row)?;
        self.query().highest_order(&partition)
    }

    /// Move `row` to `requested`, clamped to the partition's highest order, shifting the rows
    /// in between by one. Returns the position the row ended up at.
    pub fn set_order<R: Orderable + ?Sized>(
        &mut self,
        row: &mut R,
        requested: Order,
    ) -> Result<Order> {
        if requested < 0 {
            return Err(Error::Validation(format!(
                "order {requested} for row {} must be zero or greater",
                row.row_id()
            )));
        }
        self.reposition(row, "set_order", Target::At(requested))
    }

    pub fn is_first<R: Orderable + ?Sized>(&self, row: &R) -> bool {
        row.order() == Some(0)
    }

    pub fn is_last<R: Orderable + ?Sized>(&self, row: &R) -> Result<bool> {
        let high = self.highest_order_of(row)?;
        Ok(row.order().is_some() && row.order() == high)
    }

    pub fn move_to_start<R: Orderable + ?Sized>(&mut self, row: &mut R) -> Result<Order> {
        self.reposition(row, "move_to_start", Target::At(0))
    }

    pub fn move_to_end<R: Orderable + ?Sized>(&mut self, row: &mut R) -> Result<Order> {
        self.reposition(row, "move_to_end", Target::End)
    }

    /// One position towards the end. No effect on the last row.
    pub fn move_up<R: Orderable + ?Sized>(&mut self, row: &mut R) -> Result<Order> {
        self.reposition(row, "move_up", Target::Up)
    }

    /// One position towards the start. No effect on the first row.
    pub fn move_down<R: Orderable + ?Sized>(&mut self, row: &mut R) -> Result<Order> {
        self.reposition(row, "move_down", Target::Down)
    }

    /// Move `row` to the position `target` currently holds.
    pub fn move_before<R, T>(&mut self, row: &mut R, target: &T) -> Result<Order>
    where
        R: Orderable + ?Sized,
        T: Orderable + ?Sized,
    {
        let sibling = self.sibling_of(&*row, target)?;
        self.reposition(row, "move_before", Target::Before(sibling))
    }

    /// Move `row` next to `target`: position 1 when `target` is first, otherwise the position
    /// `target` currently holds.
    pub fn move_after<R, T>(&mut self, row: &mut R, target: &T) -> Result<Order>
    where
        R: Orderable + ?Sized,
        T: Orderable + ?Sized,
    {
        let sibling = self.sibling_of(&*row, target)?;
        self.reposition(row, "move_after", Target::After(sibling))
    }

    /// Exchange the positions of two rows of the same partition. Nothing else shifts.
    pub fn swap_order<A, B>(&mut self, a: &mut A, b: &mut B) -> Result<()>
    where
        A: Orderable + ?Sized,
        B: Orderable + ?Sized,
    {
        let partition = self.partition_of(&*a)?;
        if self.partition_of(&*b)? != partition {
            return Err(Error::Precondition(format!(
                "cannot swap row {} of [{partition}] with row {} of another partition",
                a.row_id(),
                b.row_id()
            )));
        }
        current_order(&*a)?;
        current_order(&*b)?;
        let (id_a, id_b) = (a.row_id(), b.row_id());
        let config = &self.config;
        let (order_a, order_b) = run_in_unit(&mut self.store, "swap_order", |store| {
            let order_a = persisted_order(&*store, config, id_a)?;
            let order_b = persisted_order(&*store, config, id_b)?;
            store.write_order(config, id_a, order_b)?;
            store.write_order(config, id_b, order_a)?;
            debug!(
                table = %config.table,
                partition = %partition,
                a = %id_a,
                b = %id_b,
                "swapped rows"
            );
            Ok((order_a, order_b))
        })?;
        a.set_order(order_b);
        b.set_order(order_a);
        Ok(())
    }

    /// Assign the order of a row about to be inserted: a non-negative pre-assigned order is
    /// kept, anything else appends to the end of the partition.
    pub fn on_create<R: Orderable + ?Sized>(&self, row: &mut R) -> Result<Order> {
        let partition = self.partition_of(&*row)?;
        let order = next_order(&self.store, &self.config, &partition, row.order())?;
        row.set_order(order);
        Ok(order)
    }

    /// Renumber the partition `0..N` in its current order, writing only rows whose value
    /// changes. Returns the number of rows rewritten.
    pub fn sync_sequence(&mut self, partition: &Partition) -> Result<usize> {
        self.config.check_partition(partition)?;
        let config = &self.config;
        run_in_unit(&mut self.store, "sync_sequence", |store| {
            densify(store, config, partition)
        })
    }

    /// `sync_sequence` for the partition `row` belongs to.
    pub fn sync_sequence_of<R: Orderable + ?Sized>(&mut self, row: &R) -> Result<usize> {
        let partition = self.partition_of(row)?;
        self.sync_sequence(&partition)
    }

    fn sibling_of<R, T>(&self, row: &R, target: &T) -> Result<RowId>
    where
        R: Orderable + ?Sized,
        T: Orderable + ?Sized,
    {
        let partition = self.partition_of(row)?;
        if self.partition_of(target)? != partition {
            return Err(Error::Precondition(format!(
                "row {} of [{partition}] cannot be placed relative to row {} of another partition",
                row.row_id(),
                target.row_id()
            )));
        }
        Ok(target.row_id())
    }

    /// Reload the persisted order into the in-memory row.
    pub fn refresh<R: Orderable + ?Sized>(&self, row: &mut R) -> Result<Order> {
        let order = self
            .store
            .load_order(&self.config, row.row_id())?
            .ok_or_else(|| {
                Error::Precondition(format!(
                    "row {} no longer exists in `{}`",
                    row.row_id(),
                    self.config.table
                ))
            })?;
        row.set_order(order);
        Ok(order)
    }

    /// Shared move path. The row's own order, the partition's highest order and any sibling
    /// order are all read from the store inside the unit of work; the in-memory order is only
    /// checked for being set.
    fn reposition<R>(&mut self, row: &mut R, op: &'static str, to: Target) -> Result<Order>
    where
        R: Orderable + ?Sized,
    {
        let partition = self.partition_of(&*row)?;
        current_order(&*row)?;
        let id = row.row_id();
        let config = &self.config;
        let target = run_in_unit(&mut self.store, op, |store| {
            let current = persisted_order(&*store, config, id)?;
            let high = SequenceQuery::new(&*store, config).highest_order(&partition)?;
            match high {
                Some(high) if current <= high => {}
                _ => {
                    return Err(Error::Precondition(format!(
                        "row {id} at order {current} is not a member of [{partition}]"
                    )))
                }
            }
            let requested = requested_order(&*store, config, to, high, current)?;
            let target = clamp_target(high, requested);

            // The moved row's own slot is excluded from both ranges; its write below lands in
            // the slot the shift vacated.
            let shifted = match target.cmp(&current) {
                Ordering::Greater => {
                    store.shift_orders(config, &partition, (current + 1)..=target, -1)?
                }
                Ordering::Less => store.shift_orders(config, &partition, target..=(current - 1), 1)?,
                Ordering::Equal => 0,
            };
            store.write_order(config, id, target)?;

            debug!(
                op,
                table = %config.table,
                partition = %partition,
                row = %id,
                from = current,
                to = target,
                shifted,
                "reordered row"
            );
            Ok(target)
        })?;
        row.set_order(target);
        Ok(target)
    }
}

impl<S: RowTable> SequenceMutator<S> {
    /// Persist a new row at its assigned position (appended unless pre-assigned).
    pub fn create<R: Orderable + ?Sized>(&mut self, row: &mut R) -> Result<Order> {
        let partition = self.partition_of(&*row)?;
        let existing = row.order();
        let id = row.row_id();
        let config = &self.config;
        let order = run_in_unit(&mut self.store, "create", |store| {
            let order = next_order(&*store, config, &partition, existing)?;
            store.insert_row(config, id, order, &partition)?;
            debug!(table = %config.table, partition = %partition, row = %id, order, "created row");
            Ok(order)
        })?;
        row.set_order(order);
        Ok(order)
    }

    /// Remove a row and re-densify its partition in the same unit of work.
    /// Returns the number of remaining rows whose order was rewritten.
    pub fn delete<R: Orderable + ?Sized>(&mut self, row: &R) -> Result<usize> {
        let partition = self.partition_of(row)?;
        let id = row.row_id();
        let config = &self.config;
        run_in_unit(&mut self.store, "delete", |store| {
            if !store.delete_row(config, id)? {
                return Err(Error::Precondition(format!(
                    "row {id} does not exist in `{}`",
                    config.table
                )));
            }
            densify(store, config, &partition)
        })
    }
}
