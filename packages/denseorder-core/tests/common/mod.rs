#![allow(dead_code)]

use denseorder_core::{
    MemoryRowStore, Order, OrderingConfig, Orderable, PartitionValue, RowId, SequenceMutator,
};

#[derive(Clone, Debug)]
pub struct Item {
    pub id: RowId,
    pub order: Option<Order>,
    pub list_id: Option<i64>,
    pub kind: Option<String>,
}

impl Item {
    pub fn new(id: i64) -> Self {
        Self {
            id: RowId(id),
            order: None,
            list_id: None,
            kind: None,
        }
    }

    pub fn in_list(mut self, list_id: i64) -> Self {
        self.list_id = Some(list_id);
        self
    }

    pub fn of_kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }

    pub fn at(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }
}

impl Orderable for Item {
    fn row_id(&self) -> RowId {
        self.id
    }

    fn order(&self) -> Option<Order> {
        self.order
    }

    fn set_order(&mut self, order: Order) {
        self.order = Some(order);
    }

    fn partition_value(&self, column: &str) -> Option<PartitionValue> {
        match column {
            "list_id" => self.list_id.map(PartitionValue::Integer),
            "kind" => self.kind.clone().map(PartitionValue::Text),
            _ => None,
        }
    }
}

pub type Mutator = SequenceMutator<MemoryRowStore>;

pub fn mutator(config: OrderingConfig) -> Mutator {
    SequenceMutator::new(MemoryRowStore::new(), config).unwrap()
}

pub fn unpartitioned() -> Mutator {
    mutator(OrderingConfig::new("ordered"))
}

pub fn by_list() -> Mutator {
    mutator(OrderingConfig::new("ordered").with_partition_key("list_id"))
}

/// Persist every item, keeping any pre-assigned order.
pub fn create_all(m: &mut Mutator, mut items: Vec<Item>) -> Vec<Item> {
    for item in &mut items {
        m.create(item).unwrap();
    }
    items
}

/// `count` items with ids starting at `first_id`, created with explicit orders `0..count`.
pub fn seeded(m: &mut Mutator, first_id: i64, list_id: Option<i64>, count: i64) -> Vec<Item> {
    let items = (0..count)
        .map(|i| {
            let mut item = Item::new(first_id + i).at(i);
            item.list_id = list_id;
            item
        })
        .collect();
    create_all(m, items)
}

/// Reload every item and return their persisted orders in slice order.
pub fn refreshed_orders(m: &Mutator, items: &mut [Item]) -> Vec<Order> {
    items
        .iter_mut()
        .map(|item| m.refresh(item).unwrap())
        .collect()
}
