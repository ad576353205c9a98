mod common;

use common::{by_list, create_all, refreshed_orders, unpartitioned, Item};
use denseorder_core::{Error, Orderable, Partition};

#[test]
fn creates_append_to_an_empty_partition() {
    let mut m = unpartitioned();

    let items = create_all(&mut m, vec![Item::new(1), Item::new(2), Item::new(3)]);

    let orders: Vec<_> = items.iter().map(|i| i.order()).collect();
    assert_eq!(orders, vec![Some(0), Some(1), Some(2)]);
    m.query().validate(&Partition::whole_table()).unwrap();
}

#[test]
fn creates_append_per_partition() {
    let mut m = by_list();

    let mut items = create_all(
        &mut m,
        vec![
            Item::new(1).in_list(0),
            Item::new(2).in_list(1),
            Item::new(3).in_list(0),
            Item::new(4).in_list(1),
            Item::new(5).in_list(1),
        ],
    );

    assert_eq!(refreshed_orders(&m, &mut items), vec![0, 0, 1, 1, 2]);
}

#[test]
fn on_create_keeps_a_pre_assigned_order() {
    let mut m = unpartitioned();
    create_all(&mut m, vec![Item::new(1), Item::new(2)]);
    let writes = m.store().writes();
    let mut item = Item::new(3).at(1);

    assert_eq!(m.on_create(&mut item).unwrap(), 1);
    assert_eq!(item.order(), Some(1));
    assert_eq!(m.store().writes(), writes);
}

#[test]
fn on_create_treats_a_negative_order_as_unset() {
    let mut m = unpartitioned();
    create_all(&mut m, vec![Item::new(1), Item::new(2)]);
    let mut item = Item::new(3).at(-1);

    assert_eq!(m.on_create(&mut item).unwrap(), 2);
}

#[test]
fn on_create_needs_every_partition_key() {
    let m = by_list();
    let mut item = Item::new(1);

    let err = m.on_create(&mut item).unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(item.order(), None);
}

#[test]
fn duplicate_create_rolls_back() {
    let mut m = unpartitioned();
    create_all(&mut m, vec![Item::new(1)]);
    let mut again = Item::new(1);

    let err = m.create(&mut again).unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(again.order(), None);
    assert!(!m.store().in_unit());
}

#[test]
fn refresh_of_a_deleted_row_fails() {
    let mut m = unpartitioned();
    let mut items = create_all(&mut m, vec![Item::new(1), Item::new(2)]);
    m.delete(&items[0]).unwrap();

    let err = m.refresh(&mut items[0]).unwrap_err();

    assert!(matches!(err, Error::Precondition(_)));
    assert_eq!(m.refresh(&mut items[1]).unwrap(), 0);
}
