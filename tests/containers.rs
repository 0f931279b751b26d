//! Container behavior checked against std collections.

use autonomous_trust_core::structures::{
    increment_capacity, AssociativeMap, DynamicArray, TaggedValue,
};
use autonomous_trust_core::Error;
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Op {
    Set(u8, i64),
    Remove(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..64, any::<i64>()).prop_map(|(k, v)| Op::Set(k, v)),
        1 => (0u8..64).prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn map_matches_model(ops in prop::collection::vec(op(), 1..400)) {
        let mut map = AssociativeMap::new();
        let mut model: HashMap<String, i64> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for op in ops {
            match op {
                Op::Set(k, v) => {
                    let key = format!("key-{k}");
                    map.set(&key, &TaggedValue::int(v)).unwrap();
                    if model.insert(key.clone(), v).is_none() {
                        order.push(key);
                    }
                }
                Op::Remove(k) => {
                    let key = format!("key-{k}");
                    let removed = map.remove(&key);
                    if model.remove(&key).is_some() {
                        prop_assert!(removed.is_ok());
                        order.retain(|existing| existing != &key);
                    } else {
                        prop_assert!(matches!(removed, Err(Error::NotFound(_))));
                    }
                }
            }
        }

        prop_assert_eq!(map.len(), model.len());
        prop_assert_eq!(
            map.keys().collect::<Vec<_>>(),
            order.iter().map(String::as_str).collect::<Vec<_>>()
        );
        for (key, value) in &model {
            prop_assert_eq!(map.get(key).unwrap().as_int().unwrap(), *value);
        }
        prop_assert!(map.len() <= map.capacity());
    }

    #[test]
    fn negative_index_counts_from_end(values in prop::collection::vec(any::<i64>(), 1..50)) {
        let array: DynamicArray = values.iter().map(|v| TaggedValue::int(*v)).collect();
        let size = values.len() as isize;
        for offset in 1..=size {
            prop_assert_eq!(
                array.get(-offset).unwrap().as_int().unwrap(),
                values[(size - offset) as usize]
            );
        }
        let below_start = array.get(-size - 1);
        let past_end = array.get(size);
        prop_assert!(matches!(below_start, Err(Error::OutOfBounds { .. })), "expected OutOfBounds for below_start");
        prop_assert!(matches!(past_end, Err(Error::OutOfBounds { .. })), "expected OutOfBounds for past_end");
    }
}

#[test]
fn test_capacity_schedule() {
    assert_eq!(increment_capacity(0), 131);
    assert_eq!(increment_capacity(131), 263);
    assert_eq!(increment_capacity(263), 397);

    let mut map = AssociativeMap::new();
    let mut seen = vec![];
    for i in 0..400 {
        map.set(&format!("k{i}"), &TaggedValue::uint(i)).unwrap();
        if seen.last() != Some(&map.capacity()) {
            seen.push(map.capacity());
        }
    }
    assert_eq!(seen, vec![131, 263, 397, 541]);
}

#[test]
fn test_value_shared_between_containers() {
    let value = TaggedValue::string("shared");
    let mut map = AssociativeMap::new();
    let mut array = DynamicArray::new();

    map.set("a", &value).unwrap();
    array.append(&value);
    assert_eq!(value.ref_count(), 3);
    assert!(map.get("a").unwrap().ptr_eq(array.get(0).unwrap()));

    map.remove("a").unwrap();
    assert_eq!(value.ref_count(), 2);

    array.clear();
    assert_eq!(value.ref_count(), 1);
}

#[test]
fn test_replaced_value_is_released() {
    let first = TaggedValue::bytes(b"first");
    let mut map = AssociativeMap::new();
    map.set("slot", &first).unwrap();
    assert_eq!(first.ref_count(), 2);

    map.set("slot", &TaggedValue::bytes(b"second")).unwrap();
    assert_eq!(first.ref_count(), 1);
    assert_eq!(map.get("slot").unwrap().as_bytes().unwrap(), b"second");
    assert_eq!(map.len(), 1);
}
