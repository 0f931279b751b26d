//! String-keyed open-addressing hash map of tagged values.
//!
//! Buckets are chosen by a per-instance keyed hash (SipHash through
//! [`RandomState`]) folded modulo a prime capacity. Collisions probe linearly
//! with wraparound. Removal leaves a tombstone so later probe chains stay
//! intact; tombstones are purged whenever the table is reindexed.
//!
//! Iteration never looks at bucket layout. A side [`DynamicArray`] records
//! keys in first-insertion order and every iterator walks it with point
//! lookups, so order survives any number of rehashes.

use super::array::DynamicArray;
use super::value::TaggedValue;
use crate::types::{Error, Result};
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;

/// Capacity increment between growth steps.
const CAPACITY_STEP: usize = 128;

#[derive(Debug)]
enum Slot {
    Empty,
    Tombstone,
    Occupied { key: Box<str>, value: TaggedValue },
}

/// Next capacity in the growth sequence: the smallest prime `>= previous + 128`.
///
/// Starting from zero this yields 131, 263, 397, ...
pub fn increment_capacity(previous: usize) -> usize {
    let mut candidate = previous + CAPACITY_STEP;
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

/// Open-addressing map from owned string keys to shared [`TaggedValue`]s.
#[derive(Debug, Default)]
pub struct AssociativeMap {
    slots: Vec<Slot>,
    len: usize,
    tombstones: usize,
    keys: DynamicArray,
    hasher: RandomState,
}

enum Probe {
    Found(usize),
    Vacant(usize),
}

impl AssociativeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn bucket(&self, key: &str) -> usize {
        (self.hasher.hash_one(key) % self.slots.len() as u64) as usize
    }

    fn over_threshold(&self, used: usize) -> bool {
        used * 4 >= self.capacity() * 3
    }

    /// Walk the probe sequence for `key`.
    ///
    /// Returns the slot holding `key`, or the slot an insert should use: the
    /// first tombstone on the path if any, else the terminating empty slot.
    fn probe(&self, key: &str) -> Option<Probe> {
        let capacity = self.capacity();
        if capacity == 0 {
            return None;
        }
        let start = self.bucket(key);
        let mut first_tombstone = None;
        for step in 0..capacity {
            let index = (start + step) % capacity;
            match &self.slots[index] {
                Slot::Empty => return Some(Probe::Vacant(first_tombstone.unwrap_or(index))),
                Slot::Tombstone => {
                    first_tombstone.get_or_insert(index);
                }
                Slot::Occupied { key: existing, .. } if existing.as_ref() == key => {
                    return Some(Probe::Found(index));
                }
                Slot::Occupied { .. } => {}
            }
        }
        first_tombstone.map(Probe::Vacant)
    }

    fn find_slot(&self, key: &str) -> Option<usize> {
        match self.probe(key) {
            Some(Probe::Found(index)) => Some(index),
            _ => None,
        }
    }

    /// Rebuild the table at `capacity`, dropping tombstones.
    ///
    /// The new table is reserved up front, so a failed reservation leaves
    /// the map untouched.
    fn reindex(&mut self, capacity: usize) -> Result<()> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|e| {
            Error::allocation(format!("map table of {} slots: {}", capacity, e))
        })?;
        slots.resize_with(capacity, || Slot::Empty);
        let old = std::mem::replace(&mut self.slots, slots);
        self.tombstones = 0;
        for slot in old {
            if let Slot::Occupied { key, value } = slot {
                let mut index = self.bucket(&key);
                while !matches!(self.slots[index], Slot::Empty) {
                    index = (index + 1) % capacity;
                }
                self.slots[index] = Slot::Occupied { key, value };
            }
        }
        tracing::trace!("map_reindexed: capacity={}, len={}", capacity, self.len);
        Ok(())
    }

    /// Insert or replace `key`.
    ///
    /// Stores a shared handle to `value`; a replaced value is released. `none`
    /// values are rejected.
    pub fn set(&mut self, key: &str, value: &TaggedValue) -> Result<()> {
        if value.is_none() {
            return Err(Error::invalid_argument(format!(
                "cannot store none under key '{}'",
                key
            )));
        }

        if self.capacity() == 0 || self.over_threshold(self.len) {
            self.reindex(increment_capacity(self.capacity()))?;
        } else if self.over_threshold(self.len + self.tombstones) {
            self.reindex(self.capacity())?;
        }

        match self.probe(key) {
            Some(Probe::Found(index)) => {
                if let Slot::Occupied { value: stored, .. } = &mut self.slots[index] {
                    // Previous handle is dropped here.
                    *stored = value.share();
                }
                Ok(())
            }
            Some(Probe::Vacant(index)) => {
                if matches!(self.slots[index], Slot::Tombstone) {
                    self.tombstones -= 1;
                }
                self.slots[index] = Slot::Occupied {
                    key: Box::from(key),
                    value: value.share(),
                };
                self.keys.append(&TaggedValue::string(key));
                self.len += 1;
                Ok(())
            }
            None => Err(Error::internal(format!(
                "no free slot for key '{}' at capacity {}",
                key,
                self.capacity()
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Result<&TaggedValue> {
        self.find_slot(key)
            .and_then(|index| match &self.slots[index] {
                Slot::Occupied { value, .. } => Some(value),
                _ => None,
            })
            .ok_or_else(|| Error::not_found(format!("key '{}'", key)))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.find_slot(key).is_some()
    }

    /// Remove `key`, releasing its value.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        let index = self
            .find_slot(key)
            .ok_or_else(|| Error::not_found(format!("key '{}'", key)))?;
        self.slots[index] = Slot::Tombstone;
        self.tombstones += 1;
        self.len -= 1;
        self.keys.remove(&TaggedValue::string(key))?;
        Ok(())
    }

    /// Keys in first-insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.keys.iter().filter_map(|k| k.as_str().ok())
    }

    /// `(key, value)` pairs in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaggedValue)> + '_ {
        self.keys()
            .filter_map(move |key| self.get(key).ok().map(|value| (key, value)))
    }

    /// Shared handles to every value, in key order.
    pub fn values_cloned(&self) -> Vec<TaggedValue> {
        self.iter().map(|(_, value)| value.share()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_capacity_sequence() {
        assert_eq!(increment_capacity(0), 131);
        assert_eq!(increment_capacity(131), 263);
        assert_eq!(increment_capacity(263), 397);
    }

    #[test]
    fn test_set_get() {
        let mut map = AssociativeMap::new();
        map.set("alpha", &TaggedValue::int(1)).unwrap();
        map.set("beta", &TaggedValue::string("two")).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.capacity(), 131);
        assert_eq!(map.get("alpha").unwrap().as_int().unwrap(), 1);
        assert_eq!(map.get("beta").unwrap().as_str().unwrap(), "two");
        assert!(matches!(map.get("gamma"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_none_value_rejected() {
        let mut map = AssociativeMap::new();
        assert!(matches!(
            map.set("k", &TaggedValue::none()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(map.is_empty());
    }

    #[test]
    fn test_last_write_wins_and_releases_old() {
        let mut map = AssociativeMap::new();
        let v1 = TaggedValue::string("v1");
        let v2 = TaggedValue::string("v2");
        map.set("k", &v1).unwrap();
        assert_eq!(v1.ref_count(), 2);
        map.set("k", &v2).unwrap();
        assert_eq!(v1.ref_count(), 1);
        assert_eq!(v2.ref_count(), 2);
        assert_eq!(map.get("k").unwrap().as_str().unwrap(), "v2");
        assert_eq!(map.len(), 1);
        assert_eq!(map.keys().count(), 1);
    }

    #[test]
    fn test_growth_keeps_every_key() {
        let mut map = AssociativeMap::new();
        // 99 == ceil(131 * 3 / 4): the insert after this triggers growth.
        for i in 0..99 {
            map.set(&format!("key-{i}"), &TaggedValue::int(i)).unwrap();
        }
        assert_eq!(map.capacity(), 131);
        map.set("key-99", &TaggedValue::int(99)).unwrap();
        assert_eq!(map.capacity(), 263);
        for i in 0..100 {
            assert_eq!(map.get(&format!("key-{i}")).unwrap().as_int().unwrap(), i);
        }
    }

    #[test]
    fn test_remove_is_probe_aware() {
        let mut map = AssociativeMap::new();
        for i in 0..90 {
            map.set(&format!("k{i}"), &TaggedValue::int(i)).unwrap();
        }
        for i in (0..90).step_by(2) {
            map.remove(&format!("k{i}")).unwrap();
        }
        assert_eq!(map.len(), 45);
        for i in 0..90 {
            let key = format!("k{i}");
            if i % 2 == 0 {
                assert!(!map.contains_key(&key));
            } else {
                assert_eq!(map.get(&key).unwrap().as_int().unwrap(), i);
            }
        }
        assert!(matches!(map.remove("k0"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_reinsert_after_remove_moves_to_end() {
        let mut map = AssociativeMap::new();
        for key in ["a", "b", "c"] {
            map.set(key, &TaggedValue::bool(true)).unwrap();
        }
        map.remove("a").unwrap();
        map.set("a", &TaggedValue::bool(false)).unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_tombstone_churn_does_not_fill_table() {
        let mut map = AssociativeMap::new();
        for i in 0..1000 {
            let key = format!("churn-{i}");
            map.set(&key, &TaggedValue::int(i)).unwrap();
            map.remove(&key).unwrap();
        }
        assert!(map.is_empty());
        assert_eq!(map.capacity(), 131);
    }

    #[test]
    fn test_value_shared_with_two_maps() {
        let value = TaggedValue::bytes(b"payload");
        let mut a = AssociativeMap::new();
        let mut b = AssociativeMap::new();
        a.set("x", &value).unwrap();
        b.set("y", &value).unwrap();
        a.remove("x").unwrap();
        assert_eq!(b.get("y").unwrap().as_bytes().unwrap(), b"payload");
        b.remove("y").unwrap();
        assert_eq!(value.ref_count(), 1);
    }

    proptest! {
        #[test]
        fn prop_iteration_follows_first_insertion(
            keys in proptest::collection::vec("[a-z]{1,8}", 1..400)
        ) {
            let mut map = AssociativeMap::new();
            let mut expected: Vec<String> = Vec::new();
            for (i, key) in keys.iter().enumerate() {
                map.set(key, &TaggedValue::int(i as i64)).unwrap();
                if !expected.contains(key) {
                    expected.push(key.clone());
                }
            }
            let actual: Vec<&str> = map.keys().collect();
            prop_assert_eq!(actual, expected.iter().map(String::as_str).collect::<Vec<_>>());
            prop_assert_eq!(map.iter().count(), map.len());
        }
    }
}
