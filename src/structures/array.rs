//! Ordered, growable sequence of tagged values.

use super::value::TaggedValue;
use crate::types::{Error, Result};

/// Growable array of shared [`TaggedValue`] handles.
///
/// Inserting shares the value, removing or dropping the array releases it.
/// Valid indices are `[0, len)`; a negative index counts back from the end,
/// so `-1` is the last element.
#[derive(Debug, Clone, Default)]
pub struct DynamicArray {
    items: Vec<TaggedValue>,
}

impl DynamicArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Map a possibly negative index onto `[0, len)`.
    fn resolve(&self, index: isize) -> Result<usize> {
        let size = self.items.len();
        let resolved = if index < 0 {
            size as isize + index
        } else {
            index
        };
        if resolved < 0 || resolved as usize >= size {
            return Err(Error::OutOfBounds { index, size });
        }
        Ok(resolved as usize)
    }

    /// Append a shared handle to `value`.
    pub fn append(&mut self, value: &TaggedValue) {
        self.items.push(value.share());
    }

    pub fn get(&self, index: isize) -> Result<&TaggedValue> {
        let i = self.resolve(index)?;
        Ok(&self.items[i])
    }

    /// Replace the element at `index`, releasing the previous one.
    pub fn set(&mut self, index: isize, value: &TaggedValue) -> Result<()> {
        let i = self.resolve(index)?;
        self.items[i] = value.share();
        Ok(())
    }

    /// Index of the first element equal to `value`.
    pub fn find(&self, value: &TaggedValue) -> Option<usize> {
        self.items.iter().position(|item| item == value)
    }

    pub fn contains(&self, value: &TaggedValue) -> bool {
        self.find(value).is_some()
    }

    /// Index of the first element satisfying `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&TaggedValue) -> bool,
    {
        self.items.iter().position(predicate)
    }

    /// Remove the first element equal to `value`, shifting the tail left.
    pub fn remove(&mut self, value: &TaggedValue) -> Result<()> {
        let i = self
            .find(value)
            .ok_or_else(|| Error::not_found(format!("array element {:?}", value)))?;
        self.items.remove(i).release();
        Ok(())
    }

    /// Release every element.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaggedValue> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a DynamicArray {
    type Item = &'a TaggedValue;
    type IntoIter = std::slice::Iter<'a, TaggedValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<TaggedValue> for DynamicArray {
    fn from_iter<I: IntoIterator<Item = TaggedValue>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(n: i64) -> DynamicArray {
        let mut array = DynamicArray::new();
        for i in 0..n {
            array.append(&TaggedValue::int(i * 10));
        }
        array
    }

    #[test]
    fn test_get_returns_appended_values_in_order() {
        let array = ints(5);
        for i in 0..5 {
            assert_eq!(array.get(i as isize).unwrap().as_int().unwrap(), i * 10);
        }
    }

    #[test]
    fn test_get_at_size_is_out_of_bounds() {
        let array = ints(3);
        assert!(matches!(
            array.get(3),
            Err(Error::OutOfBounds { index: 3, size: 3 })
        ));
        assert!(matches!(DynamicArray::new().get(0), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn test_negative_indices_count_from_end() {
        let array = ints(3);
        assert_eq!(array.get(-1).unwrap().as_int().unwrap(), 20);
        assert_eq!(array.get(-3).unwrap().as_int().unwrap(), 0);
        assert!(array.get(-4).is_err());
    }

    #[test]
    fn test_set_replaces_and_releases() {
        let mut array = ints(2);
        let old = array.get(0).unwrap().share();
        assert_eq!(old.ref_count(), 2);
        array.set(0, &TaggedValue::string("new")).unwrap();
        assert_eq!(old.ref_count(), 1);
        assert_eq!(array.get(0).unwrap().as_str().unwrap(), "new");
        assert!(array.set(2, &TaggedValue::none()).is_err());
    }

    #[test]
    fn test_find_contains_filter() {
        let array = ints(4);
        assert_eq!(array.find(&TaggedValue::int(20)), Some(2));
        assert!(array.contains(&TaggedValue::int(30)));
        assert!(!array.contains(&TaggedValue::uint(30)));
        assert_eq!(
            array.filter(|v| v.as_int().map(|i| i > 5).unwrap_or(false)),
            Some(1)
        );
        assert_eq!(array.filter(|v| v.is_none()), None);
    }

    #[test]
    fn test_remove_shifts_left() {
        let mut array = ints(4);
        array.remove(&TaggedValue::int(10)).unwrap();
        assert_eq!(array.len(), 3);
        assert_eq!(array.get(1).unwrap().as_int().unwrap(), 20);
        assert!(matches!(
            array.remove(&TaggedValue::int(10)),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_shared_value_survives_removal_from_one_array() {
        let value = TaggedValue::string("shared");
        let mut a = DynamicArray::new();
        let mut b = DynamicArray::new();
        a.append(&value);
        b.append(&value);
        assert_eq!(value.ref_count(), 3);

        a.remove(&value).unwrap();
        assert_eq!(b.get(0).unwrap().as_str().unwrap(), "shared");
        assert_eq!(value.ref_count(), 2);

        drop(b);
        assert_eq!(value.ref_count(), 1);
    }
}
