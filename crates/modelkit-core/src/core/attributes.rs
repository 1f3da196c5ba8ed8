use super::error::ModelError;
use super::keys::{AttributeKey, AttributeKind, SlotValue};
use std::fmt;
use std::marker::PhantomData;

/// A dense, key-indexed table holding at most one value per attribute key.
///
/// The backing array is sized to the largest key index inserted so far; slots
/// below that index that were never inserted (or were removed) are absent.
/// Reading or overwriting an absent slot is an error, never a default.
pub struct AttributeTable<K, V> {
    slots: Vec<Option<V>>,
    kind: PhantomData<fn() -> K>,
}

impl<K: AttributeKind, V: SlotValue> AttributeTable<K, V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            kind: PhantomData,
        }
    }

    /// Adds a value for a key that is not yet present.
    pub fn insert(&mut self, key: AttributeKey<K>, value: V) -> Result<(), ModelError> {
        if self.contains(key) {
            return Err(ModelError::AttributeExists {
                kind: K::NAME,
                index: key.raw(),
            });
        }
        value.validate()?;

        let index = key.index();
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(value);
        Ok(())
    }

    /// Replaces the value of a key that is already present.
    pub fn set(&mut self, key: AttributeKey<K>, value: V) -> Result<(), ModelError> {
        value.validate()?;
        let slot = self.slot_mut(key)?;
        *slot = value;
        Ok(())
    }

    pub fn get(&self, key: AttributeKey<K>) -> Result<&V, ModelError> {
        self.slots
            .get(key.index())
            .and_then(Option::as_ref)
            .ok_or(ModelError::AttributeNotFound {
                kind: K::NAME,
                index: key.raw(),
            })
    }

    /// Marks the key absent, returning the value it held.
    pub fn remove(&mut self, key: AttributeKey<K>) -> Option<V> {
        self.slots.get_mut(key.index()).and_then(Option::take)
    }

    pub fn contains(&self, key: AttributeKey<K>) -> bool {
        matches!(self.slots.get(key.index()), Some(Some(_)))
    }

    /// Keys of all present slots, in index order.
    pub fn keys(&self) -> impl Iterator<Item = AttributeKey<K>> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| AttributeKey::from_index(index as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttributeKey<K>, &V)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|value| (AttributeKey::from_index(index as u32), value))
        })
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Length of the backing array, i.e. one past the largest key index ever inserted.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot_mut(&mut self, key: AttributeKey<K>) -> Result<&mut V, ModelError> {
        self.slots
            .get_mut(key.index())
            .and_then(Option::as_mut)
            .ok_or(ModelError::AttributeNotFound {
                kind: K::NAME,
                index: key.raw(),
            })
    }
}

impl<K: AttributeKind, V: SlotValue> Default for AttributeTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V: Clone> Clone for AttributeTable<K, V> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            kind: PhantomData,
        }
    }
}

impl<K: AttributeKind, V: fmt::Debug> fmt::Debug for AttributeTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.slots
                    .iter()
                    .enumerate()
                    .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value))),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::keys::{FloatKind, IntKind, KeyRegistry, StringKind};

    #[test]
    fn insert_then_get_returns_value() {
        let registry = KeyRegistry::new();
        let key = registry.float_key("x");
        let mut table: AttributeTable<FloatKind, f64> = AttributeTable::new();

        table.insert(key, 3.5).unwrap();
        assert_eq!(*table.get(key).unwrap(), 3.5);
        assert!(table.contains(key));
    }

    #[test]
    fn insert_fails_when_key_already_present() {
        let registry = KeyRegistry::new();
        let key = registry.int_key("n");
        let mut table: AttributeTable<IntKind, i64> = AttributeTable::new();

        table.insert(key, 1).unwrap();
        let result = table.insert(key, 2);
        assert!(matches!(result, Err(ModelError::AttributeExists { .. })));
        assert_eq!(*table.get(key).unwrap(), 1);
    }

    #[test]
    fn set_and_get_fail_for_absent_key() {
        let registry = KeyRegistry::new();
        let key = registry.float_key("y");
        let mut table: AttributeTable<FloatKind, f64> = AttributeTable::new();

        assert!(matches!(
            table.get(key),
            Err(ModelError::AttributeNotFound { kind: "float", .. })
        ));
        assert!(matches!(
            table.set(key, 1.0),
            Err(ModelError::AttributeNotFound { .. })
        ));
    }

    #[test]
    fn insertion_beyond_capacity_grows_with_absent_slots() {
        let registry = KeyRegistry::new();
        let keys: Vec<_> = (0..5).map(|i| registry.float_key(&format!("k{i}"))).collect();
        let mut table: AttributeTable<FloatKind, f64> = AttributeTable::new();

        table.insert(keys[4], 1.0).unwrap();
        assert_eq!(table.capacity(), 5);
        assert_eq!(table.len(), 1);
        for key in &keys[..4] {
            assert!(!table.contains(*key));
        }
    }

    #[test]
    fn nan_is_rejected_rather_than_treated_as_removal() {
        let registry = KeyRegistry::new();
        let key = registry.float_key("x");
        let mut table: AttributeTable<FloatKind, f64> = AttributeTable::new();

        assert!(matches!(
            table.insert(key, f64::NAN),
            Err(ModelError::InvalidValue(_))
        ));
        assert!(!table.contains(key));

        table.insert(key, 2.0).unwrap();
        assert!(matches!(
            table.set(key, f64::NAN),
            Err(ModelError::InvalidValue(_))
        ));
        assert!(table.contains(key));
        assert_eq!(*table.get(key).unwrap(), 2.0);
    }

    #[test]
    fn remove_marks_slot_absent_and_allows_reinsert() {
        let registry = KeyRegistry::new();
        let key = registry.string_key("name");
        let mut table: AttributeTable<StringKind, String> = AttributeTable::new();

        table.insert(key, "CA".to_string()).unwrap();
        assert_eq!(table.remove(key).as_deref(), Some("CA"));
        assert!(!table.contains(key));
        assert!(table.remove(key).is_none());

        table.insert(key, "CB".to_string()).unwrap();
        assert_eq!(table.get(key).unwrap(), "CB");
    }

    #[test]
    fn keys_are_reported_in_index_order() {
        let registry = KeyRegistry::new();
        let a = registry.int_key("a");
        let b = registry.int_key("b");
        let c = registry.int_key("c");
        let mut table: AttributeTable<IntKind, i64> = AttributeTable::new();

        table.insert(c, 3).unwrap();
        table.insert(a, 1).unwrap();
        assert_eq!(table.keys().collect::<Vec<_>>(), vec![a, c]);
        assert!(!table.keys().any(|k| k == b));
        assert_eq!(
            table.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }
}
