use super::attributes::AttributeTable;
use super::data::{DataHandle, ModelData};
use super::error::ModelError;
use super::particle::Particle;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

mod private {
    pub trait Sealed {}
}

/// A value that may be stored in an attribute slot.
///
/// Absence is represented explicitly by the tables, so no value is reserved as a
/// sentinel. Floats still refuse NaN: a NaN coordinate would poison every score
/// computed from it, and the attribute contract treats it as "not a real value".
pub trait SlotValue {
    fn validate(&self) -> Result<(), ModelError> {
        Ok(())
    }
}

impl SlotValue for f64 {
    fn validate(&self) -> Result<(), ModelError> {
        if self.is_nan() {
            return Err(ModelError::InvalidValue(
                "NaN cannot be stored as a float attribute".to_string(),
            ));
        }
        Ok(())
    }
}

impl SlotValue for i64 {}

impl SlotValue for String {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Float,
    Int,
    String,
}

/// Compile-time marker for one family of attributes (float, int or string).
///
/// The trait is sealed; the hidden hooks wire a kind to its column in
/// [`ModelData`] and to its handle table on a [`Particle`].
pub trait AttributeKind: private::Sealed + Sized + 'static {
    type Value: SlotValue + Clone + PartialEq + fmt::Debug;
    const KIND: ValueKind;
    const NAME: &'static str;

    #[doc(hidden)]
    fn values(data: &ModelData) -> &[Self::Value];
    #[doc(hidden)]
    fn values_mut(data: &mut ModelData) -> &mut [Self::Value];
    #[doc(hidden)]
    fn append(data: &mut ModelData, value: Self::Value) -> usize;
    #[doc(hidden)]
    fn handles(particle: &Particle) -> &AttributeTable<Self, DataHandle<Self>>;
    #[doc(hidden)]
    fn handles_mut(particle: &mut Particle) -> &mut AttributeTable<Self, DataHandle<Self>>;
}

#[derive(Debug)]
pub enum FloatKind {}
#[derive(Debug)]
pub enum IntKind {}
#[derive(Debug)]
pub enum StringKind {}

impl private::Sealed for FloatKind {}
impl private::Sealed for IntKind {}
impl private::Sealed for StringKind {}

impl AttributeKind for FloatKind {
    type Value = f64;
    const KIND: ValueKind = ValueKind::Float;
    const NAME: &'static str = "float";

    fn values(data: &ModelData) -> &[f64] {
        &data.float_values
    }
    fn values_mut(data: &mut ModelData) -> &mut [f64] {
        &mut data.float_values
    }
    fn append(data: &mut ModelData, value: f64) -> usize {
        data.float_values.push(value);
        data.float_derivatives.push(0.0);
        data.float_optimized.push(false);
        data.float_values.len() - 1
    }
    fn handles(particle: &Particle) -> &AttributeTable<Self, DataHandle<Self>> {
        &particle.floats
    }
    fn handles_mut(particle: &mut Particle) -> &mut AttributeTable<Self, DataHandle<Self>> {
        &mut particle.floats
    }
}

impl AttributeKind for IntKind {
    type Value = i64;
    const KIND: ValueKind = ValueKind::Int;
    const NAME: &'static str = "int";

    fn values(data: &ModelData) -> &[i64] {
        &data.int_values
    }
    fn values_mut(data: &mut ModelData) -> &mut [i64] {
        &mut data.int_values
    }
    fn append(data: &mut ModelData, value: i64) -> usize {
        data.int_values.push(value);
        data.int_values.len() - 1
    }
    fn handles(particle: &Particle) -> &AttributeTable<Self, DataHandle<Self>> {
        &particle.ints
    }
    fn handles_mut(particle: &mut Particle) -> &mut AttributeTable<Self, DataHandle<Self>> {
        &mut particle.ints
    }
}

impl AttributeKind for StringKind {
    type Value = String;
    const KIND: ValueKind = ValueKind::String;
    const NAME: &'static str = "string";

    fn values(data: &ModelData) -> &[String] {
        &data.string_values
    }
    fn values_mut(data: &mut ModelData) -> &mut [String] {
        &mut data.string_values
    }
    fn append(data: &mut ModelData, value: String) -> usize {
        data.string_values.push(value);
        data.string_values.len() - 1
    }
    fn handles(particle: &Particle) -> &AttributeTable<Self, DataHandle<Self>> {
        &particle.strings
    }
    fn handles_mut(particle: &mut Particle) -> &mut AttributeTable<Self, DataHandle<Self>> {
        &mut particle.strings
    }
}

/// An interned attribute name of kind `K`.
///
/// Keys compare by index only. Two keys interned from the same name in the same
/// registry are equal for the lifetime of that registry.
pub struct AttributeKey<K> {
    index: u32,
    kind: PhantomData<fn() -> K>,
}

pub type FloatKey = AttributeKey<FloatKind>;
pub type IntKey = AttributeKey<IntKind>;
pub type StringKey = AttributeKey<StringKind>;

impl<K> AttributeKey<K> {
    pub(crate) fn from_index(index: u32) -> Self {
        Self {
            index,
            kind: PhantomData,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    pub(crate) fn raw(self) -> u32 {
        self.index
    }
}

impl<K> Clone for AttributeKey<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for AttributeKey<K> {}

impl<K> PartialEq for AttributeKey<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<K> Eq for AttributeKey<K> {}

impl<K> PartialOrd for AttributeKey<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for AttributeKey<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<K> Hash for AttributeKey<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<K: AttributeKind> fmt::Debug for AttributeKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttributeKey<{}>({})", K::NAME, self.index)
    }
}

#[derive(Debug, Default)]
struct Interner {
    indices: HashMap<String, u32>,
    names: Vec<String>,
}

/// Interns attribute names to dense per-kind indices.
///
/// The registry is constructed explicitly and shared by `Arc` with every model
/// that uses it. It is append-only: indices grow monotonically and are never
/// reused, so a key stays valid for as long as the registry exists.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    floats: RwLock<Interner>,
    ints: RwLock<Interner>,
    strings: RwLock<Interner>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the key for `name`, interning it on first use.
    pub fn key<K: AttributeKind>(&self, name: &str) -> AttributeKey<K> {
        let interner = self.interner(K::KIND);
        if let Some(&index) = read(interner).indices.get(name) {
            return AttributeKey::from_index(index);
        }

        let mut guard = write(interner);
        // Another handle may have interned the name between the two locks.
        if let Some(&index) = guard.indices.get(name) {
            return AttributeKey::from_index(index);
        }
        let index = guard.names.len() as u32;
        guard.names.push(name.to_string());
        guard.indices.insert(name.to_string(), index);
        AttributeKey::from_index(index)
    }

    pub fn float_key(&self, name: &str) -> FloatKey {
        self.key(name)
    }

    pub fn int_key(&self, name: &str) -> IntKey {
        self.key(name)
    }

    pub fn string_key(&self, name: &str) -> StringKey {
        self.key(name)
    }

    /// Looks a name up without interning it.
    pub fn find<K: AttributeKind>(&self, name: &str) -> Option<AttributeKey<K>> {
        read(self.interner(K::KIND))
            .indices
            .get(name)
            .map(|&index| AttributeKey::from_index(index))
    }

    pub fn name<K: AttributeKind>(&self, key: AttributeKey<K>) -> Option<String> {
        read(self.interner(K::KIND))
            .names
            .get(key.index())
            .cloned()
    }

    pub fn key_count<K: AttributeKind>(&self) -> usize {
        read(self.interner(K::KIND)).names.len()
    }

    fn interner(&self, kind: ValueKind) -> &RwLock<Interner> {
        match kind {
            ValueKind::Float => &self.floats,
            ValueKind::Int => &self.ints,
            ValueKind::String => &self.strings,
        }
    }
}

fn read(lock: &RwLock<Interner>) -> RwLockReadGuard<'_, Interner> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(lock: &RwLock<Interner>) -> RwLockWriteGuard<'_, Interner> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_name_twice_returns_equal_keys() {
        let registry = KeyRegistry::new();
        let first = registry.float_key("x");
        let second = registry.float_key("x");
        assert_eq!(first, second);
        assert_eq!(registry.key_count::<FloatKind>(), 1);
    }

    #[test]
    fn different_names_yield_different_keys() {
        let registry = KeyRegistry::new();
        let x = registry.float_key("x");
        let y = registry.float_key("y");
        assert_ne!(x, y);
        assert!(x < y);
    }

    #[test]
    fn indices_are_assigned_monotonically_per_kind() {
        let registry = KeyRegistry::new();
        let names = ["a", "b", "c", "d"];
        let indices: Vec<usize> = names
            .iter()
            .map(|name| registry.int_key(name).index())
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn kinds_have_independent_index_spaces() {
        let registry = KeyRegistry::new();
        let f = registry.float_key("charge");
        let i = registry.int_key("charge");
        let s = registry.string_key("charge");
        assert_eq!(f.index(), 0);
        assert_eq!(i.index(), 0);
        assert_eq!(s.index(), 0);
        assert_eq!(registry.key_count::<FloatKind>(), 1);
        assert_eq!(registry.key_count::<IntKind>(), 1);
    }

    #[test]
    fn two_handles_agree_regardless_of_interning_order() {
        let registry = KeyRegistry::shared();
        let module_a = Arc::clone(&registry);
        let module_b = Arc::clone(&registry);

        let a_radius = module_a.float_key("radius");
        let a_mass = module_a.float_key("mass");
        let b_mass = module_b.float_key("mass");
        let b_radius = module_b.float_key("radius");

        assert_eq!(a_radius, b_radius);
        assert_eq!(a_mass, b_mass);
        assert_ne!(a_radius, b_mass);
    }

    #[test]
    fn find_does_not_intern_unknown_names() {
        let registry = KeyRegistry::new();
        assert!(registry.find::<FloatKind>("missing").is_none());
        assert_eq!(registry.key_count::<FloatKind>(), 0);

        let key = registry.float_key("present");
        assert_eq!(registry.find::<FloatKind>("present"), Some(key));
    }

    #[test]
    fn name_resolves_key_back_to_its_string() {
        let registry = KeyRegistry::new();
        let key = registry.string_key("element");
        assert_eq!(registry.name(key).as_deref(), Some("element"));
        assert!(registry.name(StringKey::from_index(42)).is_none());
    }

    #[test]
    fn nan_is_rejected_as_float_slot_value() {
        assert!(f64::NAN.validate().is_err());
        assert!(1.5f64.validate().is_ok());
        assert!(f64::INFINITY.validate().is_ok());
    }

    #[test]
    fn debug_format_names_the_kind() {
        let registry = KeyRegistry::new();
        let key = registry.float_key("x");
        assert_eq!(format!("{:?}", key), "AttributeKey<float>(0)");
    }
}
