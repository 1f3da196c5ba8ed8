use super::derivatives::DerivativeAccumulator;
use super::error::ModelError;
use super::keys::{AttributeKind, FloatKind, IntKind, SlotValue, StringKind};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Opaque address of one value of kind `K` in [`ModelData`].
///
/// Handles are never reused or renumbered, so a handle stays valid for the
/// lifetime of the data store that issued it.
pub struct DataHandle<K> {
    index: u32,
    kind: PhantomData<fn() -> K>,
}

pub type FloatHandle = DataHandle<FloatKind>;
pub type IntHandle = DataHandle<IntKind>;
pub type StringHandle = DataHandle<StringKind>;

impl<K> DataHandle<K> {
    fn from_index(index: usize) -> Self {
        Self {
            index: index as u32,
            kind: PhantomData,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl<K> Clone for DataHandle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for DataHandle<K> {}

impl<K> PartialEq for DataHandle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<K> Eq for DataHandle<K> {}

impl<K> PartialOrd for DataHandle<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for DataHandle<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<K> Hash for DataHandle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<K: AttributeKind> fmt::Debug for DataHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataHandle<{}>({})", K::NAME, self.index)
    }
}

impl<K> SlotValue for DataHandle<K> {}

/// Model-wide backing store for every attribute value.
///
/// One dense column per kind; float values additionally carry a derivative
/// accumulator and an "is optimized" flag at the same index.
#[derive(Debug, Clone, Default)]
pub struct ModelData {
    pub(crate) float_values: Vec<f64>,
    pub(crate) float_derivatives: Vec<f64>,
    pub(crate) float_optimized: Vec<bool>,
    pub(crate) int_values: Vec<i64>,
    pub(crate) string_values: Vec<String>,
}

impl ModelData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<K: AttributeKind>(
        &mut self,
        value: K::Value,
    ) -> Result<DataHandle<K>, ModelError> {
        value.validate()?;
        Ok(DataHandle::from_index(K::append(self, value)))
    }

    pub fn add_float(&mut self, value: f64, optimized: bool) -> Result<FloatHandle, ModelError> {
        let handle = self.add::<FloatKind>(value)?;
        self.float_optimized[handle.index()] = optimized;
        Ok(handle)
    }

    pub fn get<K: AttributeKind>(&self, handle: DataHandle<K>) -> Result<&K::Value, ModelError> {
        K::values(self)
            .get(handle.index())
            .ok_or_else(|| out_of_range(handle))
    }

    pub fn set<K: AttributeKind>(
        &mut self,
        handle: DataHandle<K>,
        value: K::Value,
    ) -> Result<(), ModelError> {
        value.validate()?;
        let slot = K::values_mut(self)
            .get_mut(handle.index())
            .ok_or_else(|| out_of_range(handle))?;
        *slot = value;
        Ok(())
    }

    pub fn derivative(&self, handle: FloatHandle) -> Result<f64, ModelError> {
        self.float_derivatives
            .get(handle.index())
            .copied()
            .ok_or_else(|| out_of_range(handle))
    }

    /// Adds `value`, scaled by the accumulator's weight, to the derivative slot.
    pub fn add_to_derivative(
        &mut self,
        handle: FloatHandle,
        value: f64,
        accumulator: &DerivativeAccumulator,
    ) -> Result<(), ModelError> {
        let scaled = accumulator.apply(value)?;
        let slot = self
            .float_derivatives
            .get_mut(handle.index())
            .ok_or_else(|| out_of_range(handle))?;
        *slot += scaled;
        Ok(())
    }

    pub fn is_optimized(&self, handle: FloatHandle) -> Result<bool, ModelError> {
        self.float_optimized
            .get(handle.index())
            .copied()
            .ok_or_else(|| out_of_range(handle))
    }

    pub fn set_is_optimized(
        &mut self,
        handle: FloatHandle,
        optimized: bool,
    ) -> Result<(), ModelError> {
        let slot = self
            .float_optimized
            .get_mut(handle.index())
            .ok_or_else(|| out_of_range(handle))?;
        *slot = optimized;
        Ok(())
    }

    pub fn zero_all_derivatives(&mut self) {
        self.float_derivatives.fill(0.0);
    }

    /// Handles of float values flagged as optimized, in storage order.
    pub fn optimized_float_handles(&self) -> impl Iterator<Item = FloatHandle> + '_ {
        self.float_optimized
            .iter()
            .enumerate()
            .filter(|(_, optimized)| **optimized)
            .map(|(index, _)| DataHandle::from_index(index))
    }

    pub fn len<K: AttributeKind>(&self) -> usize {
        K::values(self).len()
    }
}

fn out_of_range<K: AttributeKind>(handle: DataHandle<K>) -> ModelError {
    ModelError::HandleOutOfRange {
        kind: K::NAME,
        index: handle.index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_values_are_readable_through_their_handles() {
        let mut data = ModelData::new();
        let f = data.add_float(1.25, false).unwrap();
        let i = data.add::<IntKind>(7).unwrap();
        let s = data.add::<StringKind>("C".to_string()).unwrap();

        assert_eq!(*data.get(f).unwrap(), 1.25);
        assert_eq!(*data.get(i).unwrap(), 7);
        assert_eq!(data.get(s).unwrap(), "C");
        assert_eq!(data.derivative(f).unwrap(), 0.0);
    }

    #[test]
    fn handles_are_never_reused() {
        let mut data = ModelData::new();
        let first = data.add_float(0.0, false).unwrap();
        let second = data.add_float(0.0, false).unwrap();
        assert_ne!(first, second);
        assert_eq!(data.len::<FloatKind>(), 2);
    }

    #[test]
    fn set_rejects_nan_and_keeps_previous_value() {
        let mut data = ModelData::new();
        let handle = data.add_float(4.0, true).unwrap();
        assert!(matches!(
            data.set(handle, f64::NAN),
            Err(ModelError::InvalidValue(_))
        ));
        assert_eq!(*data.get(handle).unwrap(), 4.0);
        assert!(data.add_float(f64::NAN, true).is_err());
    }

    #[test]
    fn foreign_handle_is_reported_out_of_range() {
        let mut big = ModelData::new();
        for _ in 0..3 {
            big.add_float(0.0, false).unwrap();
        }
        let foreign = big.add_float(0.0, false).unwrap();

        let small = ModelData::new();
        assert!(matches!(
            small.get(foreign),
            Err(ModelError::HandleOutOfRange { kind: "float", index: 3 })
        ));
        assert!(small.derivative(foreign).is_err());
    }

    #[test]
    fn derivatives_accumulate_scaled_and_zero_out() {
        let mut data = ModelData::new();
        let handle = data.add_float(0.0, true).unwrap();
        let da = DerivativeAccumulator::new(2.0).unwrap();

        data.add_to_derivative(handle, 1.5, &da).unwrap();
        data.add_to_derivative(handle, 0.5, &da).unwrap();
        assert_eq!(data.derivative(handle).unwrap(), 4.0);

        data.zero_all_derivatives();
        assert_eq!(data.derivative(handle).unwrap(), 0.0);
    }

    #[test]
    fn nan_derivative_contribution_is_rejected() {
        let mut data = ModelData::new();
        let handle = data.add_float(0.0, true).unwrap();
        let da = DerivativeAccumulator::default();
        assert!(data.add_to_derivative(handle, f64::NAN, &da).is_err());
        assert_eq!(data.derivative(handle).unwrap(), 0.0);
    }

    #[test]
    fn optimized_iterator_skips_fixed_values() {
        let mut data = ModelData::new();
        let a = data.add_float(0.0, true).unwrap();
        let _b = data.add_float(0.0, false).unwrap();
        let c = data.add_float(0.0, true).unwrap();

        assert_eq!(data.optimized_float_handles().collect::<Vec<_>>(), vec![a, c]);

        data.set_is_optimized(c, false).unwrap();
        assert_eq!(data.optimized_float_handles().collect::<Vec<_>>(), vec![a]);
        assert!(!data.is_optimized(c).unwrap());
    }
}
