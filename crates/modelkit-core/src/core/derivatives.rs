use super::error::ModelError;

/// Scales derivative contributions on their way into [`ModelData`](super::data::ModelData).
///
/// Restraints never write derivatives directly; they pass raw values through an
/// accumulator, which multiplies them by the product of the weights of every
/// enclosing restraint set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivativeAccumulator {
    weight: f64,
}

impl Default for DerivativeAccumulator {
    fn default() -> Self {
        Self { weight: 1.0 }
    }
}

impl DerivativeAccumulator {
    pub fn new(weight: f64) -> Result<Self, ModelError> {
        if weight.is_nan() {
            return Err(ModelError::InvalidValue(
                "derivative weight cannot be NaN".to_string(),
            ));
        }
        Ok(Self { weight })
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn apply(&self, value: f64) -> Result<f64, ModelError> {
        if value.is_nan() {
            return Err(ModelError::InvalidValue(
                "cannot accumulate a NaN derivative".to_string(),
            ));
        }
        Ok(value * self.weight)
    }

    /// Accumulator for a nested level that scales by an additional `weight`.
    pub fn nested(&self, weight: f64) -> Result<Self, ModelError> {
        Self::new(self.weight * weight)
    }

    pub fn compose(&self, inner: &DerivativeAccumulator) -> Self {
        Self {
            weight: self.weight * inner.weight,
        }
    }
}
