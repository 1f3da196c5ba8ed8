use super::context::ScoringContext;
use super::traits::Restraint;
use crate::core::derivatives::DerivativeAccumulator;
use crate::core::error::ModelError;
use tracing::trace;

/// A weighted group of restraints evaluated as one.
///
/// The set's score is its weight times the sum of its members' scores, and
/// members receive an accumulator scaled by the same weight, so nested sets
/// multiply their weights down the tree.
pub struct RestraintSet {
    name: String,
    weight: f64,
    restraints: Vec<Box<dyn Restraint>>,
}

impl RestraintSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            weight: 1.0,
            restraints: Vec::new(),
        }
    }

    pub fn with_weight(name: &str, weight: f64) -> Result<Self, ModelError> {
        let mut set = Self::new(name);
        set.set_weight(weight)?;
        Ok(set)
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) -> Result<(), ModelError> {
        if weight.is_nan() {
            return Err(ModelError::InvalidValue(format!(
                "restraint set '{}' cannot have a NaN weight",
                self.name
            )));
        }
        self.weight = weight;
        Ok(())
    }

    pub fn add_restraint<R: Restraint + 'static>(&mut self, restraint: R) {
        self.restraints.push(Box::new(restraint));
    }

    pub fn len(&self) -> usize {
        self.restraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.restraints.is_empty()
    }
}

impl Restraint for RestraintSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &mut self,
        context: &mut ScoringContext<'_>,
        accumulator: Option<&DerivativeAccumulator>,
    ) -> Result<f64, ModelError> {
        let nested = accumulator
            .map(|da| da.nested(self.weight))
            .transpose()?;

        let mut sum = 0.0;
        for restraint in &mut self.restraints {
            let score = restraint.evaluate(context, nested.as_ref())?;
            trace!(set = %self.name, restraint = restraint.name(), score, "Evaluated member");
            sum += score;
        }
        Ok(sum * self.weight)
    }
}
