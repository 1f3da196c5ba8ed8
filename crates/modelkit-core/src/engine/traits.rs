use super::context::{DerivativeWriter, ScoringContext};
use crate::core::derivatives::DerivativeAccumulator;
use crate::core::error::ModelError;
use crate::core::ids::ParticleId;
use crate::core::store::ParticleStore;
use std::any::Any;

/// A hook run once per evaluation step, before any restraint is scored.
///
/// Score states derive auxiliary data (neighbor lists, covering spheres, ...)
/// from the current attribute values. They run in registration order, so a
/// state may consume what an earlier one produced in the same step.
pub trait ScoreState: Any {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn update(&mut self, particles: &ParticleStore) -> Result<(), ModelError>;

    /// Runs after every restraint has been scored, newest state first.
    ///
    /// `accumulator` is `Some` only when derivatives are being computed. A state
    /// that derives values from particle attributes uses it to push the
    /// derivatives collected on those values back onto the particles.
    fn after_evaluate(
        &mut self,
        _derivatives: &mut DerivativeWriter<'_>,
        _accumulator: Option<&DerivativeAccumulator>,
    ) -> Result<(), ModelError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A scoring term contributing to the total score of a model.
///
/// When `accumulator` is `Some`, the restraint must also push the derivative of
/// its score with respect to every attribute it reads through the accumulator.
pub trait Restraint {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn evaluate(
        &mut self,
        context: &mut ScoringContext<'_>,
        accumulator: Option<&DerivativeAccumulator>,
    ) -> Result<f64, ModelError>;
}

/// Exclusion predicate for pairs that must never be treated as nonbonded.
pub trait BondedList {
    /// Refreshes any state derived from particle attributes.
    ///
    /// Returns `true` when the set of bonded pairs changed, which forces every
    /// nonbonded list the predicate is attached to to rebuild.
    fn update(&mut self, _particles: &ParticleStore) -> Result<bool, ModelError> {
        Ok(false)
    }

    fn are_bonded(&self, a: ParticleId, b: ParticleId) -> bool;
}
