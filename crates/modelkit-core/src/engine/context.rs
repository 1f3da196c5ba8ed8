use super::arena::OrderedArena;
use super::traits::ScoreState;
use crate::core::derivatives::DerivativeAccumulator;
use crate::core::error::ModelError;
use crate::core::ids::{ParticleId, ScoreStateId};
use crate::core::keys::FloatKey;
use crate::core::particle::ParticleRef;
use crate::core::store::ParticleStore;

pub(crate) type ScoreStates = OrderedArena<ScoreStateId, Box<dyn ScoreState>>;

pub(crate) fn downcast_state<T: ScoreState>(
    states: &ScoreStates,
    id: ScoreStateId,
) -> Result<&T, ModelError> {
    states
        .get(id)
        .ok_or(ModelError::ScoreStateNotFound(id))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or(ModelError::ScoreStateType {
            id,
            expected: std::any::type_name::<T>(),
        })
}

pub(crate) fn downcast_state_mut<T: ScoreState>(
    states: &mut ScoreStates,
    id: ScoreStateId,
) -> Result<&mut T, ModelError> {
    states
        .get_mut(id)
        .ok_or(ModelError::ScoreStateNotFound(id))?
        .as_any_mut()
        .downcast_mut::<T>()
        .ok_or(ModelError::ScoreStateType {
            id,
            expected: std::any::type_name::<T>(),
        })
}

/// What a restraint may see of the model while it is being scored.
///
/// Attribute values and score states are read-only. The only write allowed is
/// adding to a derivative through a [`DerivativeAccumulator`].
pub struct ScoringContext<'a> {
    particles: &'a mut ParticleStore,
    score_states: &'a ScoreStates,
}

impl<'a> ScoringContext<'a> {
    pub(crate) fn new(particles: &'a mut ParticleStore, score_states: &'a ScoreStates) -> Self {
        Self {
            particles,
            score_states,
        }
    }

    pub fn particles(&self) -> &ParticleStore {
        &*self.particles
    }

    pub fn particle(&self, id: ParticleId) -> Result<ParticleRef<'_>, ModelError> {
        self.particles.get(id)
    }

    pub fn add_to_derivative(
        &mut self,
        id: ParticleId,
        key: FloatKey,
        value: f64,
        accumulator: &DerivativeAccumulator,
    ) -> Result<(), ModelError> {
        self.particles.add_to_derivative(id, key, value, accumulator)
    }

    /// Looks up a registered score state by id, e.g. a neighbor list to iterate.
    pub fn score_state<T: ScoreState>(&self, id: ScoreStateId) -> Result<&'a T, ModelError> {
        downcast_state(self.score_states, id)
    }
}

/// Write access granted to after-evaluate hooks.
///
/// Particles can be read and derivatives pushed back onto them. Attribute
/// values stay read-only.
pub struct DerivativeWriter<'a> {
    particles: &'a mut ParticleStore,
}

impl<'a> DerivativeWriter<'a> {
    pub(crate) fn new(particles: &'a mut ParticleStore) -> Self {
        Self { particles }
    }

    pub fn particles(&self) -> &ParticleStore {
        &*self.particles
    }

    pub fn particle(&self, id: ParticleId) -> Result<ParticleRef<'_>, ModelError> {
        self.particles.get(id)
    }

    pub fn add_to_derivative(
        &mut self,
        id: ParticleId,
        key: FloatKey,
        value: f64,
        accumulator: &DerivativeAccumulator,
    ) -> Result<(), ModelError> {
        self.particles.add_to_derivative(id, key, value, accumulator)
    }
}
