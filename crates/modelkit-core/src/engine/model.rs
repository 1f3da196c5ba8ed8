use super::arena::OrderedArena;
use super::context::{
    DerivativeWriter, ScoreStates, ScoringContext, downcast_state, downcast_state_mut,
};
use super::traits::{Restraint, ScoreState};
use crate::core::data::{FloatHandle, ModelData};
use crate::core::derivatives::DerivativeAccumulator;
use crate::core::error::ModelError;
use crate::core::ids::{ParticleId, RestraintId, ScoreStateId};
use crate::core::keys::KeyRegistry;
use crate::core::particle::{ParticleMut, ParticleRef};
use crate::core::store::ParticleStore;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

struct RestraintEntry {
    restraint: Box<dyn Restraint>,
    active: bool,
}

/// Owns the particles, score states and restraints of one system and runs
/// the per-step evaluation over them.
///
/// Score states and restraints are referenced by id; removing one from the
/// model destroys it. When the model itself is dropped, restraints and then
/// score states are destroyed newest first.
pub struct Model {
    particles: ParticleStore,
    score_states: ScoreStates,
    restraints: OrderedArena<RestraintId, RestraintEntry>,
    evaluations: u64,
}

impl Model {
    pub fn new(registry: Arc<KeyRegistry>) -> Self {
        debug!("Creating empty model");
        Self {
            particles: ParticleStore::new(registry),
            score_states: OrderedArena::new(),
            restraints: OrderedArena::new(),
            evaluations: 0,
        }
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        self.particles.registry()
    }

    // --- Particles ---

    pub fn add_particle(&mut self) -> ParticleId {
        self.particles.add_particle()
    }

    pub fn particle(&self, id: ParticleId) -> Result<ParticleRef<'_>, ModelError> {
        self.particles.get(id)
    }

    pub fn particle_mut(&mut self, id: ParticleId) -> Result<ParticleMut<'_>, ModelError> {
        self.particles.get_mut(id)
    }

    pub fn particles(&self) -> &ParticleStore {
        &self.particles
    }

    pub fn particle_ids(&self) -> impl Iterator<Item = ParticleId> + '_ {
        self.particles.ids()
    }

    pub fn number_of_particles(&self) -> usize {
        self.particles.len()
    }

    // --- Score states ---

    pub fn add_score_state<S: ScoreState>(&mut self, state: S) -> ScoreStateId {
        let id = self.score_states.insert(Box::new(state));
        debug!(?id, "Registered score state");
        id
    }

    pub fn remove_score_state(&mut self, id: ScoreStateId) -> Result<(), ModelError> {
        self.score_states
            .remove(id)
            .map(drop)
            .ok_or(ModelError::ScoreStateNotFound(id))
    }

    pub fn score_state<T: ScoreState>(&self, id: ScoreStateId) -> Result<&T, ModelError> {
        downcast_state(&self.score_states, id)
    }

    pub fn score_state_mut<T: ScoreState>(
        &mut self,
        id: ScoreStateId,
    ) -> Result<&mut T, ModelError> {
        downcast_state_mut(&mut self.score_states, id)
    }

    pub fn number_of_score_states(&self) -> usize {
        self.score_states.len()
    }

    // --- Restraints ---

    pub fn add_restraint<R: Restraint + 'static>(&mut self, restraint: R) -> RestraintId {
        let id = self.restraints.insert(RestraintEntry {
            restraint: Box::new(restraint),
            active: true,
        });
        debug!(?id, "Registered restraint");
        id
    }

    pub fn remove_restraint(&mut self, id: RestraintId) -> Result<(), ModelError> {
        self.restraints
            .remove(id)
            .map(drop)
            .ok_or(ModelError::RestraintNotFound(id))
    }

    pub fn set_restraint_is_active(
        &mut self,
        id: RestraintId,
        active: bool,
    ) -> Result<(), ModelError> {
        let entry = self
            .restraints
            .get_mut(id)
            .ok_or(ModelError::RestraintNotFound(id))?;
        entry.active = active;
        Ok(())
    }

    pub fn restraint_is_active(&self, id: RestraintId) -> Result<bool, ModelError> {
        self.restraints
            .get(id)
            .map(|entry| entry.active)
            .ok_or(ModelError::RestraintNotFound(id))
    }

    pub fn number_of_restraints(&self) -> usize {
        self.restraints.len()
    }

    // --- Evaluation ---

    /// Runs every score state's update hook in registration order.
    pub fn update_score_states(&mut self) -> Result<(), ModelError> {
        let Self {
            particles,
            score_states,
            ..
        } = self;
        score_states.try_for_each_mut(|id, state| {
            trace!(?id, state = state.name(), "Updating score state");
            state.update(particles)
        })
    }

    /// Computes the total score of the model.
    ///
    /// Derivatives are zeroed and recomputed only when `compute_derivatives` is
    /// set. Score states are updated in registration order, active restraints
    /// are scored, and then every score state's after-evaluate hook runs newest
    /// first. Any error aborts the evaluation; the score and derivatives of a
    /// failed evaluation must be discarded.
    #[instrument(skip_all, fields(compute_derivatives = compute_derivatives, step = self.evaluations))]
    pub fn evaluate(&mut self, compute_derivatives: bool) -> Result<f64, ModelError> {
        self.evaluations += 1;
        if compute_derivatives {
            self.particles.data_mut().zero_all_derivatives();
        }

        self.update_score_states()?;

        let root = DerivativeAccumulator::default();
        let accumulator = compute_derivatives.then_some(&root);

        let Self {
            particles,
            score_states,
            restraints,
            ..
        } = self;
        let mut context = ScoringContext::new(&mut *particles, &*score_states);
        let mut total = 0.0;
        restraints.try_for_each_mut(|id, entry| -> Result<(), ModelError> {
            if !entry.active {
                trace!(?id, "Skipping inactive restraint");
                return Ok(());
            }
            let score = entry.restraint.evaluate(&mut context, accumulator)?;
            trace!(?id, restraint = entry.restraint.name(), score, "Evaluated restraint");
            total += score;
            Ok(())
        })?;

        score_states.try_for_each_mut_rev(|id, state| {
            trace!(?id, state = state.name(), "Running after-evaluate hook");
            let mut writer = DerivativeWriter::new(&mut *particles);
            state.after_evaluate(&mut writer, accumulator)
        })?;

        debug!(total, "Evaluation finished");
        Ok(total)
    }

    pub fn evaluation_count(&self) -> u64 {
        self.evaluations
    }

    // --- Optimizer interface ---

    pub fn data(&self) -> &ModelData {
        self.particles.data()
    }

    /// Handles of optimized floats on active particles, see
    /// [`ParticleStore::optimized_float_handles`].
    pub fn optimized_float_handles(&self) -> impl Iterator<Item = FloatHandle> + '_ {
        self.particles.optimized_float_handles()
    }

    /// Handle-level read. Unlike particle accessors this does not check whether
    /// the owning particle is active.
    pub fn value(&self, handle: FloatHandle) -> Result<f64, ModelError> {
        self.particles.data().get(handle).copied()
    }

    /// Handle-level write, see [`Model::value`].
    pub fn set_value(&mut self, handle: FloatHandle, value: f64) -> Result<(), ModelError> {
        self.particles.data_mut().set(handle, value)
    }

    pub fn derivative(&self, handle: FloatHandle) -> Result<f64, ModelError> {
        self.particles.data().derivative(handle)
    }

    pub fn zero_all_derivatives(&mut self) {
        self.particles.data_mut().zero_all_derivatives();
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        drop(self.restraints.drain_reverse());
        drop(self.score_states.drain_reverse());
    }
}
