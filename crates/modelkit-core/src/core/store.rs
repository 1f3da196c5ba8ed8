use super::data::{FloatHandle, ModelData};
use super::derivatives::DerivativeAccumulator;
use super::error::ModelError;
use super::ids::ParticleId;
use super::keys::{FloatKey, KeyRegistry};
use super::particle::{Particle, ParticleMut, ParticleRef};
use slotmap::SlotMap;
use std::sync::Arc;

/// The particle arena of a model together with the data its particles point into.
///
/// Particles are only ever appended, so iteration order is creation order and
/// every [`ParticleId`] handed out stays valid for the store's lifetime.
#[derive(Debug)]
pub struct ParticleStore {
    registry: Arc<KeyRegistry>,
    particles: SlotMap<ParticleId, Particle>,
    data: ModelData,
}

impl ParticleStore {
    /// Creates an empty store whose particles name their keys through `registry`.
    pub fn new(registry: Arc<KeyRegistry>) -> Self {
        Self {
            registry,
            particles: SlotMap::with_key(),
            data: ModelData::new(),
        }
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    /// Appends a new, active particle with no attributes.
    pub fn add_particle(&mut self) -> ParticleId {
        self.particles.insert_with_key(Particle::new)
    }

    /// Retrieves a read-only view of a particle.
    ///
    /// # Arguments
    ///
    /// * `id` - The id handed out by [`ParticleStore::add_particle`].
    ///
    /// # Return
    ///
    /// A view that resolves attribute keys against this store's data.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ParticleNotFound`] when `id` belongs to another store.
    pub fn get(&self, id: ParticleId) -> Result<ParticleRef<'_>, ModelError> {
        let particle = self
            .particles
            .get(id)
            .ok_or(ModelError::ParticleNotFound(id))?;
        Ok(ParticleRef::new(particle, &self.data, &self.registry))
    }

    /// Retrieves a mutable view of a particle.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ParticleNotFound`] when `id` belongs to another store.
    pub fn get_mut(&mut self, id: ParticleId) -> Result<ParticleMut<'_>, ModelError> {
        let particle = self
            .particles
            .get_mut(id)
            .ok_or(ModelError::ParticleNotFound(id))?;
        Ok(ParticleMut::new(particle, &mut self.data, &self.registry))
    }

    pub fn contains(&self, id: ParticleId) -> bool {
        self.particles.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ParticleId> + '_ {
        self.particles.keys()
    }

    /// Ids of active particles, in creation order.
    pub fn active_ids(&self) -> impl Iterator<Item = ParticleId> + '_ {
        self.particles
            .iter()
            .filter(|(_, particle)| particle.is_active())
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// The raw value columns.
    ///
    /// Access through a [`FloatHandle`] is handle-level: it does not consult the
    /// active flag of the particle that owns the handle.
    pub fn data(&self) -> &ModelData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ModelData {
        &mut self.data
    }

    /// Handles of optimized float attributes on active particles.
    ///
    /// Particles are visited in creation order and each particle's floats in key
    /// order. Deactivated particles contribute nothing.
    pub fn optimized_float_handles(&self) -> impl Iterator<Item = FloatHandle> + '_ {
        self.particles
            .values()
            .filter(|particle| particle.is_active())
            .flat_map(|particle| particle.floats.iter().map(|(_, handle)| *handle))
            .filter(|handle| self.data.is_optimized(*handle).unwrap_or(false))
    }

    /// Adds `value`, scaled by the accumulator's weight, to a float derivative.
    ///
    /// # Arguments
    ///
    /// * `id` - The particle carrying the attribute.
    /// * `key` - The float attribute whose derivative grows.
    /// * `value` - The unweighted partial derivative.
    /// * `accumulator` - Supplies the weight of the enclosing restraint set.
    ///
    /// # Errors
    ///
    /// Fails when the particle is unknown or inactive, or lacks `key`.
    pub fn add_to_derivative(
        &mut self,
        id: ParticleId,
        key: FloatKey,
        value: f64,
        accumulator: &DerivativeAccumulator,
    ) -> Result<(), ModelError> {
        let particle = self
            .particles
            .get(id)
            .ok_or(ModelError::ParticleNotFound(id))?;
        particle.add_to_derivative(&mut self.data, key, value, accumulator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particles_iterate_in_creation_order() {
        let mut store = ParticleStore::new(KeyRegistry::shared());
        let ids: Vec<_> = (0..4).map(|_| store.add_particle()).collect();
        assert_eq!(store.ids().collect::<Vec<_>>(), ids);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn active_ids_skip_deactivated_particles() {
        let mut store = ParticleStore::new(KeyRegistry::shared());
        let a = store.add_particle();
        let b = store.add_particle();
        store.get_mut(a).unwrap().set_is_active(false);
        assert_eq!(store.active_ids().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn optimized_handles_skip_deactivated_particles() {
        let registry = KeyRegistry::shared();
        let mut store = ParticleStore::new(Arc::clone(&registry));
        let x = registry.float_key("x");
        let y = registry.float_key("y");
        let a = store.add_particle();
        let b = store.add_particle();
        let ha = store.get_mut(a).unwrap().add_float_attribute(x, 1.0, true).unwrap();
        store.get_mut(a).unwrap().add_float_attribute(y, 1.0, false).unwrap();
        let hb = store.get_mut(b).unwrap().add_float_attribute(x, 2.0, true).unwrap();
        assert_eq!(store.optimized_float_handles().collect::<Vec<_>>(), vec![ha, hb]);

        store.get_mut(a).unwrap().set_is_active(false);
        assert_eq!(store.optimized_float_handles().collect::<Vec<_>>(), vec![hb]);
        assert_eq!(store.data().optimized_float_handles().count(), 2);
    }

    #[test]
    fn unknown_particle_is_reported() {
        let mut other = ParticleStore::new(KeyRegistry::shared());
        other.add_particle();
        let foreign = other.add_particle();

        let store = ParticleStore::new(KeyRegistry::shared());
        assert!(matches!(
            store.get(foreign),
            Err(ModelError::ParticleNotFound(_))
        ));
    }

    #[test]
    fn deactivation_round_trip_preserves_values() {
        let registry = KeyRegistry::shared();
        let mut store = ParticleStore::new(Arc::clone(&registry));
        let x = registry.float_key("x");
        let tag = registry.string_key("tag");
        let id = store.add_particle();
        {
            let mut particle = store.get_mut(id).unwrap();
            particle.add_float_attribute(x, 8.5, true).unwrap();
            particle.add_attribute(tag, "ligand".to_string()).unwrap();
            particle.set_is_active(false);
        }
        assert!(matches!(
            store.get(id).unwrap().float(x),
            Err(ModelError::InactiveParticle(_))
        ));

        store.get_mut(id).unwrap().set_is_active(true);
        let particle = store.get(id).unwrap();
        assert_eq!(particle.float(x).unwrap(), 8.5);
        assert_eq!(particle.get(tag).unwrap(), "ligand");
        assert!(particle.is_optimized(x).unwrap());
    }
}
