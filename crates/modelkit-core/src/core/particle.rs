use super::attributes::AttributeTable;
use super::data::{DataHandle, FloatHandle, IntHandle, ModelData, StringHandle};
use super::derivatives::DerivativeAccumulator;
use super::error::ModelError;
use super::ids::ParticleId;
use super::keys::{
    AttributeKey, AttributeKind, FloatKey, FloatKind, IntKind, KeyRegistry, StringKind,
};
use std::fmt;

/// An entity of the model: an identity plus the keys it carries.
///
/// The particle maps each of its keys to a handle into the model-wide
/// [`ModelData`]; the values themselves live there. Particles are never removed
/// from a model. Deactivating one is the only way to take it out of play, and
/// every attribute accessor rejects an inactive particle until it is
/// reactivated.
#[derive(Debug, Clone)]
pub struct Particle {
    id: ParticleId,
    active: bool,
    pub(crate) floats: AttributeTable<FloatKind, FloatHandle>,
    pub(crate) ints: AttributeTable<IntKind, IntHandle>,
    pub(crate) strings: AttributeTable<StringKind, StringHandle>,
}

impl Particle {
    pub(crate) fn new(id: ParticleId) -> Self {
        Self {
            id,
            active: true,
            floats: AttributeTable::new(),
            ints: AttributeTable::new(),
            strings: AttributeTable::new(),
        }
    }

    pub fn id(&self) -> ParticleId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_is_active(&mut self, active: bool) {
        self.active = active;
    }

    fn ensure_active(&self) -> Result<(), ModelError> {
        if self.active {
            Ok(())
        } else {
            Err(ModelError::InactiveParticle(self.id))
        }
    }

    /// Checks whether the particle carries `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InactiveParticle`] while the particle is deactivated.
    pub fn has_attribute<K: AttributeKind>(
        &self,
        key: AttributeKey<K>,
    ) -> Result<bool, ModelError> {
        self.ensure_active()?;
        Ok(K::handles(self).contains(key))
    }

    /// Retrieves the data handle stored under `key`.
    ///
    /// # Arguments
    ///
    /// * `key` - The attribute key to resolve.
    ///
    /// # Return
    ///
    /// The handle into [`ModelData`] holding the value.
    ///
    /// # Errors
    ///
    /// Fails when the particle is inactive or does not carry `key`.
    pub fn handle<K: AttributeKind>(
        &self,
        key: AttributeKey<K>,
    ) -> Result<DataHandle<K>, ModelError> {
        self.ensure_active()?;
        K::handles(self).get(key).copied()
    }

    pub fn keys<K: AttributeKind>(&self) -> Result<Vec<AttributeKey<K>>, ModelError> {
        self.ensure_active()?;
        Ok(K::handles(self).keys().collect())
    }

    /// Allocates `value` in `data` and records its handle under `key`.
    ///
    /// # Errors
    ///
    /// Fails when the particle is inactive, already carries `key`, or the value
    /// is rejected by `data`. Nothing is allocated on failure.
    pub fn add_attribute<K: AttributeKind>(
        &mut self,
        data: &mut ModelData,
        key: AttributeKey<K>,
        value: K::Value,
    ) -> Result<DataHandle<K>, ModelError> {
        self.ensure_absent(key)?;
        let handle = data.add::<K>(value)?;
        K::handles_mut(self).insert(key, handle)?;
        Ok(handle)
    }

    /// Like [`Particle::add_attribute`], also setting the optimized flag.
    pub fn add_float_attribute(
        &mut self,
        data: &mut ModelData,
        key: FloatKey,
        value: f64,
        optimized: bool,
    ) -> Result<FloatHandle, ModelError> {
        self.ensure_absent(key)?;
        let handle = data.add_float(value, optimized)?;
        self.floats.insert(key, handle)?;
        Ok(handle)
    }

    fn ensure_absent<K: AttributeKind>(&self, key: AttributeKey<K>) -> Result<(), ModelError> {
        if self.has_attribute(key)? {
            return Err(ModelError::AttributeExists {
                kind: K::NAME,
                index: key.raw(),
            });
        }
        Ok(())
    }

    /// Retrieves the value stored under `key`.
    ///
    /// # Arguments
    ///
    /// * `data` - The model data this particle's handles point into.
    /// * `key` - The attribute to read.
    ///
    /// # Return
    ///
    /// A reference into `data`.
    pub fn get<'d, K: AttributeKind>(
        &self,
        data: &'d ModelData,
        key: AttributeKey<K>,
    ) -> Result<&'d K::Value, ModelError> {
        data.get(self.handle(key)?)
    }

    pub fn set<K: AttributeKind>(
        &mut self,
        data: &mut ModelData,
        key: AttributeKey<K>,
        value: K::Value,
    ) -> Result<(), ModelError> {
        data.set(self.handle(key)?, value)
    }

    pub fn derivative(&self, data: &ModelData, key: FloatKey) -> Result<f64, ModelError> {
        data.derivative(self.handle(key)?)
    }

    pub fn add_to_derivative(
        &self,
        data: &mut ModelData,
        key: FloatKey,
        value: f64,
        accumulator: &DerivativeAccumulator,
    ) -> Result<(), ModelError> {
        data.add_to_derivative(self.handle(key)?, value, accumulator)
    }

    pub fn is_optimized(&self, data: &ModelData, key: FloatKey) -> Result<bool, ModelError> {
        data.is_optimized(self.handle(key)?)
    }

    pub fn set_is_optimized(
        &mut self,
        data: &mut ModelData,
        key: FloatKey,
        optimized: bool,
    ) -> Result<(), ModelError> {
        data.set_is_optimized(self.handle(key)?, optimized)
    }
}

/// Read-only view of a particle together with the data it points into.
#[derive(Clone, Copy)]
pub struct ParticleRef<'a> {
    particle: &'a Particle,
    data: &'a ModelData,
    registry: &'a KeyRegistry,
}

impl<'a> ParticleRef<'a> {
    pub(crate) fn new(
        particle: &'a Particle,
        data: &'a ModelData,
        registry: &'a KeyRegistry,
    ) -> Self {
        Self {
            particle,
            data,
            registry,
        }
    }

    pub fn id(&self) -> ParticleId {
        self.particle.id()
    }

    pub fn is_active(&self) -> bool {
        self.particle.is_active()
    }

    pub fn has_attribute<K: AttributeKind>(
        &self,
        key: AttributeKey<K>,
    ) -> Result<bool, ModelError> {
        self.particle.has_attribute(key)
    }

    pub fn handle<K: AttributeKind>(
        &self,
        key: AttributeKey<K>,
    ) -> Result<DataHandle<K>, ModelError> {
        self.particle.handle(key)
    }

    pub fn get<K: AttributeKind>(&self, key: AttributeKey<K>) -> Result<&'a K::Value, ModelError> {
        self.particle.get(self.data, key)
    }

    /// Shorthand for reading a float attribute by value.
    pub fn float(&self, key: FloatKey) -> Result<f64, ModelError> {
        self.get(key).copied()
    }

    pub fn derivative(&self, key: FloatKey) -> Result<f64, ModelError> {
        self.particle.derivative(self.data, key)
    }

    pub fn is_optimized(&self, key: FloatKey) -> Result<bool, ModelError> {
        self.particle.is_optimized(self.data, key)
    }

    pub fn keys<K: AttributeKind>(&self) -> Result<Vec<AttributeKey<K>>, ModelError> {
        self.particle.keys()
    }

    fn write_kind<K: AttributeKind>(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, handle) in K::handles(self.particle).iter() {
            let name = self
                .registry
                .name(key)
                .unwrap_or_else(|| format!("#{}", key.index()));
            match self.data.get(*handle) {
                Ok(value) => writeln!(f, "  {} {}: {:?}", K::NAME, name, value)?,
                Err(_) => writeln!(f, "  {} {}: <unavailable>", K::NAME, name)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for ParticleRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_active() { "active" } else { "inactive" };
        writeln!(f, "Particle {:?} ({})", self.id(), state)?;
        self.write_kind::<FloatKind>(f)?;
        self.write_kind::<IntKind>(f)?;
        self.write_kind::<StringKind>(f)
    }
}

/// Mutable view of a particle together with the data it points into.
pub struct ParticleMut<'a> {
    particle: &'a mut Particle,
    data: &'a mut ModelData,
    registry: &'a KeyRegistry,
}

impl<'a> ParticleMut<'a> {
    pub(crate) fn new(
        particle: &'a mut Particle,
        data: &'a mut ModelData,
        registry: &'a KeyRegistry,
    ) -> Self {
        Self {
            particle,
            data,
            registry,
        }
    }

    /// Reborrows this view as read-only.
    pub fn view(&self) -> ParticleRef<'_> {
        ParticleRef::new(&*self.particle, &*self.data, self.registry)
    }

    pub fn id(&self) -> ParticleId {
        self.particle.id()
    }

    pub fn is_active(&self) -> bool {
        self.particle.is_active()
    }

    pub fn set_is_active(&mut self, active: bool) {
        self.particle.set_is_active(active);
    }

    pub fn add_attribute<K: AttributeKind>(
        &mut self,
        key: AttributeKey<K>,
        value: K::Value,
    ) -> Result<DataHandle<K>, ModelError> {
        self.particle.add_attribute(self.data, key, value)
    }

    pub fn add_float_attribute(
        &mut self,
        key: FloatKey,
        value: f64,
        optimized: bool,
    ) -> Result<FloatHandle, ModelError> {
        self.particle.add_float_attribute(self.data, key, value, optimized)
    }

    pub fn get<K: AttributeKind>(&self, key: AttributeKey<K>) -> Result<&K::Value, ModelError> {
        self.particle.get(&*self.data, key)
    }

    pub fn float(&self, key: FloatKey) -> Result<f64, ModelError> {
        self.get(key).copied()
    }

    /// Overwrites the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Fails when the particle is inactive, lacks `key`, or `value` is invalid.
    pub fn set<K: AttributeKind>(
        &mut self,
        key: AttributeKey<K>,
        value: K::Value,
    ) -> Result<(), ModelError> {
        self.particle.set(self.data, key, value)
    }

    pub fn set_is_optimized(&mut self, key: FloatKey, optimized: bool) -> Result<(), ModelError> {
        self.particle.set_is_optimized(self.data, key, optimized)
    }
}
