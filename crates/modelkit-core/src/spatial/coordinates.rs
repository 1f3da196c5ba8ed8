use crate::core::error::ModelError;
use crate::core::keys::{FloatKey, KeyRegistry};
use crate::core::particle::{ParticleMut, ParticleRef};
use nalgebra::Point3;

pub const X_KEY: &str = "x";
pub const Y_KEY: &str = "y";
pub const Z_KEY: &str = "z";
pub const RADIUS_KEY: &str = "radius";

/// The three float keys that make up a particle's Cartesian position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinateKeys {
    pub x: FloatKey,
    pub y: FloatKey,
    pub z: FloatKey,
}

impl CoordinateKeys {
    /// Interns the conventional `x`, `y`, `z` keys.
    pub fn new(registry: &KeyRegistry) -> Self {
        Self {
            x: registry.float_key(X_KEY),
            y: registry.float_key(Y_KEY),
            z: registry.float_key(Z_KEY),
        }
    }

    pub fn as_array(&self) -> [FloatKey; 3] {
        [self.x, self.y, self.z]
    }

    pub fn position(&self, particle: &ParticleRef<'_>) -> Result<Point3<f64>, ModelError> {
        Ok(Point3::new(
            particle.float(self.x)?,
            particle.float(self.y)?,
            particle.float(self.z)?,
        ))
    }

    pub fn add_position(
        &self,
        particle: &mut ParticleMut<'_>,
        position: &Point3<f64>,
        optimized: bool,
    ) -> Result<(), ModelError> {
        particle.add_float_attribute(self.x, position.x, optimized)?;
        particle.add_float_attribute(self.y, position.y, optimized)?;
        particle.add_float_attribute(self.z, position.z, optimized)?;
        Ok(())
    }

    pub fn set_position(
        &self,
        particle: &mut ParticleMut<'_>,
        position: &Point3<f64>,
    ) -> Result<(), ModelError> {
        particle.set(self.x, position.x)?;
        particle.set(self.y, position.y)?;
        particle.set(self.z, position.z)
    }
}

pub fn radius_key(registry: &KeyRegistry) -> FloatKey {
    registry.float_key(RADIUS_KEY)
}
