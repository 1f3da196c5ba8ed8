use super::coordinates::CoordinateKeys;
use crate::core::error::ModelError;
use crate::core::ids::ParticleId;
use crate::core::keys::FloatKey;
use crate::core::store::ParticleStore;
use tracing::trace;

/// Tracks how far a set of float attributes has drifted since a snapshot.
///
/// Keys are tracked in groups: the change of a group is the Euclidean norm of
/// the per-key differences, so a single-key group measures `|current - snapshot|`
/// and an `x`/`y`/`z` group measures displacement. [`Self::max_change`] is the
/// running maximum over every tracked particle and group since the last
/// [`Self::reset`]; it never decreases in between.
///
/// Particles that were inactive when the snapshot was taken and have since been
/// reactivated, or particles added after the snapshot, count as having moved an
/// unbounded distance.
#[derive(Debug, Clone)]
pub struct MaxChangeTracker {
    groups: Vec<Vec<FloatKey>>,
    particles: Vec<ParticleId>,
    snapshots: Vec<Option<Vec<f64>>>,
    max_change: f64,
    pending: bool,
}

impl MaxChangeTracker {
    /// Tracks each key on its own.
    pub fn new(keys: impl IntoIterator<Item = FloatKey>) -> Self {
        Self::with_groups(keys.into_iter().map(|key| vec![key]))
    }

    pub fn with_groups(groups: impl IntoIterator<Item = Vec<FloatKey>>) -> Self {
        Self {
            groups: groups.into_iter().filter(|group| !group.is_empty()).collect(),
            particles: Vec::new(),
            snapshots: Vec::new(),
            max_change: f64::INFINITY,
            pending: true,
        }
    }

    /// Tracks the displacement of a particle's position.
    pub fn for_positions(coordinates: &CoordinateKeys) -> Self {
        Self::with_groups([coordinates.as_array().to_vec()])
    }

    pub fn particles(&self) -> &[ParticleId] {
        &self.particles
    }

    pub fn set_particles(&mut self, particles: impl IntoIterator<Item = ParticleId>) {
        self.particles = particles.into_iter().collect();
        self.snapshots.clear();
        self.mark_pending();
    }

    pub fn add_particles(&mut self, particles: impl IntoIterator<Item = ParticleId>) {
        self.particles.extend(particles);
        self.mark_pending();
    }

    fn mark_pending(&mut self) {
        self.pending = true;
        self.max_change = f64::INFINITY;
    }

    /// Snapshots the current value of every tracked attribute and zeroes the maximum.
    pub fn reset(&mut self, particles: &ParticleStore) -> Result<(), ModelError> {
        let mut snapshots = Vec::with_capacity(self.particles.len());
        for &id in &self.particles {
            let particle = particles.get(id)?;
            if !particle.is_active() {
                snapshots.push(None);
                continue;
            }
            let values = self
                .groups
                .iter()
                .flatten()
                .map(|&key| particle.float(key))
                .collect::<Result<Vec<_>, _>>()?;
            snapshots.push(Some(values));
        }
        self.snapshots = snapshots;
        self.max_change = 0.0;
        self.pending = false;
        Ok(())
    }

    /// Folds the current attribute values into the running maximum and returns it.
    pub fn update(&mut self, particles: &ParticleStore) -> Result<f64, ModelError> {
        if self.pending {
            return Ok(self.max_change);
        }
        for (&id, snapshot) in self.particles.iter().zip(&self.snapshots) {
            let particle = particles.get(id)?;
            if !particle.is_active() {
                continue;
            }
            let Some(snapshot) = snapshot else {
                trace!(particle = ?id, "Particle reactivated since last snapshot");
                self.max_change = f64::INFINITY;
                return Ok(self.max_change);
            };
            let mut offset = 0;
            for group in &self.groups {
                let mut squared = 0.0;
                for (key, old) in group.iter().zip(&snapshot[offset..]) {
                    let delta = particle.float(*key)? - old;
                    squared += delta * delta;
                }
                offset += group.len();
                self.max_change = self.max_change.max(squared.sqrt());
            }
        }
        Ok(self.max_change)
    }

    pub fn max_change(&self) -> f64 {
        self.max_change
    }
}
