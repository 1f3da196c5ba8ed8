use crate::core::error::ModelError;
use crate::core::ids::ParticleId;
use crate::core::keys::IntKey;
use crate::core::store::ParticleStore;
use crate::engine::traits::BondedList;
use std::collections::{HashMap, HashSet};

fn normalized(a: ParticleId, b: ParticleId) -> (ParticleId, ParticleId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Explicit bond graph: a set of unordered particle pairs.
///
/// `update` reports whether bonds were added or removed since it last ran.
#[derive(Debug, Clone, Default)]
pub struct BondGraphBondedList {
    bonds: HashSet<(ParticleId, ParticleId)>,
    dirty: bool,
}

impl BondGraphBondedList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bonds(bonds: impl IntoIterator<Item = (ParticleId, ParticleId)>) -> Self {
        Self {
            bonds: bonds.into_iter().map(|(a, b)| normalized(a, b)).collect(),
            dirty: false,
        }
    }

    /// Returns `false` if the bond was already present.
    pub fn add_bond(&mut self, a: ParticleId, b: ParticleId) -> bool {
        let inserted = self.bonds.insert(normalized(a, b));
        self.dirty |= inserted;
        inserted
    }

    pub fn remove_bond(&mut self, a: ParticleId, b: ParticleId) -> bool {
        let removed = self.bonds.remove(&normalized(a, b));
        self.dirty |= removed;
        removed
    }

    pub fn len(&self) -> usize {
        self.bonds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bonds.is_empty()
    }
}

impl BondedList for BondGraphBondedList {
    fn update(&mut self, _particles: &ParticleStore) -> Result<bool, ModelError> {
        Ok(std::mem::take(&mut self.dirty))
    }

    fn are_bonded(&self, a: ParticleId, b: ParticleId) -> bool {
        self.bonds.contains(&normalized(a, b))
    }
}

/// Bonds every pair of particles that carry the same value of an integer
/// attribute, e.g. a molecule or rigid-body index.
///
/// Particles without the attribute, and inactive particles, are bonded to
/// nothing. Group values are cached by `update`.
#[derive(Debug, Clone)]
pub struct BondAttributeBondedList {
    key: IntKey,
    groups: HashMap<ParticleId, i64>,
}

impl BondAttributeBondedList {
    pub fn new(key: IntKey) -> Self {
        Self {
            key,
            groups: HashMap::new(),
        }
    }

    pub fn key(&self) -> IntKey {
        self.key
    }

    pub fn group(&self, particle: ParticleId) -> Option<i64> {
        self.groups.get(&particle).copied()
    }
}

impl BondedList for BondAttributeBondedList {
    fn update(&mut self, particles: &ParticleStore) -> Result<bool, ModelError> {
        let mut groups = HashMap::with_capacity(self.groups.len());
        for id in particles.active_ids() {
            let particle = particles.get(id)?;
            if particle.has_attribute(self.key)? {
                groups.insert(id, *particle.get(self.key)?);
            }
        }
        let changed = groups != self.groups;
        self.groups = groups;
        Ok(changed)
    }

    fn are_bonded(&self, a: ParticleId, b: ParticleId) -> bool {
        match (self.groups.get(&a), self.groups.get(&b)) {
            (Some(ga), Some(gb)) => a != b && ga == gb,
            _ => false,
        }
    }
}
