use super::coordinates::CoordinateKeys;
use super::grid::SpatialGrid;
use super::tracker::MaxChangeTracker;
use crate::core::error::ModelError;
use crate::core::ids::ParticleId;
use crate::core::keys::{FloatKey, KeyRegistry};
use crate::core::particle::ParticleRef;
use crate::core::store::ParticleStore;
use crate::engine::config::{GridConfig, NonbondedAlgorithm, NonbondedConfig};
use crate::engine::traits::{BondedList, ScoreState};
use itertools::{Itertools, iproduct};
use nalgebra::Point3;
use std::any::Any;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// Which particle pairs a [`NonbondedList`] considers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairSource {
    /// Every unordered pair drawn from one set.
    All(Vec<ParticleId>),
    /// Every pair with one member from each set.
    Bipartite(Vec<ParticleId>, Vec<ParticleId>),
}

impl PairSource {
    fn normalized(self) -> Self {
        match self {
            PairSource::All(ids) => PairSource::All(ids.into_iter().unique().collect()),
            PairSource::Bipartite(a, b) => PairSource::Bipartite(
                a.into_iter().unique().collect(),
                b.into_iter().unique().collect(),
            ),
        }
    }

    pub fn particles(&self) -> Vec<ParticleId> {
        match self {
            PairSource::All(ids) => ids.clone(),
            PairSource::Bipartite(a, b) => a.iter().chain(b).copied().unique().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Invalid,
    Rebuilding,
    Valid,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: ParticleId,
    position: Point3<f64>,
    radius: f64,
}

fn surface_distance(a: &Entry, b: &Entry) -> f64 {
    nalgebra::distance(&a.position, &b.position) - a.radius - b.radius
}

/// Accepts candidate pairs, applying the distance, exclusion and size limits.
struct PairSink<'a> {
    bonded: &'a [Box<dyn BondedList>],
    reach: f64,
    max: Option<usize>,
    seen: Option<HashSet<(ParticleId, ParticleId)>>,
    pairs: Vec<(ParticleId, ParticleId)>,
}

impl<'a> PairSink<'a> {
    fn new(bonded: &'a [Box<dyn BondedList>], reach: f64, max: Option<usize>) -> Self {
        Self {
            bonded,
            reach,
            max,
            seen: None,
            pairs: Vec::new(),
        }
    }

    fn deduplicated(mut self) -> Self {
        self.seen = Some(HashSet::new());
        self
    }

    fn offer(&mut self, a: &Entry, b: &Entry) -> Result<(), ModelError> {
        if a.id == b.id || surface_distance(a, b) > self.reach {
            return Ok(());
        }
        if self.bonded.iter().any(|list| list.are_bonded(a.id, b.id)) {
            return Ok(());
        }
        if let Some(seen) = &mut self.seen {
            let key = if a.id <= b.id { (a.id, b.id) } else { (b.id, a.id) };
            if !seen.insert(key) {
                return Ok(());
            }
        }
        if let Some(max) = self.max {
            if self.pairs.len() >= max {
                warn!(max, "Nonbonded candidate list overflowed");
                return Err(ModelError::NonbondedOverflow { max });
            }
        }
        self.pairs.push((a.id, b.id));
        Ok(())
    }
}

fn indexed_points(entries: &[Entry]) -> Vec<(usize, Point3<f64>)> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| (index, entry.position))
        .collect()
}

fn max_radius(entries: &[Entry]) -> f64 {
    entries.iter().map(|entry| entry.radius).fold(0.0, f64::max)
}

fn collect_all(
    entries: &[Entry],
    algorithm: NonbondedAlgorithm,
    grid_config: &GridConfig,
    sink: &mut PairSink<'_>,
) -> Result<(), ModelError> {
    match algorithm {
        NonbondedAlgorithm::Quadratic => {
            for (a, b) in entries.iter().tuple_combinations() {
                sink.offer(a, b)?;
            }
        }
        NonbondedAlgorithm::Grid => {
            let search = sink.reach + 2.0 * max_radius(entries);
            let grid = SpatialGrid::build(&indexed_points(entries), grid_config);
            for (voxel, members) in grid.non_empty_voxels() {
                for (&i, &j) in members.iter().tuple_combinations() {
                    sink.offer(&entries[i], &entries[j])?;
                }
                let center = voxel.map(|value| value as i64);
                for &j in grid.query_near(center, search, true) {
                    for &i in members {
                        sink.offer(&entries[i], &entries[j])?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn collect_bipartite(
    first: &[Entry],
    second: &[Entry],
    algorithm: NonbondedAlgorithm,
    grid_config: &GridConfig,
    sink: &mut PairSink<'_>,
) -> Result<(), ModelError> {
    match algorithm {
        NonbondedAlgorithm::Quadratic => {
            for (a, b) in iproduct!(first, second) {
                sink.offer(a, b)?;
            }
        }
        NonbondedAlgorithm::Grid => {
            let search = sink.reach + max_radius(first) + max_radius(second);
            let grid = SpatialGrid::build(&indexed_points(second), grid_config);
            for a in first {
                let center = grid.virtual_index(&a.position);
                for &j in grid.query_near(center, search, false) {
                    sink.offer(a, &second[j])?;
                }
            }
        }
    }
    Ok(())
}

/// Cached list of particle pairs within a distance cutoff.
///
/// ## Overview
///
/// The list keeps a candidate set of every pair whose surface distance (center
/// distance minus both radii) was within `cutoff + 2·slack` when the cache was
/// built, minus the pairs any attached [`BondedList`] reports as bonded. As a
/// score state it tracks how far particles have moved since then; the cache is
/// invalidated once the tracked motion exceeds `slack` and rebuilt during the
/// same `update`. Reading the cache with [`NonbondedList::iterate_pairs`]
/// re-applies the exact `cutoff` test against current positions.
///
/// A particle's motion is the Euclidean displacement of its position plus the
/// change of its radius, when radii are tracked. Two particles that each moved
/// at most `slack` can close their surface distance by at most `2·slack`, so
/// every pair within `cutoff` is always among the candidates.
///
/// ## States
///
/// `Invalid` (initial, after motion beyond slack, after a topology or
/// parameter change) → `Rebuilding` → `Valid`. A failed rebuild returns the
/// list to `Invalid` with an empty candidate set.
pub struct NonbondedList {
    source: PairSource,
    config: NonbondedConfig,
    coordinates: CoordinateKeys,
    radius: Option<FloatKey>,
    bonded: Vec<Box<dyn BondedList>>,
    positions: MaxChangeTracker,
    radii: Option<MaxChangeTracker>,
    candidates: Vec<(ParticleId, ParticleId)>,
    state: CacheState,
    rebuilds: usize,
}

impl NonbondedList {
    pub fn new(
        registry: &KeyRegistry,
        source: PairSource,
        config: NonbondedConfig,
    ) -> Result<Self, ModelError> {
        config.validate()?;
        let coordinates = CoordinateKeys::new(registry);
        let source = source.normalized();
        let mut positions = MaxChangeTracker::for_positions(&coordinates);
        positions.set_particles(source.particles());
        Ok(Self {
            source,
            config,
            coordinates,
            radius: None,
            bonded: Vec::new(),
            positions,
            radii: None,
            candidates: Vec::new(),
            state: CacheState::Invalid,
            rebuilds: 0,
        })
    }

    pub fn all(
        registry: &KeyRegistry,
        particles: impl IntoIterator<Item = ParticleId>,
        config: NonbondedConfig,
    ) -> Result<Self, ModelError> {
        Self::new(registry, PairSource::All(particles.into_iter().collect()), config)
    }

    pub fn bipartite(
        registry: &KeyRegistry,
        first: impl IntoIterator<Item = ParticleId>,
        second: impl IntoIterator<Item = ParticleId>,
        config: NonbondedConfig,
    ) -> Result<Self, ModelError> {
        Self::new(
            registry,
            PairSource::Bipartite(first.into_iter().collect(), second.into_iter().collect()),
            config,
        )
    }

    /// Treats particles as spheres with the radius stored under `key`.
    pub fn with_radius_key(mut self, key: FloatKey) -> Self {
        let mut radii = MaxChangeTracker::new([key]);
        radii.set_particles(self.source.particles());
        self.radius = Some(key);
        self.radii = Some(radii);
        self.state = CacheState::Invalid;
        self
    }

    pub fn add_bonded_list<B: BondedList + 'static>(&mut self, list: B) {
        self.bonded.push(Box::new(list));
        self.invalidate();
    }

    pub fn number_of_bonded_lists(&self) -> usize {
        self.bonded.len()
    }

    pub fn source(&self) -> &PairSource {
        &self.source
    }

    pub fn set_source(&mut self, source: PairSource) {
        self.source = source.normalized();
        let particles = self.source.particles();
        if let Some(radii) = &mut self.radii {
            radii.set_particles(particles.iter().copied());
        }
        self.positions.set_particles(particles);
        self.invalidate();
    }

    pub fn config(&self) -> &NonbondedConfig {
        &self.config
    }

    pub fn set_cutoff(&mut self, cutoff: f64) -> Result<(), ModelError> {
        let mut config = self.config.clone();
        config.cutoff = cutoff;
        self.set_config(config)
    }

    pub fn set_slack(&mut self, slack: f64) -> Result<(), ModelError> {
        let mut config = self.config.clone();
        config.slack = slack;
        self.set_config(config)
    }

    pub fn set_config(&mut self, config: NonbondedConfig) -> Result<(), ModelError> {
        config.validate()?;
        self.config = config;
        self.invalidate();
        Ok(())
    }

    /// Forces the next update to rebuild the candidate list.
    pub fn invalidate(&mut self) {
        if self.state != CacheState::Invalid {
            info!("Nonbonded list invalidated");
        }
        self.state = CacheState::Invalid;
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == CacheState::Valid
    }

    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Slack-widened candidate pairs, before the exact cutoff test.
    pub fn candidates(&self) -> &[(ParticleId, ParticleId)] {
        &self.candidates
    }

    /// Rebuilds the cache if it is not valid. Returns whether a rebuild happened.
    pub fn ensure_valid(&mut self, particles: &ParticleStore) -> Result<bool, ModelError> {
        if self.state == CacheState::Valid {
            return Ok(false);
        }
        self.rebuild(particles)?;
        Ok(true)
    }

    /// Pairs whose current surface distance is within `cutoff`.
    ///
    /// Candidates come from the most recent rebuild and distances are measured
    /// against current positions. Fails with [`ModelError::NonbondedListInvalid`]
    /// if there is no valid cache.
    /// Pairs involving a particle that has since been deactivated are skipped.
    pub fn iterate_pairs<'a>(
        &'a self,
        particles: &'a ParticleStore,
    ) -> Result<NonbondedPairs<'a>, ModelError> {
        if self.state != CacheState::Valid {
            return Err(ModelError::NonbondedListInvalid);
        }
        Ok(NonbondedPairs {
            list: self,
            particles,
            candidates: self.candidates.iter(),
        })
    }

    pub fn pairs(
        &self,
        particles: &ParticleStore,
    ) -> Result<Vec<(ParticleId, ParticleId)>, ModelError> {
        self.iterate_pairs(particles)?.collect()
    }

    fn entry(&self, particle: &ParticleRef<'_>) -> Result<Entry, ModelError> {
        let radius = match self.radius {
            Some(key) => particle.float(key)?,
            None => 0.0,
        };
        Ok(Entry {
            id: particle.id(),
            position: self.coordinates.position(particle)?,
            radius,
        })
    }

    fn entries(
        &self,
        ids: &[ParticleId],
        particles: &ParticleStore,
    ) -> Result<Vec<Entry>, ModelError> {
        let mut entries = Vec::with_capacity(ids.len());
        for &id in ids {
            let particle = particles.get(id)?;
            if particle.is_active() {
                entries.push(self.entry(&particle)?);
            }
        }
        Ok(entries)
    }

    fn within_cutoff(
        &self,
        particles: &ParticleStore,
        a: ParticleId,
        b: ParticleId,
    ) -> Result<bool, ModelError> {
        let (first, second) = (particles.get(a)?, particles.get(b)?);
        if !first.is_active() || !second.is_active() {
            return Ok(false);
        }
        let distance = surface_distance(&self.entry(&first)?, &self.entry(&second)?);
        Ok(distance <= self.config.cutoff)
    }

    fn tracked_motion(&mut self, particles: &ParticleStore) -> Result<f64, ModelError> {
        let mut motion = self.positions.update(particles)?;
        if let Some(radii) = &mut self.radii {
            motion += radii.update(particles)?;
        }
        Ok(motion)
    }

    fn collect_candidates(
        &self,
        particles: &ParticleStore,
    ) -> Result<Vec<(ParticleId, ParticleId)>, ModelError> {
        let reach = self.config.cutoff + 2.0 * self.config.slack;
        let mut sink = PairSink::new(&self.bonded, reach, self.config.max_candidates);
        match &self.source {
            PairSource::All(ids) => {
                let entries = self.entries(ids, particles)?;
                collect_all(&entries, self.config.algorithm, &self.config.grid, &mut sink)?;
            }
            PairSource::Bipartite(first, second) => {
                let in_second: HashSet<_> = second.iter().collect();
                if first.iter().any(|id| in_second.contains(id)) {
                    sink = sink.deduplicated();
                }
                let first = self.entries(first, particles)?;
                let second = self.entries(second, particles)?;
                collect_bipartite(
                    &first,
                    &second,
                    self.config.algorithm,
                    &self.config.grid,
                    &mut sink,
                )?;
            }
        }
        Ok(sink.pairs)
    }

    fn reset_trackers(&mut self, particles: &ParticleStore) -> Result<(), ModelError> {
        self.positions.reset(particles)?;
        if let Some(radii) = &mut self.radii {
            radii.reset(particles)?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(rebuild = self.rebuilds + 1, algorithm = ?self.config.algorithm))]
    fn rebuild(&mut self, particles: &ParticleStore) -> Result<(), ModelError> {
        self.state = CacheState::Rebuilding;
        self.candidates.clear();

        let candidates = match self.collect_candidates(particles) {
            Ok(candidates) => candidates,
            Err(err) => {
                self.state = CacheState::Invalid;
                return Err(err);
            }
        };
        if let Err(err) = self.reset_trackers(particles) {
            self.state = CacheState::Invalid;
            return Err(err);
        }

        self.candidates = candidates;
        self.rebuilds += 1;
        self.state = CacheState::Valid;
        debug!(
            candidates = self.candidates.len(),
            "Rebuilt nonbonded candidate list"
        );
        Ok(())
    }
}

impl ScoreState for NonbondedList {
    fn name(&self) -> &str {
        "NonbondedList"
    }

    fn update(&mut self, particles: &ParticleStore) -> Result<(), ModelError> {
        let mut topology_changed = false;
        for list in &mut self.bonded {
            topology_changed |= list.update(particles)?;
        }
        if topology_changed && self.state == CacheState::Valid {
            debug!("Bonded topology changed");
            self.state = CacheState::Invalid;
        }

        if self.state == CacheState::Valid {
            let motion = self.tracked_motion(particles)?;
            if motion > self.config.slack {
                debug!(motion, slack = self.config.slack, "Tracked motion exceeded slack");
                self.state = CacheState::Invalid;
            }
        }

        self.ensure_valid(particles)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Iterator over the pairs of a [`NonbondedList`] that pass the exact cutoff.
pub struct NonbondedPairs<'a> {
    list: &'a NonbondedList,
    particles: &'a ParticleStore,
    candidates: std::slice::Iter<'a, (ParticleId, ParticleId)>,
}

impl Iterator for NonbondedPairs<'_> {
    type Item = Result<(ParticleId, ParticleId), ModelError>;

    fn next(&mut self) -> Option<Self::Item> {
        for &(a, b) in self.candidates.by_ref() {
            match self.list.within_cutoff(self.particles, a, b) {
                Ok(true) => return Some(Ok((a, b))),
                Ok(false) => {}
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}
