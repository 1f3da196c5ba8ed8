use modelkit::core::ids::{ParticleId, ScoreStateId};
use modelkit::core::keys::KeyRegistry;
use modelkit::engine::config::{NonbondedAlgorithm, NonbondedConfigBuilder};
use modelkit::engine::model::Model;
use modelkit::spatial::bonded::BondAttributeBondedList;
use modelkit::spatial::coordinates::CoordinateKeys;
use modelkit::spatial::nonbonded::NonbondedList;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

struct Scene {
    model: Model,
    keys: CoordinateKeys,
    ids: Vec<ParticleId>,
    list: ScoreStateId,
}

impl Scene {
    fn random(count: usize, size: f64, cutoff: f64, slack: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let registry = KeyRegistry::shared();
        let keys = CoordinateKeys::new(&registry);
        let radius = registry.float_key("radius");
        let mut model = Model::new(registry.clone());
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = model.add_particle();
            let point = Point3::new(
                rng.gen_range(0.0..size),
                rng.gen_range(0.0..size),
                rng.gen_range(0.0..size),
            );
            let mut particle = model.particle_mut(id).unwrap();
            keys.add_position(&mut particle, &point, true).unwrap();
            particle.add_float_attribute(radius, 0.0, false).unwrap();
            ids.push(id);
        }
        let config = NonbondedConfigBuilder::new()
            .cutoff(cutoff)
            .slack(slack)
            .build()
            .unwrap();
        let list = NonbondedList::all(&registry, ids.clone(), config)
            .unwrap()
            .with_radius_key(radius);
        let list = model.add_score_state(list);
        Self {
            model,
            keys,
            ids,
            list,
        }
    }

    fn list(&self) -> &NonbondedList {
        self.model.score_state::<NonbondedList>(self.list).unwrap()
    }

    fn position(&self, id: ParticleId) -> Point3<f64> {
        self.keys.position(&self.model.particle(id).unwrap()).unwrap()
    }

    fn translate(&mut self, id: ParticleId, offset: Vector3<f64>) {
        let target = self.position(id) + offset;
        self.keys
            .set_position(&mut self.model.particle_mut(id).unwrap(), &target)
            .unwrap();
    }

    fn reported_pairs(&self) -> HashSet<(ParticleId, ParticleId)> {
        self.list()
            .pairs(self.model.particles())
            .unwrap()
            .into_iter()
            .map(normalized)
            .collect()
    }

    fn candidate_pairs(&self) -> HashSet<(ParticleId, ParticleId)> {
        self.list().candidates().iter().copied().map(normalized).collect()
    }

    fn true_pairs(&self, cutoff: f64) -> HashSet<(ParticleId, ParticleId)> {
        let mut pairs = HashSet::new();
        for (i, &a) in self.ids.iter().enumerate() {
            for &b in &self.ids[i + 1..] {
                if nalgebra::distance(&self.position(a), &self.position(b)) <= cutoff {
                    pairs.insert(normalized((a, b)));
                }
            }
        }
        pairs
    }
}

fn normalized((a, b): (ParticleId, ParticleId)) -> (ParticleId, ParticleId) {
    if a <= b { (a, b) } else { (b, a) }
}

#[test]
fn random_cloud_reports_every_pair_within_cutoff_and_nothing_beyond_slack() {
    let mut scene = Scene::random(100, 100.0, 5.0, 1.0, 2024);
    scene.model.evaluate(false).unwrap();

    let reported = scene.reported_pairs();
    for pair in scene.true_pairs(5.0) {
        assert!(reported.contains(&pair), "missing pair {pair:?}");
    }
    let widened = scene.true_pairs(6.0);
    for pair in &reported {
        assert!(widened.contains(pair), "pair {pair:?} beyond cutoff + slack");
    }
    for pair in scene.candidate_pairs() {
        let (a, b) = pair;
        assert!(nalgebra::distance(&scene.position(a), &scene.position(b)) <= 7.0);
    }
}

#[test]
fn moving_past_slack_triggers_exactly_one_rebuild() {
    let registry = KeyRegistry::shared();
    let keys = CoordinateKeys::new(&registry);
    let mut model = Model::new(registry.clone());
    let mut ids = Vec::new();
    for point in [Point3::new(0.0, 0.0, 0.0), Point3::new(8.0, 0.0, 0.0)] {
        let id = model.add_particle();
        keys.add_position(&mut model.particle_mut(id).unwrap(), &point, true)
            .unwrap();
        ids.push(id);
    }
    let (cutoff, slack) = (5.0, 1.0);
    let config = NonbondedConfigBuilder::new()
        .cutoff(cutoff)
        .slack(slack)
        .build()
        .unwrap();
    let list = model.add_score_state(NonbondedList::all(&registry, ids.clone(), config).unwrap());

    model.evaluate(false).unwrap();
    let list_of = |model: &Model| model.score_state::<NonbondedList>(list).unwrap().rebuild_count();
    assert_eq!(list_of(&model), 1);
    assert_eq!(
        model.score_state::<NonbondedList>(list).unwrap().candidate_count(),
        0
    );

    let epsilon = 1e-3;
    keys.set_position(
        &mut model.particle_mut(ids[1]).unwrap(),
        &Point3::new(8.0 - slack - epsilon, 0.0, 0.0),
    )
    .unwrap();
    model.evaluate(false).unwrap();
    assert_eq!(list_of(&model), 2);
    let state = model.score_state::<NonbondedList>(list).unwrap();
    assert_eq!(state.candidates().len(), 1);
    assert!(state.pairs(model.particles()).unwrap().is_empty());

    model.evaluate(false).unwrap();
    assert_eq!(list_of(&model), 2);
}

#[test]
fn sub_slack_moves_never_lose_pairs_or_rebuild() {
    let mut rng = StdRng::seed_from_u64(7);
    let (cutoff, slack) = (4.0, 1.0);
    let mut scene = Scene::random(200, 30.0, cutoff, slack, 99);
    scene.model.evaluate(false).unwrap();
    let anchors: Vec<_> = scene.ids.iter().map(|&id| (id, scene.position(id))).collect();

    for _ in 0..10 {
        // Every particle stays within slack of where it was at the last rebuild.
        for &(id, anchor) in &anchors {
            let direction = Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            let offset = direction.normalize() * rng.gen_range(0.0..slack * 0.99);
            let current = scene.position(id);
            scene.translate(id, anchor + offset - current);
        }
        scene.model.evaluate(false).unwrap();
        assert_eq!(scene.list().rebuild_count(), 1);
        assert!(scene.list().is_valid());

        let reported = scene.reported_pairs();
        for pair in scene.true_pairs(cutoff) {
            assert!(reported.contains(&pair), "false negative {pair:?}");
        }
    }
}

#[test]
fn bonded_groups_are_excluded_after_the_next_rebuild() {
    let registry = KeyRegistry::shared();
    let keys = CoordinateKeys::new(&registry);
    let molecule = registry.int_key("molecule");
    let mut model = Model::new(registry.clone());
    let mut ids = Vec::new();
    for (i, group) in [0, 0, 1, 1].into_iter().enumerate() {
        let id = model.add_particle();
        let mut particle = model.particle_mut(id).unwrap();
        keys.add_position(&mut particle, &Point3::new(i as f64, 0.0, 0.0), true)
            .unwrap();
        particle.add_attribute(molecule, group).unwrap();
        ids.push(id);
    }
    let config = NonbondedConfigBuilder::new()
        .cutoff(10.0)
        .slack(1.0)
        .algorithm(NonbondedAlgorithm::Quadratic)
        .build()
        .unwrap();
    let mut list = NonbondedList::all(&registry, ids.clone(), config).unwrap();
    list.add_bonded_list(BondAttributeBondedList::new(molecule));
    let list = model.add_score_state(list);

    model.evaluate(false).unwrap();
    let pairs: HashSet<_> = model
        .score_state::<NonbondedList>(list)
        .unwrap()
        .pairs(model.particles())
        .unwrap()
        .into_iter()
        .map(normalized)
        .collect();
    assert_eq!(pairs.len(), 4);
    assert!(!pairs.contains(&normalized((ids[0], ids[1]))));
    assert!(!pairs.contains(&normalized((ids[2], ids[3]))));

    model.particle_mut(ids[1]).unwrap().set(molecule, 1).unwrap();
    model.evaluate(false).unwrap();
    let state = model.score_state::<NonbondedList>(list).unwrap();
    assert_eq!(state.rebuild_count(), 2);
    let pairs: HashSet<_> = state
        .pairs(model.particles())
        .unwrap()
        .into_iter()
        .map(normalized)
        .collect();
    assert!(pairs.contains(&normalized((ids[0], ids[1]))));
    assert!(!pairs.contains(&normalized((ids[1], ids[2]))));
}
