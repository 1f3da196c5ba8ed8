use crate::cli::BenchArgs;
use crate::config::{BenchConfig, PartialRunConfig};
use crate::error::{CliError, Result};
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use modelkit::core::derivatives::DerivativeAccumulator;
use modelkit::core::error::ModelError;
use modelkit::core::ids::{ParticleId, ScoreStateId};
use modelkit::core::keys::KeyRegistry;
use modelkit::engine::context::ScoringContext;
use modelkit::engine::model::Model;
use modelkit::engine::traits::Restraint;
use modelkit::spatial::coordinates::{CoordinateKeys, radius_key};
use modelkit::spatial::nonbonded::NonbondedList;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Scores the number of pairs the nonbonded list reports within cutoff.
struct PairCountRestraint {
    list: ScoreStateId,
}

impl Restraint for PairCountRestraint {
    fn name(&self) -> &str {
        "PairCount"
    }

    fn evaluate(
        &mut self,
        context: &mut ScoringContext<'_>,
        _accumulator: Option<&DerivativeAccumulator>,
    ) -> std::result::Result<f64, ModelError> {
        let list = context.score_state::<NonbondedList>(self.list)?;
        let mut count = 0usize;
        for pair in list.iterate_pairs(context.particles())? {
            pair?;
            count += 1;
        }
        Ok(count as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchReport {
    pub particles: usize,
    pub steps: usize,
    pub rebuilds: usize,
    pub mean_candidates: f64,
    pub mean_pairs: f64,
    pub elapsed: Duration,
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let per_step = if self.steps == 0 {
            0.0
        } else {
            self.elapsed.as_secs_f64() * 1e3 / self.steps as f64
        };
        writeln!(f, "Particles:        {}", self.particles)?;
        writeln!(f, "Steps:            {}", self.steps)?;
        writeln!(f, "Rebuilds:         {}", self.rebuilds)?;
        writeln!(f, "Mean candidates:  {:.1}", self.mean_candidates)?;
        writeln!(f, "Mean pairs:       {:.1}", self.mean_pairs)?;
        write!(f, "Time per step:    {per_step:.3} ms")
    }
}

struct BenchSystem {
    model: Model,
    keys: CoordinateKeys,
    ids: Vec<ParticleId>,
    list: ScoreStateId,
}

fn build_system(config: &BenchConfig, rng: &mut StdRng) -> Result<BenchSystem> {
    let registry = KeyRegistry::shared();
    let keys = CoordinateKeys::new(&registry);
    let radius = (config.system.radius > 0.0).then(|| radius_key(&registry));
    let mut model = Model::new(registry.clone());

    let size = config.system.box_size;
    let mut ids = Vec::with_capacity(config.system.particles);
    for _ in 0..config.system.particles {
        let id = model.add_particle();
        let point = Point3::new(
            rng.gen_range(0.0..size),
            rng.gen_range(0.0..size),
            rng.gen_range(0.0..size),
        );
        let mut particle = model.particle_mut(id)?;
        keys.add_position(&mut particle, &point, true)?;
        if let Some(key) = radius {
            particle.add_float_attribute(key, config.system.radius, false)?;
        }
        ids.push(id);
    }

    let mut list = NonbondedList::all(&registry, ids.clone(), config.nonbonded.clone())?;
    if let Some(key) = radius {
        list = list.with_radius_key(key);
    }
    let list = model.add_score_state(list);
    model.add_restraint(PairCountRestraint { list });

    Ok(BenchSystem {
        model,
        keys,
        ids,
        list,
    })
}

fn perturb(system: &mut BenchSystem, step_size: f64, rng: &mut StdRng) -> Result<()> {
    if step_size <= 0.0 {
        return Ok(());
    }
    for &id in &system.ids {
        let offset = Vector3::new(
            rng.gen_range(-step_size..=step_size),
            rng.gen_range(-step_size..=step_size),
            rng.gen_range(-step_size..=step_size),
        );
        let mut particle = system.model.particle_mut(id)?;
        let target = system.keys.position(&particle.view())? + offset;
        system.keys.set_position(&mut particle, &target)?;
    }
    Ok(())
}

#[instrument(skip_all, fields(particles = config.system.particles, steps = config.run.steps))]
pub fn run_benchmark(config: &BenchConfig, progress: &ProgressBar) -> Result<BenchReport> {
    let mut rng = StdRng::seed_from_u64(config.system.seed);
    let mut system = build_system(config, &mut rng)?;

    let start = Instant::now();
    let mut candidates = 0usize;
    let mut pairs = 0.0;
    for _ in 0..config.run.steps {
        perturb(&mut system, config.run.step_size, &mut rng)?;
        pairs += system.model.evaluate(false)?;
        candidates += system
            .model
            .score_state::<NonbondedList>(system.list)?
            .candidate_count();
        progress.inc(1);
    }
    let elapsed = start.elapsed();

    let list = system.model.score_state::<NonbondedList>(system.list)?;
    let steps = config.run.steps.max(1) as f64;
    Ok(BenchReport {
        particles: config.system.particles,
        steps: config.run.steps,
        rebuilds: list.rebuild_count(),
        mean_candidates: candidates as f64 / steps,
        mean_pairs: pairs / steps,
        elapsed,
    })
}

fn bar_style() -> Result<ProgressStyle> {
    let style = ProgressStyle::with_template("{msg:<20} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .map_err(|e| CliError::Other(e.into()))?
        .with_key("eta", |state: &ProgressState, w: &mut dyn fmt::Write| {
            let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
        })
        .progress_chars("━╸ ");
    Ok(style)
}

pub fn run(args: BenchArgs, quiet: bool) -> Result<()> {
    let config = PartialRunConfig::load(args.config.as_deref())?.merge_with_cli(&args)?;
    info!(
        particles = config.system.particles,
        cutoff = config.nonbonded.cutoff,
        slack = config.nonbonded.slack,
        "Starting benchmark"
    );

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(config.run.steps as u64)
    };
    progress.set_style(bar_style()?);
    progress.set_message("Evaluating");

    let report = run_benchmark(&config, &progress)?;
    progress.finish_and_clear();

    println!("{report}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunSettings, SystemConfig};
    use modelkit::engine::config::{NonbondedAlgorithm, NonbondedConfigBuilder};

    fn config(algorithm: NonbondedAlgorithm, step_size: f64) -> BenchConfig {
        BenchConfig {
            system: SystemConfig {
                particles: 200,
                box_size: 20.0,
                radius: 0.0,
                seed: 7,
            },
            nonbonded: NonbondedConfigBuilder::new()
                .cutoff(3.0)
                .slack(0.5)
                .algorithm(algorithm)
                .build()
                .unwrap(),
            run: RunSettings {
                steps: 10,
                step_size,
            },
        }
    }

    #[test]
    fn static_system_rebuilds_once() {
        let report = run_benchmark(&config(NonbondedAlgorithm::Grid, 0.0), &ProgressBar::hidden())
            .unwrap();
        assert_eq!(report.steps, 10);
        assert_eq!(report.rebuilds, 1);
        assert!(report.mean_candidates >= report.mean_pairs);
    }

    #[test]
    fn algorithms_report_identical_statistics() {
        let grid = run_benchmark(&config(NonbondedAlgorithm::Grid, 0.2), &ProgressBar::hidden())
            .unwrap();
        let quadratic =
            run_benchmark(&config(NonbondedAlgorithm::Quadratic, 0.2), &ProgressBar::hidden())
                .unwrap();
        assert_eq!(grid.rebuilds, quadratic.rebuilds);
        assert_eq!(grid.mean_pairs, quadratic.mean_pairs);
        assert_eq!(grid.mean_candidates, quadratic.mean_candidates);
        assert!(grid.rebuilds > 1);
    }

    #[test]
    fn overflow_surfaces_as_model_error() {
        let mut config = config(NonbondedAlgorithm::Grid, 0.0);
        config.nonbonded.max_candidates = Some(1);
        let result = run_benchmark(&config, &ProgressBar::hidden());
        assert!(matches!(
            result,
            Err(CliError::Model(ModelError::NonbondedOverflow { max: 1 }))
        ));
    }

    #[test]
    fn report_lists_statistics() {
        let report = BenchReport {
            particles: 10,
            steps: 4,
            rebuilds: 2,
            mean_candidates: 12.0,
            mean_pairs: 3.5,
            elapsed: Duration::from_millis(8),
        };
        let text = report.to_string();
        assert!(text.contains("Rebuilds:         2"));
        assert!(text.contains("Mean pairs:       3.5"));
        assert!(text.contains("2.000 ms"));
    }
}
