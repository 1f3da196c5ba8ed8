use crate::cli::BenchArgs;
use crate::error::{CliError, Result};
use modelkit::engine::config::{NonbondedAlgorithm, NonbondedConfig, NonbondedConfigBuilder};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

const DEFAULT_PARTICLES: usize = 1000;
const DEFAULT_BOX_SIZE: f64 = 50.0;
const DEFAULT_SEED: u64 = 42;
const DEFAULT_STEPS: usize = 100;
const DEFAULT_STEP_SIZE: f64 = 0.1;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialSystemConfig {
    particles: Option<usize>,
    #[serde(rename = "box-size")]
    box_size: Option<f64>,
    radius: Option<f64>,
    seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialNonbondedConfig {
    cutoff: Option<f64>,
    slack: Option<f64>,
    #[serde(rename = "max-candidates")]
    max_candidates: Option<usize>,
    algorithm: Option<NonbondedAlgorithm>,
    #[serde(rename = "target-occupancy")]
    target_occupancy: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialRunSection {
    steps: Option<usize>,
    #[serde(rename = "step-size")]
    step_size: Option<f64>,
}

/// A run file as written on disk; every field may be overridden on the command line.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    system: Option<PartialSystemConfig>,
    nonbonded: Option<PartialNonbondedConfig>,
    run: Option<PartialRunSection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfig {
    pub particles: usize,
    pub box_size: f64,
    pub radius: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub steps: usize,
    pub step_size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    pub system: SystemConfig,
    pub nonbonded: NonbondedConfig,
    pub run: RunSettings,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading run configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn merge_with_cli(self, args: &BenchArgs) -> Result<BenchConfig> {
        let system = self.system.unwrap_or_default();
        let nonbonded = self.nonbonded.unwrap_or_default();
        let run = self.run.unwrap_or_default();

        let system = SystemConfig {
            particles: args
                .particles
                .or(system.particles)
                .unwrap_or(DEFAULT_PARTICLES),
            box_size: args
                .box_size
                .or(system.box_size)
                .unwrap_or(DEFAULT_BOX_SIZE),
            radius: args.radius.or(system.radius).unwrap_or(0.0),
            seed: args.seed.or(system.seed).unwrap_or(DEFAULT_SEED),
        };
        if !(system.box_size.is_finite() && system.box_size > 0.0) {
            return Err(CliError::Config(format!(
                "`system.box-size` must be positive, got {}",
                system.box_size
            )));
        }
        if !(system.radius.is_finite() && system.radius >= 0.0) {
            return Err(CliError::Config(format!(
                "`system.radius` must be non-negative, got {}",
                system.radius
            )));
        }

        let mut builder = NonbondedConfigBuilder::new();
        if let Some(cutoff) = args.cutoff.or(nonbonded.cutoff) {
            builder = builder.cutoff(cutoff);
        }
        if let Some(slack) = args.slack.or(nonbonded.slack) {
            builder = builder.slack(slack);
        }
        if let Some(max) = args.max_candidates.or(nonbonded.max_candidates) {
            builder = builder.max_candidates(max);
        }
        if let Some(algorithm) = args.algorithm.map(Into::into).or(nonbonded.algorithm) {
            builder = builder.algorithm(algorithm);
        }
        if let Some(occupancy) = nonbonded.target_occupancy {
            builder = builder.target_occupancy(occupancy);
        }
        let nonbonded = builder
            .build()
            .map_err(|e| CliError::Config(format!("[nonbonded] {e}")))?;

        let run = RunSettings {
            steps: args.steps.or(run.steps).unwrap_or(DEFAULT_STEPS),
            step_size: args
                .step_size
                .or(run.step_size)
                .unwrap_or(DEFAULT_STEP_SIZE),
        };
        if !(run.step_size.is_finite() && run.step_size >= 0.0) {
            return Err(CliError::Config(format!(
                "`run.step-size` must be non-negative, got {}",
                run.step_size
            )));
        }

        Ok(BenchConfig {
            system,
            nonbonded,
            run,
        })
    }
}
