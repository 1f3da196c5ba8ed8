use clap::{Args, Parser, Subcommand, ValueEnum};
use modelkit::engine::config::NonbondedAlgorithm;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "modelkit CLI - drives the modelkit kernel on synthetic particle systems to exercise and tune its neighbor lists.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output and progress bars
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run repeated model evaluations over a randomly perturbed particle cloud and report nonbonded-list statistics.
    Bench(BenchArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmArg {
    Grid,
    Quadratic,
}

impl From<AlgorithmArg> for NonbondedAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Grid => NonbondedAlgorithm::Grid,
            AlgorithmArg::Quadratic => NonbondedAlgorithm::Quadratic,
        }
    }
}

/// Arguments for the `bench` subcommand.
#[derive(Args, Debug)]
pub struct BenchArgs {
    /// Path to a run configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    // --- System Overrides ---
    /// Override the number of particles.
    #[arg(short = 'n', long, value_name = "INT")]
    pub particles: Option<usize>,

    /// Override the edge length of the cubic box particles are placed in.
    #[arg(long, value_name = "FLOAT")]
    pub box_size: Option<f64>,

    /// Override the particle radius (0 disables radius tracking).
    #[arg(long, value_name = "FLOAT")]
    pub radius: Option<f64>,

    /// Override the random seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    // --- Nonbonded Overrides ---
    /// Override the pair distance cutoff.
    #[arg(long, value_name = "FLOAT")]
    pub cutoff: Option<f64>,

    /// Override the slack distance.
    #[arg(long, value_name = "FLOAT")]
    pub slack: Option<f64>,

    /// Override the maximum candidate-list size.
    #[arg(long, value_name = "INT")]
    pub max_candidates: Option<usize>,

    /// Override the candidate search algorithm.
    #[arg(long, value_enum)]
    pub algorithm: Option<AlgorithmArg>,

    // --- Run Overrides ---
    /// Override the number of evaluation steps.
    #[arg(short, long, value_name = "INT")]
    pub steps: Option<usize>,

    /// Override the largest per-axis displacement applied to each particle per step.
    #[arg(long, value_name = "FLOAT")]
    pub step_size: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bench_overrides() {
        let cli = Cli::parse_from([
            "modelkit",
            "-vv",
            "bench",
            "-n",
            "500",
            "--cutoff",
            "4.5",
            "--algorithm",
            "quadratic",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Bench(args) = cli.command;
        assert_eq!(args.particles, Some(500));
        assert_eq!(args.cutoff, Some(4.5));
        assert_eq!(args.algorithm, Some(AlgorithmArg::Quadratic));
        assert_eq!(args.config, None);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["modelkit", "-q", "-v", "bench"]);
        assert!(result.is_err());
    }
}
