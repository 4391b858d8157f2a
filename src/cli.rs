//! Command line shared by the three strategy executables.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use tracing::{error, warn};

use crate::coordinator::{DEFAULT_REPETITIONS, RunConfig, RunReport, run_worker};
use crate::error::{Error, Result};
use crate::fabric::LocalWorld;
use crate::results::RESULTS_FILE;
use crate::strategy::{DEFAULT_TILE, ROOT, StrategyKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FabricKind {
    /// Logical workers on threads of this process
    Local,
    /// One worker per MPI process (needs the `mpi` feature)
    Mpi,
}

/// Benchmark a distributed symmetry check and matrix transpose
#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Matrix dimension as exponent of 2 (n = 2^EXPONENT)
    pub exponent: u32,

    /// Number of repetitions of each timed phase; values below 1 use the default
    #[arg(default_value_t = DEFAULT_REPETITIONS as i64, allow_negative_numbers = true)]
    pub repetitions: i64,

    /// Number of workers on the local fabric
    #[arg(short = 'p', long, default_value_t = 4)]
    pub workers: usize,

    /// Tile side for the block-tiled strategy
    #[arg(short, long, default_value_t = DEFAULT_TILE)]
    pub tile: usize,

    /// File the results record is appended to
    #[arg(long, default_value = RESULTS_FILE)]
    pub results: PathBuf,

    #[arg(long, value_enum, default_value_t = FabricKind::Local)]
    pub fabric: FabricKind,

    /// Seed for the random input matrix
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log every collective
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn config(&self) -> RunConfig {
        let repetitions = usize::try_from(self.repetitions)
            .ok()
            .filter(|r| *r > 0)
            .unwrap_or(DEFAULT_REPETITIONS);
        RunConfig {
            exponent: self.exponent,
            repetitions,
            tile: self.tile,
            seed: self.seed,
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse the command line, run `kind` and return the process exit status.
pub fn run_cli(kind: StrategyKind) -> i32 {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => Error::Usage(err.to_string()).exit_code(),
            };
            let _ = err.print();
            return code;
        }
    };
    init_tracing(args.verbose);

    match run(kind, &args) {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err, "run failed");
            println!("Error: {err}");
            err.exit_code()
        }
    }
}

fn run(kind: StrategyKind, args: &Args) -> Result<()> {
    let config = args.config();
    config.validate()?;

    match args.fabric {
        FabricKind::Local => run_local(kind, args, &config),
        FabricKind::Mpi => run_mpi(kind, args, &config),
    }
}

fn print_banner(kind: StrategyKind, config: &RunConfig, workers: usize) {
    println!("Strategy: {kind}");
    println!("Matrix dimension: {}", config.n());
    println!("Repetitions: {}", config.repetitions);
    println!("Processes: {workers}");
    if kind == StrategyKind::Tiled {
        println!("Tile size: {}", config.tile);
    }
    println!();
}

fn finish(report: &RunReport, args: &Args) {
    report.print();
    if let Err(err) = report.record().append_to(&args.results) {
        warn!(error = %err, "results not saved");
        println!("Error in saving results!\n");
    }
}

fn run_local(kind: StrategyKind, args: &Args, config: &RunConfig) -> Result<()> {
    if args.workers == 0 {
        return Err(Error::Config("at least one worker is required".into()));
    }
    print_banner(kind, config, args.workers);

    let mut results = LocalWorld::new(args.workers)
        .run(|fabric| run_worker(fabric, kind, config))
        .into_iter();

    // Every rank fails with the same or a derived error; the root's is the one to report.
    match results.nth(ROOT) {
        Some(Ok(Some(report))) => {
            finish(&report, args);
            Ok(())
        }
        Some(Err(err)) => Err(err),
        Some(Ok(None)) | None => Err(Error::Config("the root produced no report".into())),
    }
}

#[cfg(feature = "mpi")]
fn run_mpi(kind: StrategyKind, args: &Args, config: &RunConfig) -> Result<()> {
    use crate::fabric::{Fabric, abort_on_error, mpi::MpiFabric};

    let fabric = MpiFabric::initialize()?;
    if fabric.is_root(ROOT) {
        print_banner(kind, config, fabric.size());
    }
    let result = match run_worker(&fabric, kind, config) {
        // Decided identically everywhere, every process leaves on its own.
        Err(err @ Error::Config(_)) => Err(err),
        other => abort_on_error(&fabric, other),
    };
    if let Some(report) = result? {
        finish(&report, args);
    }
    Ok(())
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(_kind: StrategyKind, _args: &Args, _config: &RunConfig) -> Result<()> {
    Err(Error::Environment(
        "compile with MPI support (cargo feature `mpi`)".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repetitions_fall_back_to_default() {
        let args = Args::try_parse_from(["transpose", "3", "-5"]).unwrap();
        assert_eq!(args.config().repetitions, DEFAULT_REPETITIONS);

        let args = Args::try_parse_from(["transpose", "3", "7", "-p", "2"]).unwrap();
        assert_eq!(args.config().repetitions, 7);
        assert_eq!(args.workers, 2);
        assert_eq!(args.config().n(), 8);
    }

    #[test]
    fn missing_exponent_is_a_usage_error() {
        let err = Args::try_parse_from(["transpose"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(Error::Usage(err.to_string()).exit_code(), 1);
    }

    #[test]
    fn mpi_without_runtime_is_an_environment_error() {
        if cfg!(feature = "mpi") {
            return;
        }
        let args = Args::try_parse_from(["transpose", "2", "1", "--fabric", "mpi"]).unwrap();
        let err = run(StrategyKind::Replicated, &args).unwrap_err();
        assert!(matches!(err, Error::Environment(_)));
        assert_eq!(err.exit_code(), -1);
    }

    #[test]
    fn indivisible_dimension_fails_on_every_worker() {
        let args = Args::try_parse_from(["transpose", "2", "1", "-p", "3"]).unwrap();
        let err = run(StrategyKind::RowColumn, &args).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
