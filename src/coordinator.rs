//! Drives one benchmark run on one worker.
//!
//! Every worker calls [`run_worker`] with the same configuration. The root
//! owns the input and the transposed matrix; the others only hold the
//! partition buffers of the chosen strategy.

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fabric::Fabric;
use crate::matrix::random_matrix;
use crate::results::{ResultRecord, symmetry_gflops, transpose_bandwidth};
use crate::strategy::{AnyStrategy, Canonical, DEFAULT_TILE, ROOT, Strategy, StrategyKind};
use crate::timing::{ComputeTimer, Stopwatch};
use crate::verify::Verdict;

/// Repetitions used when none, or a non-positive number, is requested.
pub const DEFAULT_REPETITIONS: usize = 500;

/// Largest accepted exponent; 2^15 doubles per side is already 8 GiB.
pub const MAX_EXPONENT: u32 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// The matrix side is `2^exponent`.
    pub exponent: u32,
    pub repetitions: usize,
    /// Configured tile side for the tiled strategy.
    pub tile: usize,
    /// Seed for the input matrix; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            exponent: 4,
            repetitions: DEFAULT_REPETITIONS,
            tile: DEFAULT_TILE,
            seed: None,
        }
    }
}

impl RunConfig {
    pub fn new(exponent: u32, repetitions: usize) -> Self {
        Self {
            exponent,
            repetitions,
            ..Self::default()
        }
    }

    pub fn with_tile(self, tile: usize) -> Self {
        Self { tile, ..self }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    pub fn n(&self) -> usize {
        1 << self.exponent
    }

    pub fn validate(&self) -> Result<()> {
        if self.exponent > MAX_EXPONENT {
            return Err(Error::Config(format!(
                "exponent {} is above the maximum of {MAX_EXPONENT}",
                self.exponent
            )));
        }
        if self.repetitions == 0 {
            return Err(Error::Config("at least one repetition is required".into()));
        }
        Ok(())
    }
}

/// Mean seconds per repetition, taken at the root.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Timings {
    /// Symmetry check, message passing included.
    pub symmetry_mean: f64,
    /// Symmetry check, slowest worker's computation only.
    pub symmetry_compute: f64,
    pub transpose_mean: f64,
    pub transpose_compute: f64,
}

/// Everything the root knows after a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub kind: StrategyKind,
    pub n: usize,
    pub workers: usize,
    /// Effective tile side, for the tiled strategy.
    pub tile: Option<usize>,
    pub repetitions: usize,
    pub timings: Timings,
    pub verdict: Verdict,
    /// The gathered transpose.
    pub transposed: Vec<f64>,
}

impl RunReport {
    pub fn record(&self) -> ResultRecord {
        ResultRecord {
            code: self.kind.code().to_string(),
            n: self.n,
            workers: self.workers,
            t1_mean: self.timings.symmetry_mean,
            t1_excl_comm: self.timings.symmetry_compute,
            t2_mean: self.timings.transpose_mean,
            t2_excl_comm: self.timings.transpose_compute,
        }
    }

    /// Print the timing and verdict lines to stdout.
    pub fn print(&self) {
        let t = &self.timings;
        println!(
            "Parallel execution with {} (message passing included and excluded): symmetry: {}",
            self.kind, self.verdict.symmetric
        );
        println!(
            "checkSymmetry:\t{:.9}\t{:.9} seconds\t{:10.4} GFLOPS",
            t.symmetry_mean,
            t.symmetry_compute,
            symmetry_gflops(self.n, t.symmetry_mean)
        );
        println!(
            "transpose:\t{:.9}\t{:.9} seconds\t{:10.4} GB/s\t{:10.4} GB/s effective\n",
            t.transpose_mean,
            t.transpose_compute,
            transpose_bandwidth(self.n, t.transpose_mean),
            transpose_bandwidth(self.n, t.transpose_compute)
        );
        println!(
            "Tested results: symmetry {} and transposed {}.\n",
            self.verdict.symmetric,
            if self.verdict.transposed { "correct" } else { "incorrect" }
        );
    }
}

/// Run a benchmark with a random input generated at the root.
pub fn run_worker<F>(fabric: &F, kind: StrategyKind, config: &RunConfig) -> Result<Option<RunReport>>
where
    F: Fabric + ?Sized,
{
    let matrix = fabric
        .is_root(ROOT)
        .then(|| random_matrix(config.n(), config.seed));
    run_worker_on(fabric, kind, config, matrix)
}

/// Run a benchmark on `matrix`, which only the root supplies.
///
/// Returns `Some(report)` at the root and `None` elsewhere.
pub fn run_worker_on<F>(
    fabric: &F,
    kind: StrategyKind,
    config: &RunConfig,
    matrix: Option<Vec<f64>>,
) -> Result<Option<RunReport>>
where
    F: Fabric + ?Sized,
{
    config.validate()?;
    let n = config.n();
    let workers = fabric.size();
    let rank = fabric.rank();

    // Identical on every worker, so an invalid dimension stops all of them here.
    let mut strategy = AnyStrategy::build(kind, n, workers, config.tile, rank)?;
    let mut canon = match matrix {
        Some(matrix) if rank == ROOT => Some(Canonical::new(matrix, n)?),
        None if rank != ROOT => None,
        _ => {
            return Err(Error::Config(format!(
                "only rank {ROOT} may supply the input matrix"
            )));
        }
    };

    if rank == ROOT {
        info!(strategy = %kind, n, workers, tile = ?strategy.tile(), repetitions = config.repetitions, "starting run");
    }

    let mut symmetry_timer = ComputeTimer::new();
    let mut transpose_timer = ComputeTimer::new();
    let mut symmetric = None;

    fabric.barrier()?;
    let watch = Stopwatch::start();
    for _ in 0..config.repetitions {
        symmetric = strategy.check_symmetry(fabric, canon.as_mut(), &mut symmetry_timer)?;
    }
    let symmetry_wall = watch.seconds();

    fabric.barrier()?;
    let watch = Stopwatch::start();
    for _ in 0..config.repetitions {
        strategy.transpose(fabric, canon.as_mut(), &mut transpose_timer)?;
    }
    let transpose_wall = watch.seconds();

    fabric.barrier()?;
    debug!(
        rank,
        symmetry = symmetry_timer.seconds(),
        transpose = transpose_timer.seconds(),
        "local compute time"
    );
    let symmetry_compute = fabric.reduce_max(symmetry_timer.seconds(), ROOT)?;
    let transpose_compute = fabric.reduce_max(transpose_timer.seconds(), ROOT)?;

    let (Some(canon), Some(symmetry_compute), Some(transpose_compute)) =
        (canon, symmetry_compute, transpose_compute)
    else {
        return Ok(None);
    };

    let reps = config.repetitions as f64;
    let timings = Timings {
        symmetry_mean: symmetry_wall / reps,
        symmetry_compute: symmetry_compute / reps,
        transpose_mean: transpose_wall / reps,
        transpose_compute: transpose_compute / reps,
    };
    let verdict = Verdict::evaluate(
        &canon.matrix,
        &canon.transposed,
        n,
        symmetric.unwrap_or(false),
    );
    for failure in &verdict.failures {
        warn!(strategy = %kind, n, workers, %failure, "incorrect result");
    }

    Ok(Some(RunReport {
        kind,
        n,
        workers,
        tile: strategy.tile(),
        repetitions: config.repetitions,
        timings,
        verdict,
        transposed: canon.transposed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_huge_exponent_and_zero_repetitions() {
        assert!(RunConfig::new(16, 1).validate().is_err());
        assert!(RunConfig::new(4, 0).validate().is_err());
        assert!(RunConfig::new(4, 1).validate().is_ok());
        assert_eq!(RunConfig::new(3, 1).n(), 8);
    }
}
