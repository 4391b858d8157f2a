//! Distribution strategies for the symmetry check and the transpose.
//!
//! All three run the same phases on every worker (distribute, compute locally,
//! gather or reduce) and differ in how the matrix is cut up:
//! - `replicated`: every worker receives the whole matrix (code `M`)
//! - `row_column`: row chunks and column chunks through strided layouts (code `MC`)
//! - `tiled`: square tiles, transposed tile by tile (code `MB`)
//!
//! Partition buffers and layout descriptors are created once by each
//! strategy's constructor and reused for every repetition.

pub mod replicated;
pub mod row_column;
pub mod tiled;

use std::fmt;

use crate::error::{Error, Result, try_zeroed};
use crate::fabric::Fabric;
use crate::timing::ComputeTimer;

pub use replicated::Replicated;
pub use row_column::RowColumn;
pub use tiled::{TilePlan, Tiled};

/// Rank that owns the canonical matrices.
pub const ROOT: usize = 0;

/// Tile side used by the tiled strategy unless configured otherwise.
pub const DEFAULT_TILE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Replicated,
    RowColumn,
    Tiled,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Replicated,
        StrategyKind::RowColumn,
        StrategyKind::Tiled,
    ];

    /// Code written in the first column of the results file.
    pub fn code(self) -> &'static str {
        match self {
            StrategyKind::Replicated => "M",
            StrategyKind::RowColumn => "MC",
            StrategyKind::Tiled => "MB",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Replicated => "replicated broadcast",
            StrategyKind::RowColumn => "row/column layouts",
            StrategyKind::Tiled => "block-tiled",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Row-block partition: `n / workers` consecutive rows per worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    n: usize,
    workers: usize,
}

impl Plan {
    /// Every worker evaluates this identically, so an indivisible dimension
    /// stops all of them before the first collective.
    pub fn new(n: usize, workers: usize) -> Result<Self> {
        if n == 0 || workers == 0 {
            return Err(Error::Config(format!(
                "matrix dimension ({n}) and worker count ({workers}) must be positive"
            )));
        }
        if n % workers != 0 {
            return Err(Error::Config(format!(
                "the matrix dimension ({n}) must be divisible by the number of workers ({workers})"
            )));
        }
        Ok(Self { n, workers })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Rows owned by one worker.
    pub fn chunk(&self) -> usize {
        self.n / self.workers
    }

    /// Global rows `[start, end)` owned by `rank`.
    pub fn rows_of(&self, rank: usize) -> std::ops::Range<usize> {
        rank * self.chunk()..(rank + 1) * self.chunk()
    }

    /// Owning worker and offset inside its `chunk × n` row buffer.
    pub fn locate(&self, row: usize, col: usize) -> (usize, usize) {
        let chunk = self.chunk();
        (row / chunk, (row % chunk) * self.n + col)
    }
}

/// Matrices owned by the root worker for the whole run.
pub struct Canonical {
    pub matrix: Vec<f64>,
    pub transposed: Vec<f64>,
}

impl Canonical {
    /// Take ownership of `matrix` and allocate a same-sized transpose target.
    pub fn new(matrix: Vec<f64>, n: usize) -> Result<Self> {
        if matrix.len() != n * n {
            return Err(Error::Config(format!(
                "input holds {} elements, expected {n}x{n}",
                matrix.len()
            )));
        }
        let transposed = try_zeroed(ROOT, n * n, "transposed matrix")?;
        Ok(Self { matrix, transposed })
    }
}

/// One way of distributing the matrix. Every method is a collective: all
/// workers must call it, the root passing the canonical matrices.
pub trait Strategy {
    fn kind(&self) -> StrategyKind;

    /// Tolerance-based symmetry check. `Some(verdict)` at the root only.
    fn check_symmetry<F: Fabric + ?Sized>(
        &mut self,
        fabric: &F,
        canon: Option<&mut Canonical>,
        timer: &mut ComputeTimer,
    ) -> Result<Option<bool>>;

    /// Transpose the root's matrix into `canon.transposed`.
    fn transpose<F: Fabric + ?Sized>(
        &mut self,
        fabric: &F,
        canon: Option<&mut Canonical>,
        timer: &mut ComputeTimer,
    ) -> Result<()>;
}

/// Any of the three strategies, chosen at run time.
pub enum AnyStrategy {
    Replicated(Replicated),
    RowColumn(RowColumn),
    Tiled(Tiled),
}

impl AnyStrategy {
    /// Validate the partition and allocate this worker's buffers.
    pub fn build(kind: StrategyKind, n: usize, workers: usize, tile: usize, rank: usize) -> Result<Self> {
        let plan = Plan::new(n, workers)?;
        Ok(match kind {
            StrategyKind::Replicated => AnyStrategy::Replicated(Replicated::new(plan, rank)?),
            StrategyKind::RowColumn => AnyStrategy::RowColumn(RowColumn::new(plan, rank)?),
            StrategyKind::Tiled => AnyStrategy::Tiled(Tiled::new(TilePlan::new(plan, tile)?, rank)?),
        })
    }

    /// Effective tile side, for the tiled strategy.
    pub fn tile(&self) -> Option<usize> {
        match self {
            AnyStrategy::Tiled(tiled) => Some(tiled.plan().tile()),
            _ => None,
        }
    }
}

impl Strategy for AnyStrategy {
    fn kind(&self) -> StrategyKind {
        match self {
            AnyStrategy::Replicated(s) => s.kind(),
            AnyStrategy::RowColumn(s) => s.kind(),
            AnyStrategy::Tiled(s) => s.kind(),
        }
    }

    fn check_symmetry<F: Fabric + ?Sized>(
        &mut self,
        fabric: &F,
        canon: Option<&mut Canonical>,
        timer: &mut ComputeTimer,
    ) -> Result<Option<bool>> {
        match self {
            AnyStrategy::Replicated(s) => s.check_symmetry(fabric, canon, timer),
            AnyStrategy::RowColumn(s) => s.check_symmetry(fabric, canon, timer),
            AnyStrategy::Tiled(s) => s.check_symmetry(fabric, canon, timer),
        }
    }

    fn transpose<F: Fabric + ?Sized>(
        &mut self,
        fabric: &F,
        canon: Option<&mut Canonical>,
        timer: &mut ComputeTimer,
    ) -> Result<()> {
        match self {
            AnyStrategy::Replicated(s) => s.transpose(fabric, canon, timer),
            AnyStrategy::RowColumn(s) => s.transpose(fabric, canon, timer),
            AnyStrategy::Tiled(s) => s.transpose(fabric, canon, timer),
        }
    }
}

/// The root must bring the canonical matrices, nobody else may.
pub(crate) fn expect_canonical<F: Fabric + ?Sized>(
    fabric: &F,
    canon: &Option<&mut Canonical>,
) -> Result<()> {
    if fabric.is_root(ROOT) != canon.is_some() {
        return Err(Error::Config(format!(
            "rank {} {} the canonical matrices",
            fabric.rank(),
            if canon.is_some() { "must not own" } else { "must own" }
        )));
    }
    Ok(())
}
