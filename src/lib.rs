//! Distributed symmetry check and matrix transpose over collective operations.
//!
//! A fixed group of workers shares an n×n row-major matrix owned by rank 0.
//! Three strategies decide how it is cut up and moved around, all written
//! against the same small set of collectives (broadcast, scatter, gather,
//! reduce, barrier):
//!
//! - **Replicated**: broadcast everything, each worker works on its rows
//! - **Row/column**: scatter row chunks and column chunks through strided layouts
//! - **Tiled**: scatter square tiles, transpose them in place, gather them back
//!
//! ## Usage
//!
//! ```
//! use collective_transpose::{StrategyKind, transpose_distributed};
//!
//! let n = 8;
//! let m: Vec<f64> = (0..n * n).map(|v| v as f64).collect();
//! let mut t = vec![0.0; n * n];
//!
//! transpose_distributed(&m, &mut t, n, 4, StrategyKind::RowColumn).unwrap();
//! assert_eq!(t[1], m[n]);
//! ```
//!
//! The workers above are threads of the calling process. To benchmark, use
//! [`coordinator::run_worker`] on any [`Fabric`], or one of the
//! `transpose-*` executables.

pub mod cli;
pub mod coordinator;
pub mod error;
pub mod fabric;
pub mod layout;
pub mod matrix;
pub mod results;
pub mod strategy;
pub mod timing;
pub mod verify;

pub use error::{Error, Result};
pub use fabric::{Fabric, LocalWorld};
pub use layout::StridedLayout;
pub use matrix::EPSILON;
pub use strategy::{DEFAULT_TILE, StrategyKind};

use strategy::{AnyStrategy, Canonical, ROOT, Strategy};
use timing::ComputeTimer;

/// Build `kind` on `workers` local workers, hand the root a copy of
/// `matrix`, and return what `phase` produces at the root.
fn run_local<T, P>(
    matrix: &[f64],
    n: usize,
    workers: usize,
    kind: StrategyKind,
    tile: usize,
    phase: P,
) -> Result<T>
where
    T: Send,
    P: Fn(&mut AnyStrategy, &fabric::LocalFabric, Option<&mut Canonical>) -> Result<Option<T>> + Sync,
{
    assert_eq!(matrix.len(), n * n, "M: expected {}x{}={} elements", n, n, n * n);
    if workers == 0 {
        return Err(Error::Config("at least one worker is required".into()));
    }

    let results = LocalWorld::new(workers).run(|fabric| {
        let mut strategy = AnyStrategy::build(kind, n, workers, tile, fabric.rank())?;
        let mut canon = if fabric.is_root(ROOT) {
            Some(Canonical::new(matrix.to_vec(), n)?)
        } else {
            None
        };
        phase(&mut strategy, fabric, canon.as_mut())
    });

    match results.into_iter().nth(ROOT) {
        Some(Ok(Some(out))) => Ok(out),
        Some(Err(err)) => Err(err),
        _ => Err(Error::Config("the root produced no result".into())),
    }
}

/// Distributed transpose: t = m^T
///
/// Runs `kind` once on `workers` threads. The tiled strategy uses
/// [`DEFAULT_TILE`]; see [`transpose_tiled`] to pick the tile.
///
/// # Panics
///
/// Panics if the slice sizes don't match n.
pub fn transpose_distributed(
    m: &[f64],
    t: &mut [f64],
    n: usize,
    workers: usize,
    kind: StrategyKind,
) -> Result<()> {
    transpose_with(m, t, n, workers, kind, DEFAULT_TILE)
}

/// Same as [`transpose_distributed`] with the tiled strategy and a chosen tile side.
///
/// The effective tile is `min(tile, n / workers)`.
pub fn transpose_tiled(m: &[f64], t: &mut [f64], n: usize, workers: usize, tile: usize) -> Result<()> {
    transpose_with(m, t, n, workers, StrategyKind::Tiled, tile)
}

fn transpose_with(
    m: &[f64],
    t: &mut [f64],
    n: usize,
    workers: usize,
    kind: StrategyKind,
    tile: usize,
) -> Result<()> {
    assert_eq!(t.len(), n * n, "T: expected {}x{}={} elements", n, n, n * n);
    let transposed = run_local(m, n, workers, kind, tile, |strategy, fabric, canon| {
        let mut timer = ComputeTimer::new();
        match canon {
            Some(canon) => {
                strategy.transpose(fabric, Some(&mut *canon), &mut timer)?;
                Ok(Some(std::mem::take(&mut canon.transposed)))
            }
            None => {
                strategy.transpose(fabric, None, &mut timer)?;
                Ok(None)
            }
        }
    })?;
    t.copy_from_slice(&transposed);
    Ok(())
}

/// Distributed symmetry check within [`EPSILON`].
///
/// # Panics
///
/// Panics if the slice size doesn't match n.
pub fn is_symmetric_distributed(
    m: &[f64],
    n: usize,
    workers: usize,
    kind: StrategyKind,
) -> Result<bool> {
    run_local(m, n, workers, kind, DEFAULT_TILE, |strategy, fabric, canon| {
        strategy.check_symmetry(fabric, canon, &mut ComputeTimer::new())
    })
}
