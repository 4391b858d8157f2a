//! Communication fabric: a fixed group of workers running synchronous collectives.
//!
//! Strategies are written against the [`Fabric`] trait only. Two backends
//! implement it:
//! - `local`: logical workers on threads of one process, used by the tests and
//!   by default from the command line
//! - `mpi` (cargo feature `mpi`): one worker per MPI process
//!
//! Every collective is a synchronization point. No worker returns from a
//! collective before all workers have entered it.

pub mod local;
#[cfg(feature = "mpi")]
pub mod mpi;

use crate::error::{Error, Result};
use crate::layout::{LayoutError, StridedLayout};

pub use local::{LocalFabric, LocalWorld};

/// Associative, commutative folds available to [`Fabric::reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Logical AND over values encoded as `0.0` (false) and `1.0` (true).
    LogicalAnd,
    Max,
}

impl ReduceOp {
    pub fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::LogicalAnd => encode_flag(decode_flag(a) && decode_flag(b)),
            ReduceOp::Max => a.max(b),
        }
    }

    /// Neutral element of the fold.
    pub fn identity(self) -> f64 {
        match self {
            ReduceOp::LogicalAnd => 1.0,
            ReduceOp::Max => f64::NEG_INFINITY,
        }
    }

    pub fn fold(self, values: impl IntoIterator<Item = f64>) -> f64 {
        values
            .into_iter()
            .fold(self.identity(), |acc, v| self.combine(acc, v))
    }
}

pub(crate) fn encode_flag(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

pub(crate) fn decode_flag(value: f64) -> bool {
    value != 0.0
}

/// The closed set of operations a worker can enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collective {
    Broadcast,
    Scatter,
    Gather,
    Reduce(ReduceOp),
    Barrier,
}

/// `units` transfer units of `layout`, read from `data`.
#[derive(Clone, Copy)]
pub struct Region<'a> {
    pub data: &'a [f64],
    pub layout: &'a StridedLayout,
    pub units: usize,
}

/// `units` transfer units of `layout`, written into `data`.
pub struct RegionMut<'a> {
    pub data: &'a mut [f64],
    pub layout: &'a StridedLayout,
    pub units: usize,
}

impl<'a> Region<'a> {
    pub fn new(data: &'a [f64], layout: &'a StridedLayout, units: usize) -> Self {
        Self { data, layout, units }
    }

    pub fn elements(&self) -> usize {
        self.units * self.layout.elements()
    }
}

impl<'a> RegionMut<'a> {
    pub fn new(data: &'a mut [f64], layout: &'a StridedLayout, units: usize) -> Self {
        Self { data, layout, units }
    }

    pub fn elements(&self) -> usize {
        self.units * self.layout.elements()
    }
}

/// Send and receive sides of one rank's share must carry the same number of elements.
pub(crate) fn check_signature(send: usize, recv: usize) -> Result<()> {
    if send != recv {
        return Err(LayoutError::SignatureMismatch { send, recv }.into());
    }
    Ok(())
}

/// A fixed group of `size()` workers exchanging `f64` data.
///
/// Layout-aware operations take a [`Region`] per side: the root describes the
/// whole matrix with one descriptor while each worker receives into its own
/// buffer with another, and the data is reshaped in transit.
pub trait Fabric {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// After return every worker's `buf` holds the root's contents.
    fn broadcast(&self, buf: &mut [f64], root: usize) -> Result<()>;

    /// Hand rank `r` units `[r * recv.units, (r + 1) * recv.units)` of the root's `send`.
    ///
    /// `send` is only read at the root; other ranks pass `None`.
    fn scatter_layout(&self, send: Option<Region<'_>>, recv: RegionMut<'_>, root: usize) -> Result<()>;

    /// Inverse of [`scatter_layout`](Self::scatter_layout): rank `r`'s units land at
    /// units `[r * recv.units, (r + 1) * recv.units)` of the root's `recv`.
    fn gather_layout(&self, send: Region<'_>, recv: Option<RegionMut<'_>>, root: usize) -> Result<()>;

    /// Fold every worker's `value` with `op`. Only the root gets `Some`.
    fn reduce(&self, value: f64, op: ReduceOp, root: usize) -> Result<Option<f64>>;

    fn barrier(&self) -> Result<()>;

    /// Abandon the run. Peers blocked in, or later entering, a collective fail
    /// instead of waiting forever.
    fn abort(&self, reason: &str);

    fn is_root(&self, root: usize) -> bool {
        self.rank() == root
    }

    /// Contiguous scatter: each rank receives `recv.len()` consecutive elements.
    fn scatter(&self, send: Option<&[f64]>, recv: &mut [f64], root: usize) -> Result<()> {
        let layout = StridedLayout::contiguous(recv.len());
        let send = send.map(|data| Region::new(data, &layout, 1));
        self.scatter_layout(send, RegionMut::new(recv, &layout, 1), root)
    }

    /// Contiguous gather: rank `r`'s `send` lands at `r * send.len()` in the root's `recv`.
    fn gather(&self, send: &[f64], recv: Option<&mut [f64]>, root: usize) -> Result<()> {
        let layout = StridedLayout::contiguous(send.len());
        let recv = recv.map(|data| RegionMut::new(data, &layout, 1));
        self.gather_layout(Region::new(send, &layout, 1), recv, root)
    }

    fn reduce_and(&self, flag: bool, root: usize) -> Result<Option<bool>> {
        Ok(self
            .reduce(encode_flag(flag), ReduceOp::LogicalAnd, root)?
            .map(decode_flag))
    }

    fn reduce_max(&self, value: f64, root: usize) -> Result<Option<f64>> {
        self.reduce(value, ReduceOp::Max, root)
    }
}

/// Abort the fabric when `result` is a locally detected failure.
///
/// Failures that already come from the fabric are shared by every peer and are
/// passed through untouched.
pub fn abort_on_error<F, T>(fabric: &F, result: Result<T>) -> Result<T>
where
    F: Fabric + ?Sized,
{
    match &result {
        Err(Error::Aborted { .. } | Error::CollectiveMismatch { .. }) | Ok(_) => {}
        Err(err) => {
            tracing::error!(rank = fabric.rank(), error = %err, "aborting run");
            fabric.abort(&err.to_string());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_and_needs_every_flag() {
        let op = ReduceOp::LogicalAnd;
        assert_eq!(op.fold([1.0, 1.0, 1.0]), 1.0);
        assert_eq!(op.fold([1.0, 0.0, 1.0]), 0.0);
        assert_eq!(op.fold([]), 1.0);
    }

    #[test]
    fn max_ignores_order() {
        let op = ReduceOp::Max;
        assert_eq!(op.fold([0.25, 3.5, 1.0]), op.fold([1.0, 0.25, 3.5]));
        assert_eq!(op.fold([0.25, 3.5, 1.0]), 3.5);
    }
}
