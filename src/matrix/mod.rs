//! Square row-major matrices and sequential reference routines.
//!
//! These are the single-worker oracles the distributed strategies are
//! checked against, plus the random input generator.

pub mod generate;
pub mod transpose;

pub use generate::{random_matrix, sequence_matrix, symmetric_matrix};
pub use transpose::{is_symmetric, transpose, transpose_blocked};

/// Tolerance for symmetry comparisons. Never used for transpose checks.
pub const EPSILON: f64 = 1e-6;
