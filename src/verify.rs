//! Correctness checks on the gathered result.
//!
//! A wrong result never aborts the run: it is reported next to the timings.

use std::fmt;

use crate::matrix::is_symmetric;

/// First `(i, j)` with `t[j][i] != m[i][j]`, compared bit for bit.
pub fn first_transpose_mismatch(m: &[f64], t: &[f64], n: usize) -> Option<(usize, usize)> {
    (0..n)
        .flat_map(|i| (0..n).map(move |j| (i, j)))
        .find(|&(i, j)| t[j * n + i].to_bits() != m[i * n + j].to_bits())
}

/// `t[j][i] == m[i][j]` exactly for every `(i, j)`.
pub fn check_transpose_exact(m: &[f64], t: &[f64], n: usize) -> bool {
    m.len() == n * n && t.len() == n * n && first_transpose_mismatch(m, t, n).is_none()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectnessFailure {
    /// The gathered transpose differs from the input at `(row, col)`.
    TransposeMismatch { row: usize, col: usize },
    /// The distributed symmetry verdict disagrees with the sequential check.
    SymmetryDisagrees { distributed: bool, reference: bool },
}

impl fmt::Display for CorrectnessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectnessFailure::TransposeMismatch { row, col } => {
                write!(f, "transposed[{col}][{row}] != matrix[{row}][{col}]")
            }
            CorrectnessFailure::SymmetryDisagrees {
                distributed,
                reference,
            } => write!(
                f,
                "distributed symmetry check says {distributed}, sequential check says {reference}"
            ),
        }
    }
}

/// Outcome of checking one run at the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Global symmetry flag reduced across workers.
    pub symmetric: bool,
    pub transposed: bool,
    pub failures: Vec<CorrectnessFailure>,
}

impl Verdict {
    pub fn evaluate(m: &[f64], t: &[f64], n: usize, symmetric: bool) -> Self {
        let mut failures = Vec::new();
        if let Some((row, col)) = first_transpose_mismatch(m, t, n) {
            failures.push(CorrectnessFailure::TransposeMismatch { row, col });
        }
        let reference = is_symmetric(m, n);
        if reference != symmetric {
            failures.push(CorrectnessFailure::SymmetryDisagrees {
                distributed: symmetric,
                reference,
            });
        }
        Self {
            symmetric,
            transposed: failures
                .iter()
                .all(|f| !matches!(f, CorrectnessFailure::TransposeMismatch { .. })),
            failures,
        }
    }

    pub fn is_correct(&self) -> bool {
        self.failures.is_empty()
    }
}
