//! Input matrices.

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Upper bound (exclusive) of generated values.
pub const VALUE_RANGE: f64 = 100.0;

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// n×n matrix of values uniformly distributed in `[0, 100)`.
///
/// The same `seed` always yields the same matrix; `None` seeds from the OS.
pub fn random_matrix(n: usize, seed: Option<u64>) -> Vec<f64> {
    let mut rng = rng(seed);
    (0..n * n)
        .map(|_| rng.random_range(0.0..VALUE_RANGE))
        .collect()
}

/// Random n×n matrix with `m[i][j] == m[j][i]` exactly.
pub fn symmetric_matrix(n: usize, seed: Option<u64>) -> Vec<f64> {
    let mut m = random_matrix(n, seed);
    for i in 0..n {
        for j in 0..i {
            m[i * n + j] = m[j * n + i];
        }
    }
    m
}

/// `1, 2, ..., n²` laid out row by row.
pub fn sequence_matrix(n: usize) -> Vec<f64> {
    (1..=n * n).map(|v| v as f64).collect()
}
