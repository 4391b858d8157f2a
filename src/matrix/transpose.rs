//! Sequential transpose and symmetry check.

use super::EPSILON;

/// Tile side used by [`transpose_blocked`].
pub const SEQUENTIAL_TILE: usize = 32;

/// Transpose a matrix: dst = src^T
///
/// Converts from row-major (rows × cols) to row-major (cols × rows).
/// After transpose, what was column j of src becomes row j of dst.
///
/// # Arguments
///
/// * `src` - Source matrix (rows × cols), row-major
/// * `dst` - Destination matrix (cols × rows), row-major
/// * `rows` - Number of rows in src
/// * `cols` - Number of columns in src
///
/// # Example
///
/// ```
/// use collective_transpose::matrix::transpose::transpose;
///
/// let src = vec![1.0, 2.0, 3.0,   // 2×3 matrix
///                4.0, 5.0, 6.0];
/// let mut dst = vec![0.0; 6];      // will be 3×2
///
/// transpose(&src, &mut dst, 2, 3);
///
/// assert_eq!(dst, vec![1.0, 4.0,   // 3×2 matrix
///                      2.0, 5.0,
///                      3.0, 6.0]);
/// ```
pub fn transpose(src: &[f64], dst: &mut [f64], rows: usize, cols: usize) {
    for i in 0..rows {
        for j in 0..cols {
            dst[j * rows + i] = src[i * cols + j];
        }
    }
}

/// Cache-blocked transpose of an n×n matrix.
///
/// Walks the matrix tile by tile so that both the rows read from `src` and the
/// rows written to `dst` stay inside a few cache lines. The tile side is
/// [`SEQUENTIAL_TILE`], clamped to `n`; `n` must be a multiple of it.
///
/// # Panics
///
/// Panics if the slices are not n×n or the tile does not divide `n`.
pub fn transpose_blocked(src: &[f64], dst: &mut [f64], n: usize) {
    assert_eq!(src.len(), n * n, "src: expected {}x{} elements", n, n);
    assert_eq!(dst.len(), n * n, "dst: expected {}x{} elements", n, n);
    let size = SEQUENTIAL_TILE.min(n);
    if size == 0 {
        return;
    }
    assert_eq!(n % size, 0, "tile {} does not divide {}", size, n);

    for rb in 0..n / size {
        for cb in 0..n / size {
            let source = (rb * n + cb) * size;
            let destination = (cb * n + rb) * size;
            for i in 0..size {
                for j in 0..size {
                    dst[destination + i * n + j] = src[source + j * n + i];
                }
            }
        }
    }
}

/// True when `|m[i][j] - m[j][i]| <= EPSILON` for every pair below the diagonal.
pub fn is_symmetric(m: &[f64], n: usize) -> bool {
    (0..n).all(|i| (0..i).all(|j| (m[i * n + j] - m[j * n + i]).abs() <= EPSILON))
}
