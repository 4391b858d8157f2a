//! Square tile addressed through a strided layout.

use super::StridedLayout;

/// A `side × side` tile inside a wider row-major strip.
///
/// Element `(a, b)` lives at `origin + a * row_stride + b`. Building the view
/// from the same [`StridedLayout`] that delivered the tile keeps the row
/// stride used for indexing identical to the stride used for the transfer.
pub struct TileView<T> {
    data: T,
    origin: usize,
    side: usize,
    row_stride: usize,
}

impl<T> TileView<T>
where
    T: AsRef<[f64]>,
{
    /// View the tile described by `layout` starting at `origin` in `data`.
    ///
    /// # Panics
    ///
    /// Panics if the layout is not square or the tile does not fit in `data`.
    pub fn new(data: T, layout: &StridedLayout, origin: usize) -> Self {
        assert_eq!(
            layout.block_len(),
            layout.block_count(),
            "tile layout must be square"
        );
        let len = data.as_ref().len();
        assert!(
            origin + layout.span() <= len,
            "tile at {origin} overruns a buffer of {len}"
        );
        Self {
            data,
            origin,
            side: layout.block_len(),
            row_stride: layout.stride(),
        }
    }

    pub fn side(&self) -> usize {
        self.side
    }

    #[inline]
    fn index(&self, a: usize, b: usize) -> usize {
        self.origin + a * self.row_stride + b
    }

    pub fn get(&self, a: usize, b: usize) -> f64 {
        self.data.as_ref()[self.index(a, b)]
    }
}

impl<T> TileView<T>
where
    T: AsRef<[f64]> + AsMut<[f64]>,
{
    /// Swap `(a, b)` with `(b, a)` for every element below the diagonal.
    pub fn transpose_in_place(&mut self) {
        for a in 0..self.side {
            for b in 0..a {
                let lower = self.index(a, b);
                let upper = self.index(b, a);
                self.data.as_mut().swap(lower, upper);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transposes_only_its_own_tile() {
        // Strip of two 2x2 tiles side by side: row stride 4.
        let mut strip = vec![
            1.0, 2.0, 5.0, 6.0, //
            3.0, 4.0, 7.0, 8.0,
        ];
        let layout = StridedLayout::vector(2, 2, 4).resized(2);

        TileView::new(strip.as_mut_slice(), &layout, 2).transpose_in_place();

        assert_eq!(strip, vec![1.0, 2.0, 5.0, 7.0, 3.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn get_follows_row_stride() {
        let strip: Vec<f64> = (0..12).map(f64::from).collect();
        let layout = StridedLayout::vector(2, 2, 6);
        let view = TileView::new(strip.as_slice(), &layout, 4);
        assert_eq!(view.get(1, 0), 10.0);
        assert_eq!(view.side(), 2);
    }
}
