//! Strided layout descriptors.
//!
//! A [`StridedLayout`] describes how one transfer unit is laid out inside a
//! row-major buffer: `block_count` blocks of `block_len` consecutive elements,
//! the start of each block `stride` elements after the previous one. Units of
//! the same layout follow each other `extent` elements apart, which is how a
//! column or a tile can be made to "advance" by a single element or by a tile
//! width instead of by its full footprint.
//!
//! ```text
//!   vector(3, 2, 5)            resized(2): next unit starts 2 elements later
//!   |<---- stride ---->|
//!   [x x . . . x x . . . x x]  [. . x x . . . x x . . . x x]
//!    ^^^ block_len
//! ```
//!
//! Packing a region is done once here, so strategies only describe shapes and
//! never write their own copy loops.

pub mod tile;

use thiserror::Error;

pub use tile::TileView;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LayoutError {
    #[error(
        "{units} units of {layout:?} need a buffer of {required} elements, found {len}"
    )]
    TooShort {
        layout: StridedLayout,
        units: usize,
        required: usize,
        len: usize,
    },

    #[error("send side moves {send} elements but receive side expects {recv}")]
    SignatureMismatch { send: usize, recv: usize },
}

/// Shape of one transfer unit inside a row-major buffer of `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StridedLayout {
    block_len: usize,
    block_count: usize,
    stride: usize,
    extent: usize,
}

impl StridedLayout {
    /// `len` consecutive elements, e.g. one matrix row.
    pub fn contiguous(len: usize) -> Self {
        Self {
            block_len: len,
            block_count: 1,
            stride: len,
            extent: len,
        }
    }

    /// `block_count` blocks of `block_len` elements whose starts are `stride` apart.
    ///
    /// The extent defaults to the footprint of the unit; use [`resized`](Self::resized)
    /// to interleave units.
    ///
    /// # Panics
    ///
    /// Panics if `stride < block_len` with more than one block, since blocks would overlap.
    pub fn vector(block_count: usize, block_len: usize, stride: usize) -> Self {
        assert!(
            block_count <= 1 || stride >= block_len,
            "stride {stride} is shorter than block length {block_len}"
        );
        let mut layout = Self {
            block_len,
            block_count,
            stride,
            extent: 0,
        };
        layout.extent = layout.span();
        layout
    }

    /// Same unit shape, but consecutive units start `extent` elements apart.
    pub fn resized(self, extent: usize) -> Self {
        Self { extent, ..self }
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn extent(&self) -> usize {
        self.extent
    }

    /// Number of elements carried by one unit.
    pub fn elements(&self) -> usize {
        self.block_len * self.block_count
    }

    /// Distance from the first to one past the last element touched by one unit.
    pub fn span(&self) -> usize {
        if self.block_count == 0 || self.block_len == 0 {
            return 0;
        }
        (self.block_count - 1) * self.stride + self.block_len
    }

    /// Buffer length needed to hold `units` consecutive units.
    pub fn required_len(&self, units: usize) -> usize {
        if units == 0 {
            return 0;
        }
        (units - 1) * self.extent + self.span()
    }

    /// Element offsets of one unit, relative to the unit's start, in transfer order.
    pub fn offsets(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.block_count).flat_map(move |b| {
            let start = b * self.stride;
            start..start + self.block_len
        })
    }

    fn check(&self, units: usize, len: usize) -> Result<(), LayoutError> {
        let required = self.required_len(units);
        if len < required {
            return Err(LayoutError::TooShort {
                layout: *self,
                units,
                required,
                len,
            });
        }
        Ok(())
    }

    /// Append `units` units read from `src` to `out`, in unit then offset order.
    pub fn pack_into<T: Copy>(
        &self,
        src: &[T],
        units: usize,
        out: &mut Vec<T>,
    ) -> Result<(), LayoutError> {
        self.check(units, src.len())?;
        out.reserve(units * self.elements());
        for u in 0..units {
            let base = u * self.extent;
            out.extend(self.offsets().map(|off| src[base + off]));
        }
        Ok(())
    }

    /// Convenience wrapper around [`pack_into`](Self::pack_into).
    pub fn pack<T: Copy>(&self, src: &[T], units: usize) -> Result<Vec<T>, LayoutError> {
        let mut out = Vec::with_capacity(units * self.elements());
        self.pack_into(src, units, &mut out)?;
        Ok(out)
    }

    /// Scatter a packed stream into `units` units of `dst`. The inverse of [`pack`](Self::pack).
    pub fn unpack<T: Copy>(&self, packed: &[T], units: usize, dst: &mut [T]) -> Result<(), LayoutError> {
        let expected = units * self.elements();
        if packed.len() != expected {
            return Err(LayoutError::SignatureMismatch {
                send: packed.len(),
                recv: expected,
            });
        }
        self.check(units, dst.len())?;
        let mut values = packed.iter();
        for u in 0..units {
            let base = u * self.extent;
            for (off, v) in self.offsets().zip(&mut values) {
                dst[base + off] = *v;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_row_packs_in_order() {
        let src: Vec<f64> = (0..8).map(f64::from).collect();
        let row = StridedLayout::contiguous(4);
        assert_eq!(row.pack(&src, 2).unwrap(), src);
        assert_eq!(row.required_len(2), 8);
    }

    #[test]
    fn resized_column_walks_columns() {
        // 3x3 matrix, one column per unit, units advance by one element.
        let src: Vec<f64> = (0..9).map(f64::from).collect();
        let column = StridedLayout::vector(3, 1, 3).resized(1);
        assert_eq!(column.span(), 7);
        assert_eq!(
            column.pack(&src, 3).unwrap(),
            vec![0.0, 3.0, 6.0, 1.0, 4.0, 7.0, 2.0, 5.0, 8.0]
        );
    }

    #[test]
    fn tile_inside_wide_matrix() {
        // 2x2 tiles of a 4x4 matrix, consecutive tiles of a block-row.
        let src: Vec<f64> = (0..16).map(f64::from).collect();
        let tile = StridedLayout::vector(2, 2, 4).resized(2);
        assert_eq!(
            tile.pack(&src, 2).unwrap(),
            vec![0.0, 1.0, 4.0, 5.0, 2.0, 3.0, 6.0, 7.0]
        );
    }

    #[test]
    fn unpack_reverses_pack_with_different_shape() {
        let src: Vec<f64> = (0..16).map(f64::from).collect();
        let column = StridedLayout::vector(4, 1, 4).resized(1);
        let row = StridedLayout::contiguous(4);

        let packed = column.pack(&src, 4).unwrap();
        let mut dst = vec![0.0; 16];
        row.unpack(&packed, 4, &mut dst).unwrap();

        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(dst[i * 4 + j], src[j * 4 + i]);
            }
        }
    }

    #[test]
    fn short_buffer_is_rejected() {
        let tile = StridedLayout::vector(2, 2, 4).resized(2);
        let err = tile.pack(&[0.0; 5], 1).unwrap_err();
        assert!(matches!(err, LayoutError::TooShort { required: 6, len: 5, .. }));
    }

    #[test]
    fn unpack_rejects_signature_mismatch() {
        let row = StridedLayout::contiguous(4);
        let mut dst = vec![0.0; 8];
        let err = row.unpack(&[1.0; 3], 1, &mut dst).unwrap_err();
        assert_eq!(err, LayoutError::SignatureMismatch { send: 3, recv: 4 });
    }
}
