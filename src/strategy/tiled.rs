//! Block-tiled transpose.
//!
//! The matrix is cut into `bs × bs` tiles. Each block-row is scattered so that
//! every worker receives a contiguous run of its tiles, the tiles are
//! transposed in place, and each block-row is gathered back into the
//! transposed position of the result.
//!
//! A worker keeps all its tiles side by side in one strip of `bs` rows:
//!
//! ```text
//!   |<---------------- bs * tiles_per_worker ---------------->|
//!   +------+------+------+------+-- ... --+------+
//!   | t0   | t1   | t2   | t3   |         | tK   |   bs rows
//!   +------+------+------+------+-- ... --+------+
//!    block-row 0   block-row 1
//! ```
//!
//! Tile `bn` starts at column `bn * bs` of the strip, so element `(a, b)` of
//! the tile is at `a * strip_width + bn * bs + b`. Both sides of every swap
//! use the strip width as row stride.

use super::{Canonical, Plan, ROOT, Strategy, StrategyKind, expect_canonical};
use crate::error::{Error, Result, try_zeroed};
use crate::fabric::{Fabric, Region, RegionMut};
use crate::layout::{StridedLayout, TileView};
use crate::matrix::EPSILON;
use crate::timing::ComputeTimer;

/// Tile partition: tile side and how tiles are spread over workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlan {
    plan: Plan,
    tile: usize,
}

impl TilePlan {
    /// The effective tile side is `min(configured, n / workers)`. It must
    /// divide the per-worker row chunk.
    pub fn new(plan: Plan, configured: usize) -> Result<Self> {
        if configured == 0 {
            return Err(Error::Config("tile size must be positive".into()));
        }
        let tile = configured.min(plan.chunk());
        if plan.chunk() % tile != 0 {
            return Err(Error::Config(format!(
                "tile size {tile} does not divide the per-worker chunk {}",
                plan.chunk()
            )));
        }
        Ok(Self { plan, tile })
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Effective tile side `bs`.
    pub fn tile(&self) -> usize {
        self.tile
    }

    pub fn blocks_per_row(&self) -> usize {
        self.plan.n() / self.tile
    }

    /// Tiles of one block-row handed to each worker.
    pub fn tiles_per_row_per_worker(&self) -> usize {
        self.blocks_per_row() / self.plan.workers()
    }

    pub fn tiles_per_worker(&self) -> usize {
        self.tiles_per_row_per_worker() * self.blocks_per_row()
    }

    /// Row stride of the local tile strip.
    pub fn strip_width(&self) -> usize {
        self.tile * self.tiles_per_worker()
    }

    /// Elements in one worker's tile strip.
    pub fn strip_len(&self) -> usize {
        self.tile * self.strip_width()
    }

    /// Owning worker and offset inside its tile strip.
    pub fn locate(&self, row: usize, col: usize) -> (usize, usize) {
        let bs = self.tile;
        let per_worker = self.tiles_per_row_per_worker();
        let (bi, bj) = (row / bs, col / bs);
        let bn = bi * per_worker + bj % per_worker;
        (
            bj / per_worker,
            (row % bs) * self.strip_width() + bn * bs + col % bs,
        )
    }
}

/// Descriptors used by [`Tiled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayouts {
    /// A tile inside the n-wide matrix; the next unit is the tile to its right.
    pub send: StridedLayout,
    /// A tile inside the local strip; the next unit is the tile to its right.
    pub partition: StridedLayout,
    /// A tile inside the n-wide matrix; the next unit is the tile below it.
    pub recv: StridedLayout,
}

impl TileLayouts {
    pub fn new(plan: &TilePlan) -> Self {
        let n = plan.plan().n();
        let bs = plan.tile();
        Self {
            send: StridedLayout::vector(bs, bs, n).resized(bs),
            partition: StridedLayout::vector(bs, bs, plan.strip_width()).resized(bs),
            recv: StridedLayout::vector(bs, bs, n).resized(bs * n),
        }
    }
}

pub struct Tiled {
    plan: TilePlan,
    rank: usize,
    layouts: TileLayouts,
    tiles: Vec<f64>,
    // Tiles mirrored across the diagonal, for the symmetry check.
    mirrors: Vec<f64>,
}

impl Tiled {
    pub fn new(plan: TilePlan, rank: usize) -> Result<Self> {
        let len = plan.strip_len();
        Ok(Self {
            layouts: TileLayouts::new(&plan),
            tiles: try_zeroed(rank, len, "tile strip")?,
            mirrors: try_zeroed(rank, len, "mirror tile strip")?,
            plan,
            rank,
        })
    }

    pub fn plan(&self) -> &TilePlan {
        &self.plan
    }

    pub fn layouts(&self) -> &TileLayouts {
        &self.layouts
    }

    /// This worker's tiles, packed as described by the partition layout.
    pub fn tiles(&self) -> &[f64] {
        &self.tiles
    }

    /// Offset of block-row `i`'s first tile inside the local strip.
    fn strip_offset(&self, block_row: usize) -> usize {
        block_row * self.plan.tile() * self.plan.tiles_per_row_per_worker()
    }

    /// Scatter the tiles of every block-row into the local strip.
    fn distribute<F: Fabric + ?Sized>(&mut self, fabric: &F, m: Option<&[f64]>) -> Result<()> {
        let n = self.plan.plan().n();
        let bs = self.plan.tile();
        let per_worker = self.plan.tiles_per_row_per_worker();
        for i in 0..self.plan.blocks_per_row() {
            let offset = self.strip_offset(i);
            fabric.scatter_layout(
                m.map(|m| Region::new(&m[i * n * bs..], &self.layouts.send, per_worker)),
                RegionMut::new(&mut self.tiles[offset..], &self.layouts.partition, per_worker),
                ROOT,
            )?;
        }
        Ok(())
    }
}

impl Strategy for Tiled {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Tiled
    }

    /// Worker `r` holds tile `(i, bj)` for its columns `bj` of every
    /// block-row `i`, and receives the mirror tile `(bj, i)` next to it by
    /// scattering block-column `i` with the `recv` layout.
    fn check_symmetry<F: Fabric + ?Sized>(
        &mut self,
        fabric: &F,
        canon: Option<&mut Canonical>,
        timer: &mut ComputeTimer,
    ) -> Result<Option<bool>> {
        expect_canonical(fabric, &canon)?;
        let m = canon.map(|canon| canon.matrix.as_slice());
        let bs = self.plan.tile();
        let per_worker = self.plan.tiles_per_row_per_worker();

        self.distribute(fabric, m)?;
        for i in 0..self.plan.blocks_per_row() {
            let offset = self.strip_offset(i);
            fabric.scatter_layout(
                m.map(|m| Region::new(&m[i * bs..], &self.layouts.recv, per_worker)),
                RegionMut::new(&mut self.mirrors[offset..], &self.layouts.partition, per_worker),
                ROOT,
            )?;
        }

        let (tiles, mirrors) = (self.tiles.as_slice(), self.mirrors.as_slice());
        let partition = &self.layouts.partition;
        let plan = &self.plan;
        let rank = self.rank;
        let local = timer.measure(|| {
            let mut symmetric = true;
            for i in 0..plan.blocks_per_row() {
                for k in 0..per_worker {
                    let bn = i * per_worker + k;
                    let bj = rank * per_worker + k;
                    let tile = TileView::new(tiles, partition, bn * bs);
                    let mirror = TileView::new(mirrors, partition, bn * bs);
                    for a in 0..bs {
                        for b in 0..bs {
                            if bj * bs + b >= i * bs + a {
                                continue;
                            }
                            if (tile.get(a, b) - mirror.get(b, a)).abs() > EPSILON {
                                symmetric = false;
                            }
                        }
                    }
                }
            }
            symmetric
        });

        fabric.reduce_and(local, ROOT)
    }

    fn transpose<F: Fabric + ?Sized>(
        &mut self,
        fabric: &F,
        canon: Option<&mut Canonical>,
        timer: &mut ComputeTimer,
    ) -> Result<()> {
        expect_canonical(fabric, &canon)?;
        let (m, mut t) = match canon {
            Some(canon) => (
                Some(canon.matrix.as_slice()),
                Some(canon.transposed.as_mut_slice()),
            ),
            None => (None, None),
        };
        let bs = self.plan.tile();
        let per_worker = self.plan.tiles_per_row_per_worker();

        self.distribute(fabric, m)?;

        let tiles = self.tiles.as_mut_slice();
        let partition = &self.layouts.partition;
        let count = self.plan.tiles_per_worker();
        timer.measure(|| {
            for bn in 0..count {
                TileView::new(&mut *tiles, partition, bn * bs).transpose_in_place();
            }
        });

        // Tile (i, bj) comes back as tile (bj, i): start at column block i
        // and let the `recv` extent step one block-row down per tile.
        for i in 0..self.plan.blocks_per_row() {
            let offset = self.strip_offset(i);
            let recv = t
                .as_deref_mut()
                .map(|t| RegionMut::new(&mut t[i * bs..], &self.layouts.recv, per_worker));
            fabric.gather_layout(
                Region::new(&self.tiles[offset..], &self.layouts.partition, per_worker),
                recv,
                ROOT,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile_plan(n: usize, workers: usize, tile: usize) -> TilePlan {
        TilePlan::new(Plan::new(n, workers).unwrap(), tile).unwrap()
    }

    #[test]
    fn tile_degrades_to_chunk() {
        let plan = tile_plan(8, 4, 32);
        assert_eq!(plan.tile(), 2);
        assert_eq!(plan.tiles_per_row_per_worker(), 1);
        assert_eq!(plan.tiles_per_worker(), 4);
    }

    #[test]
    fn strip_holds_every_tile() {
        let plan = tile_plan(16, 2, 2);
        assert_eq!(plan.blocks_per_row(), 8);
        assert_eq!(plan.tiles_per_row_per_worker(), 4);
        assert_eq!(plan.tiles_per_worker(), 32);
        assert_eq!(plan.strip_len(), 16 * 16 / 2);
    }

    #[test]
    fn tile_must_divide_chunk() {
        let plan = Plan::new(12, 2).unwrap();
        assert!(matches!(TilePlan::new(plan, 4), Err(Error::Config(_))));
        assert!(matches!(TilePlan::new(plan, 0), Err(Error::Config(_))));
        assert_eq!(TilePlan::new(plan, 3).unwrap().tile(), 3);
    }

    #[test]
    fn locate_is_a_bijection_per_worker() {
        let plan = tile_plan(8, 2, 2);
        let mut seen = vec![vec![false; plan.strip_len()]; 2];
        for row in 0..8 {
            for col in 0..8 {
                let (rank, offset) = plan.locate(row, col);
                assert!(!seen[rank][offset], "({row}, {col}) collides");
                seen[rank][offset] = true;
            }
        }
        assert!(seen.iter().flatten().all(|s| *s));
    }

    #[test]
    fn partition_layout_fits_the_strip() {
        let plan = tile_plan(16, 4, 2);
        let layouts = TileLayouts::new(&plan);
        let last_row = plan.blocks_per_row() - 1;
        let offset = last_row * plan.tile() * plan.tiles_per_row_per_worker();
        let required = layouts
            .partition
            .required_len(plan.tiles_per_row_per_worker());
        assert!(offset + required <= plan.strip_len());
    }
}
