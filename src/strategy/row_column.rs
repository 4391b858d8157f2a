//! Row and column chunks through strided layouts.
//!
//! Only `2 · n² / P` elements reach each worker. The column chunk is cut
//! straight out of the root's matrix by a strided descriptor and lands as
//! ordinary rows, so the reshaping happens during the transfer.

use super::{Canonical, Plan, ROOT, Strategy, StrategyKind, expect_canonical};
use crate::error::{Result, try_zeroed};
use crate::fabric::{Fabric, Region, RegionMut};
use crate::layout::StridedLayout;
use crate::matrix::{EPSILON, transpose};
use crate::timing::ComputeTimer;

/// Descriptors used by [`RowColumn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowColumnLayouts {
    /// One matrix row.
    pub row: StridedLayout,
    /// One matrix column; the next unit is the next column.
    pub column: StridedLayout,
    /// One column of an `n × chunk` buffer; the next unit is the next column.
    pub column_chunk: StridedLayout,
}

impl RowColumnLayouts {
    pub fn new(plan: &Plan) -> Self {
        let n = plan.n();
        Self {
            row: StridedLayout::contiguous(n),
            column: StridedLayout::vector(n, 1, n).resized(1),
            column_chunk: StridedLayout::vector(n, 1, plan.chunk()).resized(1),
        }
    }
}

pub struct RowColumn {
    plan: Plan,
    rank: usize,
    layouts: RowColumnLayouts,
    // `chunk × n`: the owned rows.
    rows: Vec<f64>,
    // `chunk × n` mirrored columns for the symmetry check, `n × chunk` after the local transpose.
    columns: Vec<f64>,
}

impl RowColumn {
    pub fn new(plan: Plan, rank: usize) -> Result<Self> {
        let len = plan.chunk() * plan.n();
        Ok(Self {
            layouts: RowColumnLayouts::new(&plan),
            rows: try_zeroed(rank, len, "row chunk")?,
            columns: try_zeroed(rank, len, "column chunk")?,
            plan,
            rank,
        })
    }

    pub fn layouts(&self) -> &RowColumnLayouts {
        &self.layouts
    }

    fn scatter_rows<F: Fabric + ?Sized>(&mut self, fabric: &F, m: Option<&[f64]>) -> Result<()> {
        let chunk = self.plan.chunk();
        let row = &self.layouts.row;
        fabric.scatter_layout(
            m.map(|m| Region::new(m, row, chunk)),
            RegionMut::new(&mut self.rows, row, chunk),
            ROOT,
        )
    }
}

impl Strategy for RowColumn {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RowColumn
    }

    fn check_symmetry<F: Fabric + ?Sized>(
        &mut self,
        fabric: &F,
        canon: Option<&mut Canonical>,
        timer: &mut ComputeTimer,
    ) -> Result<Option<bool>> {
        expect_canonical(fabric, &canon)?;
        let m = canon.map(|canon| canon.matrix.as_slice());
        let n = self.plan.n();
        let chunk = self.plan.chunk();

        self.scatter_rows(fabric, m)?;
        // Column `c` of the matrix arrives as local row `c - first owned row`.
        fabric.scatter_layout(
            m.map(|m| Region::new(m, &self.layouts.column, chunk)),
            RegionMut::new(&mut self.columns, &self.layouts.row, chunk),
            ROOT,
        )?;

        let first = self.plan.rows_of(self.rank).start;
        let (rows, columns) = (&self.rows, &self.columns);
        let local = timer.measure(|| {
            let mut symmetric = true;
            for i in 0..chunk {
                for j in 0..first + i {
                    if (rows[i * n + j] - columns[i * n + j]).abs() > EPSILON {
                        symmetric = false;
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
        let n = self.plan.n();
        let chunk = self.plan.chunk();
        let (m, t) = match canon {
            Some(canon) => (
                Some(canon.matrix.as_slice()),
                Some(canon.transposed.as_mut_slice()),
            ),
            None => (None, None),
        };

        self.scatter_rows(fabric, m)?;

        let (rows, columns) = (&self.rows, &mut self.columns);
        timer.measure(|| transpose(rows, columns, chunk, n));

        // Each column of the local `n × chunk` buffer is one owned row, and
        // becomes column `first owned row + k` of the result.
        let layouts = &self.layouts;
        fabric.gather_layout(
            Region::new(&self.columns, &layouts.column_chunk, chunk),
            t.map(|t| RegionMut::new(t, &layouts.column, chunk)),
            ROOT,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_layouts_cover_their_buffers_exactly() {
        let plan = Plan::new(8, 4).unwrap();
        let layouts = RowColumnLayouts::new(&plan);
        let chunk = plan.chunk();

        // The root's matrix holds all `n` columns.
        assert_eq!(layouts.column.required_len(8), 64);
        // A worker's `n × chunk` buffer holds exactly `chunk` strided columns.
        assert_eq!(layouts.column_chunk.required_len(chunk), chunk * 8);
        assert_eq!(layouts.column.elements(), layouts.row.elements());
    }
}
