//! Replicated broadcast: every worker receives the whole matrix.
//!
//! The simplest baseline. Each worker moves n² elements per repetition but
//! only works on its own `n / P` rows.

use super::{Canonical, Plan, ROOT, Strategy, StrategyKind, expect_canonical};
use crate::error::{Result, try_zeroed};
use crate::fabric::Fabric;
use crate::matrix::{EPSILON, transpose};
use crate::timing::ComputeTimer;

pub struct Replicated {
    plan: Plan,
    rank: usize,
    // Broadcast target on non-root workers; the root broadcasts its own matrix.
    replica: Vec<f64>,
    // Owned rows rewritten column by column: n rows of `chunk` elements.
    columns: Vec<f64>,
}

impl Replicated {
    pub fn new(plan: Plan, rank: usize) -> Result<Self> {
        let n = plan.n();
        let replica = if rank == ROOT {
            Vec::new()
        } else {
            try_zeroed(rank, n * n, "broadcast replica")?
        };
        let columns = try_zeroed(rank, plan.chunk() * n, "column buffer")?;
        Ok(Self {
            plan,
            rank,
            replica,
            columns,
        })
    }
}

impl Strategy for Replicated {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Replicated
    }

    fn check_symmetry<F: Fabric + ?Sized>(
        &mut self,
        fabric: &F,
        canon: Option<&mut Canonical>,
        timer: &mut ComputeTimer,
    ) -> Result<Option<bool>> {
        expect_canonical(fabric, &canon)?;
        let n = self.plan.n();
        let m = match canon {
            Some(canon) => canon.matrix.as_mut_slice(),
            None => self.replica.as_mut_slice(),
        };

        fabric.broadcast(m, ROOT)?;

        let rows = self.plan.rows_of(self.rank);
        let local = timer.measure(|| {
            let mut symmetric = true;
            for i in rows {
                for j in 0..i {
                    if (m[i * n + j] - m[j * n + i]).abs() > EPSILON {
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
        let (m, mut t) = match canon {
            Some(canon) => (
                canon.matrix.as_mut_slice(),
                Some(canon.transposed.as_mut_slice()),
            ),
            None => (self.replica.as_mut_slice(), None),
        };

        fabric.broadcast(m, ROOT)?;

        let rows = self.plan.rows_of(self.rank);
        let owned = &m[rows.start * n..rows.end * n];
        let columns = &mut self.columns;
        timer.measure(|| transpose(owned, columns, chunk, n));

        // Row i of the result is column i of the matrix, `chunk` elements per worker.
        for i in 0..n {
            let recv = t.as_deref_mut().map(|t| &mut t[i * n..(i + 1) * n]);
            fabric.gather(&self.columns[i * chunk..(i + 1) * chunk], recv, ROOT)?;
        }
        Ok(())
    }
}
