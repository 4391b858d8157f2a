//! In-process fabric: `size` logical workers on threads of one process.
//!
//! Every collective is a two-phase rendezvous on one shared [`Round`]:
//! deposit a payload and the collective's tag, wait for everyone, read what
//! this rank needs, wait again so no slot is overwritten while a peer still
//! reads it. Data leaves the lock as `Arc`s and is unpacked outside it.

use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::debug;

use super::{Collective, Fabric, Region, RegionMut, ReduceOp, abort_on_error, check_signature};
use crate::error::{Error, Result};
use crate::layout::LayoutError;

#[derive(Clone, Default)]
enum Payload {
    #[default]
    Empty,
    Data(Arc<Vec<f64>>),
    Scalar(f64),
}

impl Payload {
    fn data(&self) -> Option<Arc<Vec<f64>>> {
        match self {
            Payload::Data(data) => Some(Arc::clone(data)),
            _ => None,
        }
    }
}

struct Round {
    arrived: usize,
    generation: u64,
    aborted: Option<(usize, String)>,
    tags: Vec<Option<Collective>>,
    slots: Vec<Payload>,
}

struct Shared {
    size: usize,
    round: Mutex<Round>,
    wake: Condvar,
}

impl Shared {
    fn new(size: usize) -> Self {
        Self {
            size,
            round: Mutex::new(Round {
                arrived: 0,
                generation: 0,
                aborted: None,
                tags: vec![None; size],
                slots: vec![Payload::Empty; size],
            }),
            wake: Condvar::new(),
        }
    }

    fn aborted_error(round: &Round) -> Option<Error> {
        round.aborted.as_ref().map(|(rank, reason)| Error::Aborted {
            rank: *rank,
            reason: reason.clone(),
        })
    }

    /// Generation-counted barrier that gives up as soon as any worker aborts.
    fn wait(&self, round: &mut MutexGuard<'_, Round>) -> Result<()> {
        if let Some(err) = Self::aborted_error(round) {
            return Err(err);
        }
        round.arrived += 1;
        if round.arrived == self.size {
            round.arrived = 0;
            round.generation += 1;
            self.wake.notify_all();
            return Ok(());
        }
        let generation = round.generation;
        while round.generation == generation && round.aborted.is_none() {
            self.wake.wait(round);
        }
        if round.generation != generation {
            return Ok(());
        }
        Err(Self::aborted_error(round).unwrap_or_else(|| Error::Aborted {
            rank: usize::MAX,
            reason: "unknown".into(),
        }))
    }

    fn abort(&self, rank: usize, reason: &str) {
        let mut round = self.round.lock();
        if round.aborted.is_none() {
            round.aborted = Some((rank, reason.to_string()));
        }
        self.wake.notify_all();
    }
}

/// A group of logical workers sharing one in-process fabric.
pub struct LocalWorld {
    size: usize,
}

impl LocalWorld {
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "a world needs at least one worker");
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `worker` once per rank, each on its own thread, and return the
    /// results in rank order.
    ///
    /// A worker that returns a locally detected error, or panics, aborts the
    /// fabric so that peers waiting on a collective fail instead of hanging.
    pub fn run<F, R>(&self, worker: F) -> Vec<Result<R>>
    where
        F: Fn(&LocalFabric) -> Result<R> + Sync,
        R: Send,
    {
        let shared = Arc::new(Shared::new(self.size));
        let worker = &worker;

        thread::scope(|scope| {
            let handles: Vec<_> = (0..self.size)
                .map(|rank| {
                    let fabric = LocalFabric {
                        rank,
                        shared: Arc::clone(&shared),
                    };
                    scope.spawn(move || {
                        let _guard = AbortOnPanic(&fabric);
                        abort_on_error(&fabric, worker(&fabric))
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(Error::Aborted {
                            rank,
                            reason: "worker panicked".into(),
                        })
                    })
                })
                .collect()
        })
    }
}

struct AbortOnPanic<'a>(&'a LocalFabric);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort("worker panicked");
        }
    }
}

/// One worker's handle on a [`LocalWorld`].
pub struct LocalFabric {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalFabric {
    /// Deposit `payload`, wait for every peer, then let `read` pick from the round.
    fn exchange<T>(
        &self,
        tag: Collective,
        payload: Payload,
        read: impl FnOnce(&Round) -> T,
    ) -> Result<T> {
        let shared = &*self.shared;
        let mut round = shared.round.lock();
        round.slots[self.rank] = payload;
        round.tags[self.rank] = Some(tag);
        shared.wait(&mut round)?;

        if let Some((peer, remote)) = round
            .tags
            .iter()
            .enumerate()
            .find_map(|(peer, t)| t.filter(|t| *t != tag).map(|t| (peer, t)))
        {
            return Err(Error::CollectiveMismatch {
                rank: self.rank,
                local: tag,
                peer,
                remote,
            });
        }

        let out = read(&round);
        shared.wait(&mut round)?;
        round.slots[self.rank] = Payload::Empty;
        Ok(out)
    }

    fn fail<T>(&self, err: Error) -> Result<T> {
        abort_on_error(self, Err(err))
    }
}

impl Fabric for LocalFabric {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn broadcast(&self, buf: &mut [f64], root: usize) -> Result<()> {
        let payload = if self.rank == root {
            Payload::Data(Arc::new(buf.to_vec()))
        } else {
            Payload::Empty
        };
        let data = self.exchange(Collective::Broadcast, payload, |round| {
            round.slots[root].data()
        })?;
        if self.rank == root {
            return Ok(());
        }
        match data {
            Some(data) if data.len() == buf.len() => {
                buf.copy_from_slice(&data);
                Ok(())
            }
            other => Err(LayoutError::SignatureMismatch {
                send: other.map_or(0, |d| d.len()),
                recv: buf.len(),
            }
            .into()),
        }
    }

    fn scatter_layout(&self, send: Option<Region<'_>>, recv: RegionMut<'_>, root: usize) -> Result<()> {
        let payload = if self.rank == root {
            let packed = send
                .ok_or_else(|| Error::Config("scatter root has no send buffer".into()))
                .and_then(|send| {
                    check_signature(send.elements(), recv.elements())?;
                    Ok(send.layout.pack(send.data, send.units * self.size())?)
                });
            match packed {
                Ok(packed) => Payload::Data(Arc::new(packed)),
                Err(err) => return self.fail(err),
            }
        } else {
            Payload::Empty
        };

        let data = self.exchange(Collective::Scatter, payload, |round| {
            round.slots[root].data()
        })?;
        debug!(rank = self.rank, units = recv.units, "scatter");

        let share = recv.elements();
        let start = self.rank * share;
        match data {
            Some(data) if data.len() == share * self.size() => {
                recv.layout
                    .unpack(&data[start..start + share], recv.units, recv.data)?;
                Ok(())
            }
            other => Err(LayoutError::SignatureMismatch {
                send: other.map_or(0, |d| d.len() / self.size()),
                recv: share,
            }
            .into()),
        }
    }

    fn gather_layout(&self, send: Region<'_>, recv: Option<RegionMut<'_>>, root: usize) -> Result<()> {
        let prepared = (|| -> Result<Vec<f64>> {
            if self.rank == root {
                let recv = recv
                    .as_ref()
                    .ok_or_else(|| Error::Config("gather root has no receive buffer".into()))?;
                check_signature(send.elements(), recv.elements())?;
                let required = recv.layout.required_len(recv.units * self.size());
                if recv.data.len() < required {
                    return Err(LayoutError::TooShort {
                        layout: *recv.layout,
                        units: recv.units * self.size(),
                        required,
                        len: recv.data.len(),
                    }
                    .into());
                }
            }
            Ok(send.layout.pack(send.data, send.units)?)
        })();
        let packed = match prepared {
            Ok(packed) => packed,
            Err(err) => return self.fail(err),
        };

        let parts = self.exchange(Collective::Gather, Payload::Data(Arc::new(packed)), |round| {
            (self.rank == root).then(|| round.slots.iter().map(Payload::data).collect::<Vec<_>>())
        })?;
        debug!(rank = self.rank, units = send.units, "gather");

        let (Some(parts), Some(mut recv)) = (parts, recv) else {
            return Ok(());
        };
        let stride = recv.units * recv.layout.extent();
        for (rank, part) in parts.into_iter().enumerate() {
            let part = part.unwrap_or_default();
            recv.layout
                .unpack(part.as_slice(), recv.units, &mut recv.data[rank * stride..])?;
        }
        Ok(())
    }

    fn reduce(&self, value: f64, op: ReduceOp, root: usize) -> Result<Option<f64>> {
        let folded = self.exchange(Collective::Reduce(op), Payload::Scalar(value), |round| {
            (self.rank == root).then(|| {
                op.fold(round.slots.iter().map(|slot| match slot {
                    Payload::Scalar(v) => *v,
                    _ => op.identity(),
                }))
            })
        })?;
        Ok(folded)
    }

    fn barrier(&self) -> Result<()> {
        self.exchange(Collective::Barrier, Payload::Empty, |_| ())
    }

    fn abort(&self, reason: &str) {
        self.shared.abort(self.rank, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StridedLayout;

    #[test]
    fn broadcast_replicates_root() {
        let results = LocalWorld::new(3).run(|fabric| {
            let mut buf = if fabric.rank() == 1 {
                vec![1.0, 2.0, 3.0]
            } else {
                vec![0.0; 3]
            };
            fabric.broadcast(&mut buf, 1)?;
            Ok(buf)
        });
        for buf in results {
            assert_eq!(buf.unwrap(), vec![1.0, 2.0, 3.0]);
        }
    }

    #[test]
    fn scatter_then_gather_restores_rank_order() {
        let results = LocalWorld::new(4).run(|fabric| {
            let send: Vec<f64> = (0..8).map(f64::from).collect();
            let mut mine = vec![0.0; 2];
            let root_send = fabric.is_root(0).then_some(send.as_slice());
            fabric.scatter(root_send, &mut mine, 0)?;

            let mut back = vec![0.0; 8];
            let recv = fabric.is_root(0).then_some(back.as_mut_slice());
            fabric.gather(&mine, recv, 0)?;
            Ok((mine, back))
        });
        for (rank, result) in results.into_iter().enumerate() {
            let (mine, back) = result.unwrap();
            assert_eq!(mine, vec![2.0 * rank as f64, 2.0 * rank as f64 + 1.0]);
            if rank == 0 {
                assert_eq!(back, (0..8).map(f64::from).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn scatter_columns_into_rows() {
        // 4x4 matrix, two columns per rank, received as rows.
        let results = LocalWorld::new(2).run(|fabric| {
            let m: Vec<f64> = (0..16).map(f64::from).collect();
            let column = StridedLayout::vector(4, 1, 4).resized(1);
            let row = StridedLayout::contiguous(4);
            let mut cols = vec![0.0; 8];
            let send = fabric.is_root(0).then(|| Region::new(&m, &column, 2));
            fabric.scatter_layout(send, RegionMut::new(&mut cols, &row, 2), 0)?;
            Ok(cols)
        });
        let rank1 = results.into_iter().nth(1).unwrap().unwrap();
        assert_eq!(
            rank1,
            vec![2.0, 6.0, 10.0, 14.0, 3.0, 7.0, 11.0, 15.0]
        );
    }

    #[test]
    fn reductions_reach_root_only() {
        let results = LocalWorld::new(3).run(|fabric| {
            let all = fabric.reduce_and(fabric.rank() != 2, 0)?;
            let max = fabric.reduce_max(fabric.rank() as f64 * 1.5, 0)?;
            Ok((all, max))
        });
        let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(results[0], (Some(false), Some(3.0)));
        assert_eq!(results[1], (None, None));
    }

    #[test]
    fn failing_worker_releases_peers() {
        let results = LocalWorld::new(3).run(|fabric| {
            if fabric.rank() == 2 {
                return Err(Error::Allocation {
                    rank: 2,
                    elements: usize::MAX,
                    what: "test buffer",
                });
            }
            fabric.barrier()?;
            Ok(())
        });
        assert!(matches!(results[2], Err(Error::Allocation { .. })));
        assert!(matches!(results[0], Err(Error::Aborted { rank: 2, .. })));
        assert!(matches!(results[1], Err(Error::Aborted { rank: 2, .. })));
    }

    #[test]
    fn mismatched_collectives_are_reported() {
        let results = LocalWorld::new(2).run(|fabric| {
            if fabric.rank() == 0 {
                fabric.barrier()
            } else {
                fabric.reduce_max(1.0, 0).map(|_| ())
            }
        });
        for result in results {
            assert!(matches!(result, Err(Error::CollectiveMismatch { .. })));
        }
    }
}
