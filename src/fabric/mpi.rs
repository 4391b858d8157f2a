//! MPI-backed fabric, one worker per process.
//!
//! Layout-described regions are packed into contiguous staging buffers and
//! moved with the plain MPI collectives.

use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use super::{Fabric, Region, RegionMut, ReduceOp, abort_on_error, check_signature};
use crate::error::{Error, Result};

pub struct MpiFabric {
    world: SimpleCommunicator,
    // Finalizes MPI when dropped, after `world`.
    _universe: Universe,
}

impl MpiFabric {
    /// Start the MPI runtime. Fails if it is unavailable or already started.
    pub fn initialize() -> Result<Self> {
        let universe = mpi::initialize()
            .ok_or_else(|| Error::Environment("MPI could not be initialized".into()))?;
        let world = universe.world();
        Ok(Self {
            world,
            _universe: universe,
        })
    }

    fn fail<T>(&self, err: Error) -> Result<T> {
        abort_on_error(self, Err(err))
    }
}

impl Fabric for MpiFabric {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn broadcast(&self, buf: &mut [f64], root: usize) -> Result<()> {
        self.world
            .process_at_rank(root as i32)
            .broadcast_into(buf);
        Ok(())
    }

    fn scatter_layout(&self, send: Option<Region<'_>>, recv: RegionMut<'_>, root: usize) -> Result<()> {
        let root_process = self.world.process_at_rank(root as i32);
        let mut share = vec![0.0; recv.elements()];

        if self.is_root(root) {
            let packed = send
                .ok_or_else(|| Error::Config("scatter root has no send buffer".into()))
                .and_then(|send| {
                    check_signature(send.elements(), recv.elements())?;
                    Ok(send.layout.pack(send.data, send.units * self.size())?)
                });
            let packed = match packed {
                Ok(packed) => packed,
                Err(err) => return self.fail(err),
            };
            root_process.scatter_into_root(&packed[..], &mut share[..]);
        } else {
            root_process.scatter_into(&mut share[..]);
        }

        recv.layout.unpack(&share, recv.units, recv.data)?;
        Ok(())
    }

    fn gather_layout(&self, send: Region<'_>, recv: Option<RegionMut<'_>>, root: usize) -> Result<()> {
        let root_process = self.world.process_at_rank(root as i32);
        let packed = match send.layout.pack(send.data, send.units) {
            Ok(packed) => packed,
            Err(err) => return self.fail(err.into()),
        };

        if !self.is_root(root) {
            root_process.gather_into(&packed[..]);
            return Ok(());
        }

        let Some(recv) = recv else {
            return self.fail(Error::Config("gather root has no receive buffer".into()));
        };
        if let Err(err) = check_signature(send.elements(), recv.elements()) {
            return self.fail(err);
        }
        let mut all = vec![0.0; packed.len() * self.size()];
        root_process.gather_into_root(&packed[..], &mut all[..]);
        recv.layout
            .unpack(&all, recv.units * self.size(), recv.data)?;
        Ok(())
    }

    fn reduce(&self, value: f64, op: ReduceOp, root: usize) -> Result<Option<f64>> {
        let root_process = self.world.process_at_rank(root as i32);
        match op {
            ReduceOp::LogicalAnd => {
                let local = i32::from(value != 0.0);
                if self.is_root(root) {
                    let mut global = 0i32;
                    root_process.reduce_into_root(&local, &mut global, SystemOperation::logical_and());
                    Ok(Some(f64::from(global)))
                } else {
                    root_process.reduce_into(&local, SystemOperation::logical_and());
                    Ok(None)
                }
            }
            ReduceOp::Max => {
                if self.is_root(root) {
                    let mut global = 0.0f64;
                    root_process.reduce_into_root(&value, &mut global, SystemOperation::max());
                    Ok(Some(global))
                } else {
                    root_process.reduce_into(&value, SystemOperation::max());
                    Ok(None)
                }
            }
        }
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }

    fn abort(&self, reason: &str) {
        tracing::error!(rank = self.rank(), reason, "aborting MPI job");
        self.world.abort(-1);
    }
}
