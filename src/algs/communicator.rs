//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees). Handles
//! returned by `isend`/`irecv` must be waited on before the caller trusts a
//! buffer; the halo exchange waits on every handle before moving to the next
//! face, which makes each transfer equivalent to a blocking send/receive.
//!
//! Messages between a `(src, dst, tag)` triple are delivered in FIFO order on
//! every backend.

use std::collections::VecDeque;
use std::sync::{Arc, Barrier};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::algs::wire;
use crate::stencil_error::StencilError;

/// Message tag. Distinct protocols use distinct tags so their messages are
/// never matched against each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// Tag used by the collective reduction of the in-process backend.
const REDUCE_TAG: CommTag = CommTag::new(0xFFF0);

/// Point-to-point and collective operations needed by the solver.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Post a send of `buf` to `peer`. The payload is captured before the
    /// call returns, so `buf` may be reused immediately.
    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;

    /// Post a receive from `peer`. `buf` gives the expected length; the
    /// received bytes are returned by [`Wait::wait`].
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// This process's rank in the group.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Block until every rank of the group has reached the barrier.
    fn barrier(&self);

    /// Element-wise sum of `values` over the group; every rank receives the
    /// result in place.
    ///
    /// # Errors
    /// [`StencilError::Comm`] if a contribution is missing or has the wrong
    /// length. The collective still completes on every rank.
    fn allreduce_sum(&self, values: &mut [f64]) -> Result<(), StencilError>;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Group of one: every operation is local. Sends and receives are no-ops,
/// which matches a rank without neighbors.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn allreduce_sum(&self, _values: &mut [f64]) -> Result<(), StencilError> {
        Ok(())
    }
}

// --- ThreadComm: a whole process group inside one OS process ---

type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Debug)]
struct Shared {
    size: usize,
    mailbox: DashMap<Key, VecDeque<Bytes>>,
    doorbell: Mutex<()>,
    delivered: Condvar,
    barrier: Barrier,
}

impl Shared {
    fn post(&self, key: Key, payload: Bytes) {
        self.mailbox.entry(key).or_default().push_back(payload);
        let _guard = self.doorbell.lock();
        self.delivered.notify_all();
    }

    fn take(&self, key: &Key) -> Option<Bytes> {
        self.mailbox.get_mut(key).and_then(|mut q| q.pop_front())
    }

    fn take_blocking(&self, key: Key) -> Bytes {
        let mut guard = self.doorbell.lock();
        loop {
            if let Some(bytes) = self.take(&key) {
                return bytes;
            }
            self.delivered.wait(&mut guard);
        }
    }
}

/// One rank of an in-process group built by [`ThreadComm::group`]. Each rank
/// is meant to be driven by its own thread; sends are buffered, receives
/// block in [`Wait::wait`] until the matching message arrives.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

/// Pending receive on a [`ThreadComm`].
#[derive(Debug)]
pub struct MailboxRecv {
    shared: Arc<Shared>,
    key: Key,
}

impl Wait for MailboxRecv {
    /// Returns the payload whole, even when it differs from the posted
    /// buffer length.
    fn wait(self) -> Option<Vec<u8>> {
        Some(self.shared.take_blocking(self.key).to_vec())
    }
}

impl ThreadComm {
    /// Build the `size` ranks of a fresh group. Ranks of different groups
    /// never see each other's messages.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let shared = Arc::new(Shared {
            size,
            mailbox: DashMap::new(),
            doorbell: Mutex::new(()),
            delivered: Condvar::new(),
            barrier: Barrier::new(size.max(1)),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = MailboxRecv;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        self.shared
            .post((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MailboxRecv {
        MailboxRecv {
            shared: Arc::clone(&self.shared),
            key: (peer, self.rank, tag),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    /// Gather to rank 0, sum in rank order, broadcast. The fixed order keeps
    /// the result identical on every rank and across runs.
    fn allreduce_sum(&self, values: &mut [f64]) -> Result<(), StencilError> {
        let size = self.size();
        if size <= 1 {
            return Ok(());
        }
        let tag = REDUCE_TAG.as_u16();
        let mut scratch = vec![0.0f64; values.len()];
        if self.rank == 0 {
            let mut first_err = None;
            for peer in 1..size {
                let h = self.irecv(peer, tag, bytemuck::cast_slice_mut(&mut scratch));
                let received = h
                    .wait()
                    .ok_or_else(|| reduce_error(peer, "no contribution received".into()))
                    .and_then(|data| wire::decode_into(peer, &data, &mut scratch));
                match received {
                    Ok(()) => {
                        for (v, s) in values.iter_mut().zip(&scratch) {
                            *v += *s;
                        }
                    }
                    Err(e) => {
                        first_err.get_or_insert(e);
                    }
                }
            }
            for peer in 1..size {
                self.isend(peer, tag, bytemuck::cast_slice(values)).wait();
            }
            first_err.map_or(Ok(()), Err)
        } else {
            self.isend(0, tag, bytemuck::cast_slice(values)).wait();
            let data = self
                .irecv(0, tag, bytemuck::cast_slice_mut(&mut scratch))
                .wait()
                .ok_or_else(|| reduce_error(0, "no reduced result received".into()))?;
            wire::decode_into(0, &data, values)
        }
    }
}

fn reduce_error(peer: usize, reason: String) -> StencilError {
    StencilError::Comm {
        neighbor: peer,
        reason,
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use crate::stencil_error::StencilError;
    use mpi::collective::SystemOperation;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    // rsmpi traits are imported unnamed: `Communicator` is this crate's trait.
    use mpi::traits::{
        Communicator as _, CommunicatorCollectives as _, Destination as _, Source as _,
    };

    /// `MPI_COMM_WORLD` of an initialized MPI environment. MPI is finalized
    /// when this value is dropped.
    pub struct MpiComm {
        pub world: SimpleCommunicator,
        rank: usize,
        size: usize,
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, StencilError> {
            let universe = mpi::initialize().ok_or(StencilError::MpiInit)?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                _universe: universe,
            })
        }
    }

    /// Completed receive: MPI receives are matched before `irecv` returns.
    pub struct MpiRecv(Option<Vec<u8>>);

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            self.0
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecv;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiRecv {
            let (data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag as i32);
            MpiRecv(Some(data))
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }

        fn allreduce_sum(&self, values: &mut [f64]) -> Result<(), StencilError> {
            let send = values.to_vec();
            self.world
                .all_reduce_into(&send[..], values, &SystemOperation::sum());
            Ok(())
        }
    }

    static_assertions::assert_impl_all!(MpiComm: Communicator);
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn thread_roundtrip_two_ranks() {
        let mut comms = ThreadComm::group(2);
        let comm1 = comms.pop().unwrap();
        let comm0 = comms.pop().unwrap();

        let mut recv_buf = [0u8; 4];
        let recv_handle = comm1.irecv(0, 7, &mut recv_buf);
        comm0.isend(1, 7, &[1, 2, 3, 4]).wait();

        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn receive_blocks_until_send() {
        let mut comms = ThreadComm::group(2);
        let comm1 = comms.pop().unwrap();
        let comm0 = comms.pop().unwrap();
        let rx = thread::spawn(move || {
            let mut buf = [0u8; 3];
            comm1.irecv(0, 1, &mut buf).wait().unwrap()
        });
        thread::sleep(std::time::Duration::from_millis(20));
        comm0.isend(1, 1, &[9, 8, 7]);
        assert_eq!(rx.join().unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn groups_are_isolated() {
        let a = ThreadComm::group(2);
        let b = ThreadComm::group(2);
        a[0].isend(1, 3, &[1]);
        b[0].isend(1, 3, &[2]);
        let mut buf = [0u8; 1];
        assert_eq!(b[1].irecv(0, 3, &mut buf).wait().unwrap(), vec![2]);
        assert_eq!(a[1].irecv(0, 3, &mut buf).wait().unwrap(), vec![1]);
    }

    #[test]
    fn allreduce_sums_in_every_rank() {
        let comms = ThreadComm::group(4);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|c| {
                thread::spawn(move || {
                    let mut v = [c.rank() as f64, 1.0];
                    c.allreduce_sum(&mut v).unwrap();
                    c.barrier();
                    v
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), [6.0, 4.0]);
        }
    }

    #[test]
    fn short_contribution_fails_the_reduction_without_stalling() {
        let mut comms = ThreadComm::group(2);
        let c1 = comms.pop().unwrap();
        let c0 = comms.pop().unwrap();
        let peer = thread::spawn(move || {
            let tag = REDUCE_TAG.as_u16();
            c1.isend(0, tag, bytemuck::cast_slice(&[5.0f64]));
            let mut buf = [0u8; 16];
            c1.irecv(0, tag, &mut buf).wait().unwrap()
        });
        let mut v = [1.0, 2.0];
        let err = c0.allreduce_sum(&mut v).unwrap_err();
        assert!(matches!(err, StencilError::Comm { neighbor: 1, .. }));
        assert_eq!(v, [1.0, 2.0]);
        assert_eq!(peer.join().unwrap().len(), 16);
    }

    #[test]
    fn no_comm_is_a_group_of_one() {
        let comm = NoComm;
        assert_eq!((comm.rank(), comm.size()), (0, 1));
        let mut v = [2.5];
        comm.allreduce_sum(&mut v).unwrap();
        assert_eq!(v, [2.5]);
        let mut buf = [0u8; 8];
        comm.irecv(0, 1, &mut buf);
        assert!(().wait().is_none());
    }
}
