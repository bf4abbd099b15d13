//! Ghost-cell (halo) exchange between topological neighbors.
//!
//! One call refreshes all six faces of a mesh in three axis phases, x then y
//! then z. Within a phase:
//!
//! 1. the upper core slab goes to the upper neighbor while the lower halo is
//!    filled from the lower neighbor;
//! 2. the lower core slab goes to the lower neighbor while the upper halo is
//!    filled from the upper neighbor.
//!
//! Every slab is [`HALO_WIDTH`] layers thick and spans the full padded extent
//! of the other two axes, so edge and corner halo cells are refreshed as a
//! side effect of the later phases. Phases share one tag; a group-wide barrier
//! after each phase keeps a fast rank from matching a message of the next
//! phase against a receive of the current one.
//!
//! Known limitation: there is no timeout. A stalled neighbor stalls the group.

use std::ops::Range;

use crate::HALO_WIDTH;
use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire;
use crate::data::mesh::Mesh;
use crate::stencil_error::StencilError;
use crate::topology::decomposition::{Axis, Decomposition, Direction};

/// Tag of every halo message.
pub const HALO_TAG: CommTag = CommTag::new(0x4A10);

/// Padded index box `HALO_WIDTH` layers thick on `axis`, starting at `start`.
fn slab(dims: [usize; 3], axis: Axis, start: usize) -> [Range<usize>; 3] {
    let mut ranges = dims.map(|d| 0..d);
    ranges[axis.index()] = start..start + HALO_WIDTH;
    ranges
}

fn slab_len(ranges: &[Range<usize>; 3]) -> usize {
    ranges.iter().map(|r| r.len()).product()
}

/// Copy the cells of `ranges` into `buf` in storage order.
fn pack(mesh: &Mesh, ranges: &[Range<usize>; 3], buf: &mut Vec<f64>) {
    buf.clear();
    let [rx, ry, rz] = ranges;
    let values = mesh.values();
    for i in rx.clone() {
        for j in ry.clone() {
            let from = mesh.idx(i, j, rz.start);
            buf.extend_from_slice(&values[from..from + rz.len()]);
        }
    }
}

/// Inverse of [`pack`].
fn unpack(mesh: &mut Mesh, ranges: &[Range<usize>; 3], buf: &[f64]) {
    let [rx, ry, rz] = ranges;
    let row = rz.len();
    let mut rows = buf.chunks_exact(row);
    for i in rx.clone() {
        for j in ry.clone() {
            let from = mesh.idx(i, j, rz.start);
            if let Some(src) = rows.next() {
                mesh.values_mut()[from..from + row].copy_from_slice(src);
            }
        }
    }
}

/// Drives the halo protocol of one rank.
///
/// The exchanger keeps a packing buffer between calls, so reuse one instance
/// for every exchange of a run.
pub struct GhostExchanger<'a, C: Communicator> {
    decomposition: &'a Decomposition,
    comm: &'a C,
    scratch: Vec<f64>,
}

impl<'a, C: Communicator> GhostExchanger<'a, C> {
    pub fn new(decomposition: &'a Decomposition, comm: &'a C) -> Self {
        Self {
            decomposition,
            comm,
            scratch: Vec::new(),
        }
    }

    /// Overwrite the halo of `mesh` on all six faces with the neighbors'
    /// boundary-adjacent core cells. Blocks until the whole group has
    /// finished the z phase.
    ///
    /// A failed or short receive does not abort the protocol: the remaining
    /// transfers and barriers still run so the other ranks are not left
    /// waiting, and the first error is returned at the end.
    ///
    /// # Errors
    /// - [`StencilError::DimensionMismatch`] if `mesh` was not sized for this
    ///   decomposition. This is checked before any message is sent and skips
    ///   the barriers, so correctly sized peers stay blocked in the x phase.
    /// - [`StencilError::Comm`] on a missing or wrongly sized payload.
    pub fn exchange(&mut self, mesh: &mut Mesh) -> Result<(), StencilError> {
        let expected = self.decomposition.mesh_dims();
        if mesh.dims() != expected {
            return Err(StencilError::DimensionMismatch {
                what: "GhostExchanger::exchange",
                expected,
                found: mesh.dims(),
            });
        }
        let mut first_err = None;
        for axis in Axis::ALL {
            if let Err(e) = self.exchange_axis(mesh, axis) {
                first_err.get_or_insert(e);
            }
            self.comm.barrier();
        }
        first_err.map_or(Ok(()), Err)
    }

    fn exchange_axis(&mut self, mesh: &mut Mesh, axis: Axis) -> Result<(), StencilError> {
        let neighbors = self.decomposition.neighbors();
        let lower = neighbors.get(Direction::lower(axis));
        let upper = neighbors.get(Direction::upper(axis));
        let dim = mesh.dims()[axis.index()];
        log::trace!(
            "rank {}: {}-phase lower={lower:?} upper={upper:?}",
            self.decomposition.rank(),
            axis.name()
        );

        // Upper core slab travels up, lower halo is filled from below.
        let up = self.transfer(mesh, axis, upper, dim - 2 * HALO_WIDTH, lower, 0);
        // Lower core slab travels down, upper halo is filled from above.
        let down = self.transfer(mesh, axis, lower, HALO_WIDTH, upper, dim - HALO_WIDTH);
        up.and(down)
    }

    fn transfer(
        &mut self,
        mesh: &mut Mesh,
        axis: Axis,
        send_to: Option<usize>,
        send_start: usize,
        recv_from: Option<usize>,
        recv_start: usize,
    ) -> Result<(), StencilError> {
        let tag = HALO_TAG.as_u16();
        if let Some(peer) = send_to {
            let ranges = slab(mesh.dims(), axis, send_start);
            if axis == Axis::X {
                // x-slabs are whole planes: contiguous in storage.
                let from = mesh.idx(send_start, 0, 0);
                let len = slab_len(&ranges);
                self.comm
                    .isend(peer, tag, wire::cast_slice(&mesh.values()[from..from + len]))
                    .wait();
            } else {
                pack(mesh, &ranges, &mut self.scratch);
                self.comm
                    .isend(peer, tag, wire::cast_slice(&self.scratch))
                    .wait();
            }
        }

        let Some(peer) = recv_from else {
            return Ok(());
        };
        let ranges = slab(mesh.dims(), axis, recv_start);
        let len = slab_len(&ranges);
        if axis == Axis::X {
            let from = mesh.idx(recv_start, 0, 0);
            let dst = &mut mesh.values_mut()[from..from + len];
            let payload = self
                .comm
                .irecv(peer, tag, wire::cast_slice_mut(dst))
                .wait()
                .ok_or_else(|| missing(peer))?;
            wire::decode_into(peer, &payload, dst)
        } else {
            self.scratch.resize(len, 0.0);
            let payload = self
                .comm
                .irecv(peer, tag, wire::cast_slice_mut(&mut self.scratch))
                .wait()
                .ok_or_else(|| missing(peer))?;
            wire::decode_into(peer, &payload, &mut self.scratch)?;
            unpack(mesh, &ranges, &self.scratch);
            Ok(())
        }
    }
}

fn missing(peer: usize) -> StencilError {
    StencilError::Comm {
        neighbor: peer,
        reason: "no halo payload received".into(),
    }
}

/// One-shot form of [`GhostExchanger::exchange`].
pub fn exchange<C: Communicator>(
    decomposition: &Decomposition,
    mesh: &mut Mesh,
    comm: &C,
) -> Result<(), StencilError> {
    GhostExchanger::new(decomposition, comm).exchange(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::data::mesh::MeshKind;

    #[test]
    fn pack_unpack_preserve_slab_cells() {
        let mut m = Mesh::new([3, 4, 5], MeshKind::Input).unwrap();
        for (n, v) in m.values_mut().iter_mut().enumerate() {
            *v = n as f64;
        }
        let ranges = slab(m.dims(), Axis::Z, HALO_WIDTH);
        let mut buf = Vec::new();
        pack(&m, &ranges, &mut buf);
        assert_eq!(buf.len(), 19 * 20 * HALO_WIDTH);
        assert_eq!(buf[0], m.get(0, 0, HALO_WIDTH));
        assert_eq!(buf[HALO_WIDTH], m.get(0, 1, HALO_WIDTH));

        let mut other = Mesh::new([3, 4, 5], MeshKind::Input).unwrap();
        unpack(&mut other, &ranges, &buf);
        for (i, j, k) in itertools::iproduct!(0..19, 0..20, 0..21) {
            let inside = (HALO_WIDTH..2 * HALO_WIDTH).contains(&k);
            let want = if inside { m.get(i, j, k) } else { 0.0 };
            assert_eq!(other.get(i, j, k), want);
        }
    }

    #[test]
    fn single_rank_exchange_is_a_no_op() {
        let d = Decomposition::new(0, 1, [4, 4, 4]).unwrap();
        let mut m = Mesh::new(d.local_dims(), MeshKind::Input).unwrap();
        m.values_mut().fill(2.0);
        let before = m.clone();
        exchange(&d, &mut m, &NoComm).unwrap();
        assert_eq!(m, before);
    }

    #[test]
    fn mesh_of_wrong_size_is_rejected() {
        let d = Decomposition::new(0, 1, [4, 4, 4]).unwrap();
        let mut m = Mesh::new([4, 4, 5], MeshKind::Input).unwrap();
        assert!(matches!(
            exchange(&d, &mut m, &NoComm),
            Err(StencilError::DimensionMismatch { .. })
        ));
    }
}
