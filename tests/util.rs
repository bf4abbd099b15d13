#![allow(dead_code)]
use std::thread;

use halo_stencil::algs::communicator::ThreadComm;
use halo_stencil::data::mesh::Mesh;
use halo_stencil::topology::decomposition::Decomposition;
use halo_stencil::HALO_WIDTH;

/// Group sizes paired with global dims that keep every split axis at least
/// `HALO_WIDTH` cells wide per rank.
pub const GROUPS: [(usize, [usize; 3]); 4] = [
    (1, [17, 17, 17]),
    (2, [17, 17, 17]),
    (4, [17, 18, 18]),
    (8, [18, 17, 18]),
];

/// Run `f` on every rank of a fresh in-process group, one thread per rank,
/// and return the results in rank order.
pub fn on_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    F: Fn(&ThreadComm) -> T + Sync,
    T: Send,
{
    let comms = ThreadComm::group(n);
    let f = &f;
    thread::scope(|s| {
        let handles: Vec<_> = comms.iter().map(|c| s.spawn(move || f(c))).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank panicked"))
            .collect()
    })
}

/// Unique, exactly representable value of a global cell.
pub fn global_tag(g: [usize; 3]) -> f64 {
    1.0 + ((g[0] * 1000 + g[1]) * 1000 + g[2]) as f64
}

/// Global coordinates of padded local index `p`, or `None` outside the
/// global domain.
pub fn global_of(d: &Decomposition, p: [usize; 3]) -> Option<[usize; 3]> {
    let off = d.offset();
    let glob = d.global_dims();
    let mut g = [0; 3];
    for a in 0..3 {
        let shifted = (off[a] + p[a]).checked_sub(HALO_WIDTH)?;
        if shifted >= glob[a] {
            return None;
        }
        g[a] = shifted;
    }
    Some(g)
}

/// Fill the core of `mesh` with [`global_tag`] and the halo with `-1`.
pub fn fill_tagged(mesh: &mut Mesh, d: &Decomposition) {
    let [dx, dy, dz] = mesh.dims();
    for (i, j, k) in itertools::iproduct!(0..dx, 0..dy, 0..dz) {
        let v = if mesh.classify(i, j, k) == halo_stencil::data::mesh::CellKind::Core {
            global_tag(global_of(d, [i, j, k]).expect("core cell outside the domain"))
        } else {
            -1.0
        };
        mesh.set(i, j, k, v);
    }
}

/// Bit patterns of a sequence of values.
pub fn bits(values: impl IntoIterator<Item = f64>) -> Vec<u64> {
    values.into_iter().map(f64::to_bits).collect()
}
