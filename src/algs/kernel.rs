//! Weighted order-8 star stencil (Jacobi update).
//!
//! For every core cell:
//!
//! ```text
//! C = A·B + Σ_{o=1..8} (A·B at +x, -x, +y, -y, +z, -z, distance o) / 17^o
//! ```
//!
//! after which the core of `A` is overwritten with the core of `C`. The
//! per-cell summation order is fixed, so the result is bit-identical for any
//! block size and any number of worker threads.

use once_cell::sync::Lazy;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::HALO_WIDTH;
use crate::data::mesh::Mesh;
use crate::stencil_error::StencilError;

/// `1 / 17^o` for `o = 1..=HALO_WIDTH`.
pub static INV_POW17: Lazy<[f64; HALO_WIDTH]> =
    Lazy::new(|| std::array::from_fn(|o| 1.0 / 17f64.powi(o as i32 + 1)));

/// Cache-blocking extents in padded cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSize {
    pub bi: usize,
    pub bj: usize,
    pub bk: usize,
}

impl Default for BlockSize {
    fn default() -> Self {
        Self {
            bi: 8,
            bj: 8,
            bk: 4096,
        }
    }
}

impl BlockSize {
    pub const fn new(bi: usize, bj: usize, bk: usize) -> Self {
        Self { bi, bj, bk }
    }

    /// Zero extents are treated as one.
    fn sanitized(self) -> Self {
        Self {
            bi: self.bi.max(1),
            bj: self.bj.max(1),
            bk: self.bk.max(1),
        }
    }
}

/// Tuning knobs of [`apply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    pub block: BlockSize,
    /// Spread x-blocks over the rayon pool. Ignored without the `rayon`
    /// feature.
    pub parallel: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            block: BlockSize::default(),
            parallel: true,
        }
    }
}

impl KernelConfig {
    pub fn serial() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn with_block(mut self, block: BlockSize) -> Self {
        self.block = block;
        self
    }
}

#[inline(always)]
fn star(a: &[f64], b: &[f64], at: usize, sx: usize, sy: usize, w: &[f64; HALO_WIDTH]) -> f64 {
    let ab = |n: usize| a[n] * b[n];
    let mut sum = ab(at);
    for o in 1..=HALO_WIDTH {
        sum += (ab(at + o * sx)
            + ab(at - o * sx)
            + ab(at + o * sy)
            + ab(at - o * sy)
            + ab(at + o)
            + ab(at - o))
            * w[o - 1];
    }
    sum
}

/// Stencil value of core cell `(i, j, k)` (padded indices) without touching
/// any mesh.
pub fn evaluate_cell(a: &Mesh, b: &Mesh, i: usize, j: usize, k: usize) -> f64 {
    star(
        a.values(),
        b.values(),
        a.idx(i, j, k),
        a.plane_len(),
        a.dim_z(),
        &INV_POW17,
    )
}

/// Fill the `out` planes starting at padded x-index `x0`.
fn compute_planes(
    a: &[f64],
    b: &[f64],
    out: &mut [f64],
    x0: usize,
    dims: [usize; 3],
    block: BlockSize,
) {
    let [_, dy, dz] = dims;
    let plane = dy * dz;
    let w: &[f64; HALO_WIDTH] = &INV_POW17;
    let (j_end, k_end) = (dy - HALO_WIDTH, dz - HALO_WIDTH);
    let planes = out.len() / plane;
    for jj in (HALO_WIDTH..j_end).step_by(block.bj) {
        for kk in (HALO_WIDTH..k_end).step_by(block.bk) {
            let j_max = (jj + block.bj).min(j_end);
            let k_max = (kk + block.bk).min(k_end);
            for p in 0..planes {
                let i = x0 + p;
                for j in jj..j_max {
                    let row = p * plane + j * dz;
                    let at = (i * dy + j) * dz;
                    for k in kk..k_max {
                        out[row + k] = star(a, b, at + k, plane, dz, w);
                    }
                }
            }
        }
    }
}

#[cfg(feature = "rayon")]
fn for_each_x_block<F>(core: &mut [f64], chunk: usize, parallel: bool, f: F)
where
    F: Fn((usize, &mut [f64])) + Send + Sync,
{
    if parallel {
        core.par_chunks_mut(chunk).enumerate().for_each(f);
    } else {
        core.chunks_mut(chunk).enumerate().for_each(f);
    }
}

#[cfg(not(feature = "rayon"))]
fn for_each_x_block<F>(core: &mut [f64], chunk: usize, _parallel: bool, f: F)
where
    F: Fn((usize, &mut [f64])),
{
    core.chunks_mut(chunk).enumerate().for_each(f);
}

/// One Jacobi step: compute the core of `c` from `a` and `b`, then copy it
/// into the core of `a`. Halo cells of `a` and `c` are not written.
///
/// # Errors
/// [`StencilError::DimensionMismatch`] unless all three meshes share their
/// padded dimensions.
pub fn apply(a: &mut Mesh, b: &Mesh, c: &mut Mesh, cfg: &KernelConfig) -> Result<(), StencilError> {
    a.ensure_same_dims(b, "kernel::apply(A, B)")?;
    b.ensure_same_dims(c, "kernel::apply(B, C)")?;
    if c.core_len() == 0 {
        return Ok(());
    }

    let dims = c.dims();
    let plane = c.plane_len();
    let block = cfg.block.sanitized();
    let chunk = block.bi * plane;
    let (av, bv) = (a.values(), b.values());
    let core = &mut c.values_mut()[HALO_WIDTH * plane..(dims[0] - HALO_WIDTH) * plane];
    for_each_x_block(core, chunk, cfg.parallel, |(n, out)| {
        compute_planes(av, bv, out, HALO_WIDTH + n * block.bi, dims, block)
    });

    a.copy_core_from(c)
}
