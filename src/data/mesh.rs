//! Halo-padded scalar field owned by one rank.
//!
//! Values and cell classifications live in two contiguous buffers (struct of
//! arrays) with row-major layout: `idx(i, j, k) = (i * dim_y + j) * dim_z + k`.
//! z is the fastest-varying axis, x the slowest, so an x-plane is one
//! contiguous run of `dim_y * dim_z` cells.

use std::io::{self, Write};
use std::ops::{Index, IndexMut, Range};

use static_assertions::{assert_eq_size, const_assert};

use crate::HALO_WIDTH;
use crate::debug_invariants::DebugInvariants;
use crate::stencil_error::StencilError;

const_assert!(HALO_WIDTH > 0);

/// Classification of a cell inside a padded mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CellKind {
    /// Owned and updated by this rank.
    Core,
    /// Halo copy of a neighbor's core, or padding at the global boundary.
    Phantom,
}

assert_eq_size!(CellKind, u8);

/// Role of a mesh in the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeshKind {
    /// Spatially varying coefficient field `B`, never updated after init.
    Constant,
    /// Evolving field `A`.
    Input,
    /// Scratch output `C`.
    Output,
}

impl MeshKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            MeshKind::Constant => "CONSTANT",
            MeshKind::Input => "INPUT",
            MeshKind::Output => "OUTPUT",
        }
    }
}

/// A local 3-D field padded by [`HALO_WIDTH`] cells on every face.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    dims: [usize; 3],
    values: Vec<f64>,
    cells: Vec<CellKind>,
    kind: MeshKind,
}

/// Core test for one axis of extent `dim` (halo included).
#[inline]
fn is_core_on_axis(i: usize, dim: usize) -> bool {
    i >= HALO_WIDTH && i + HALO_WIDTH < dim
}

fn try_filled<T: Copy>(len: usize, fill: T) -> Result<Vec<T>, StencilError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| StencilError::Allocation { cells: len })?;
    buf.resize(len, fill);
    Ok(buf)
}

impl Mesh {
    /// Allocate a mesh for `local_dims` owned cells per axis. The stored
    /// dimensions include the halo. Values start at `0.0`; cells are
    /// classified immediately.
    ///
    /// # Errors
    /// [`StencilError::Allocation`] if the buffers cannot be reserved.
    pub fn new(local_dims: [usize; 3], kind: MeshKind) -> Result<Self, StencilError> {
        let dims = local_dims.map(|d| d + 2 * HALO_WIDTH);
        let len = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or(StencilError::Allocation { cells: usize::MAX })?;

        let values = try_filled(len, 0.0f64)?;
        let mut cells = try_filled(len, CellKind::Phantom)?;
        let [dx, dy, dz] = dims;
        for (i, j, k) in itertools::iproduct!(0..dx, 0..dy, 0..dz) {
            if is_core_on_axis(i, dx) && is_core_on_axis(j, dy) && is_core_on_axis(k, dz) {
                cells[(i * dy + j) * dz + k] = CellKind::Core;
            }
        }
        log::debug!(
            "allocated {} mesh {}x{}x{} ({} cells)",
            kind.as_str(),
            dx,
            dy,
            dz,
            len
        );
        Ok(Self {
            dims,
            values,
            cells,
            kind,
        })
    }

    /// Padded dimensions `[dim_x, dim_y, dim_z]`.
    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Owned extent per axis (dimensions without the halo).
    #[inline]
    pub fn core_dims(&self) -> [usize; 3] {
        self.dims.map(|d| d - 2 * HALO_WIDTH)
    }

    #[inline]
    pub fn dim_x(&self) -> usize {
        self.dims[0]
    }

    #[inline]
    pub fn dim_y(&self) -> usize {
        self.dims[1]
    }

    #[inline]
    pub fn dim_z(&self) -> usize {
        self.dims[2]
    }

    #[inline]
    pub fn kind(&self) -> MeshKind {
        self.kind
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cells in one x-plane (`dim_y * dim_z`).
    #[inline]
    pub fn plane_len(&self) -> usize {
        self.dims[1] * self.dims[2]
    }

    /// Linear offset of `(i, j, k)`, halo included.
    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.dims[0] && j < self.dims[1] && k < self.dims[2]);
        (i * self.dims[1] + j) * self.dims[2] + k
    }

    /// Linear offset of core-relative `(i, j, k)`: `(0, 0, 0)` is the first
    /// owned cell.
    #[inline]
    pub fn idx_core(&self, i: usize, j: usize, k: usize) -> usize {
        self.idx(i + HALO_WIDTH, j + HALO_WIDTH, k + HALO_WIDTH)
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> f64 {
        self.values[self.idx(i, j, k)]
    }

    #[inline]
    pub fn get_core(&self, i: usize, j: usize, k: usize) -> f64 {
        self.values[self.idx_core(i, j, k)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f64) {
        let at = self.idx(i, j, k);
        self.values[at] = value;
    }

    #[inline]
    pub fn cell_kind(&self, i: usize, j: usize, k: usize) -> CellKind {
        self.cells[self.idx(i, j, k)]
    }

    /// Classification rule for a padded index, independent of any stored state.
    pub fn classify(&self, i: usize, j: usize, k: usize) -> CellKind {
        let [dx, dy, dz] = self.dims;
        if is_core_on_axis(i, dx) && is_core_on_axis(j, dy) && is_core_on_axis(k, dz) {
            CellKind::Core
        } else {
            CellKind::Phantom
        }
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    #[inline]
    pub fn cell_kinds(&self) -> &[CellKind] {
        &self.cells
    }

    /// Mutable values alongside the (read-only) classification.
    #[inline]
    pub fn values_and_kinds_mut(&mut self) -> (&mut [f64], &[CellKind]) {
        (&mut self.values, &self.cells)
    }

    /// Padded index range of the core on each axis.
    pub fn core_ranges(&self) -> [Range<usize>; 3] {
        self.dims.map(|d| HALO_WIDTH..d - HALO_WIDTH)
    }

    /// Number of core cells.
    pub fn core_len(&self) -> usize {
        self.core_dims().iter().product()
    }

    /// Fail unless `other` has the same padded dimensions.
    pub fn ensure_same_dims(&self, other: &Mesh, what: &'static str) -> Result<(), StencilError> {
        if self.dims != other.dims {
            return Err(StencilError::DimensionMismatch {
                what,
                expected: self.dims,
                found: other.dims,
            });
        }
        Ok(())
    }

    /// Copy the core region of `src` into the core region of `self`. Halo
    /// cells of `self` are left untouched.
    ///
    /// # Errors
    /// [`StencilError::DimensionMismatch`] if the meshes differ in shape.
    pub fn copy_core_from(&mut self, src: &Mesh) -> Result<(), StencilError> {
        self.ensure_same_dims(src, "Mesh::copy_core_from")?;
        let [rx, ry, rz] = self.core_ranges();
        for i in rx {
            for j in ry.clone() {
                let from = self.idx(i, j, rz.start);
                let to = from + rz.len();
                self.values[from..to].copy_from_slice(&src.values[from..to]);
            }
        }
        Ok(())
    }

    /// Dump dimensions, role and every value, x-plane by x-plane. Core values
    /// are wrapped in ANSI bold when `highlight_core` is set.
    pub fn write_values<W: Write>(
        &self,
        name: &str,
        highlight_core: bool,
        out: &mut W,
    ) -> io::Result<()> {
        let [dx, dy, dz] = self.dims;
        writeln!(out, "MESH `{name}`")?;
        writeln!(out, "\tKIND: {}", self.kind.as_str())?;
        writeln!(out, "\tDIMS: {dx}x{dy}x{dz}")?;
        writeln!(out, "\tVALUES:")?;
        for i in 0..dx {
            for j in 0..dy {
                for k in 0..dz {
                    let v = self.get(i, j, k);
                    if highlight_core && self.cell_kind(i, j, k) == CellKind::Core {
                        write!(out, "\x1b[1m{v:6.3}\x1b[0m ")?;
                    } else {
                        write!(out, "{v:6.3} ")?;
                    }
                }
                writeln!(out)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

impl Index<(usize, usize, usize)> for Mesh {
    type Output = f64;

    #[inline]
    fn index(&self, (i, j, k): (usize, usize, usize)) -> &f64 {
        &self.values[self.idx(i, j, k)]
    }
}

impl IndexMut<(usize, usize, usize)> for Mesh {
    #[inline]
    fn index_mut(&mut self, (i, j, k): (usize, usize, usize)) -> &mut f64 {
        let at = self.idx(i, j, k);
        &mut self.values[at]
    }
}

impl DebugInvariants for Mesh {
    fn validate_invariants(&self) -> Result<(), StencilError> {
        let expected: usize = self.dims.iter().product();
        if self.values.len() != expected || self.cells.len() != expected {
            return Err(StencilError::Invariant(format!(
                "mesh buffers hold {} values / {} kinds, expected {expected}",
                self.values.len(),
                self.cells.len()
            )));
        }
        if self.dims.iter().any(|&d| d < 2 * HALO_WIDTH) {
            return Err(StencilError::Invariant(format!(
                "mesh dims {:?} smaller than the halo padding",
                self.dims
            )));
        }
        let [dx, dy, dz] = self.dims;
        if let Some((i, j, k)) = itertools::iproduct!(0..dx, 0..dy, 0..dz)
            .find(|&(i, j, k)| self.cell_kind(i, j, k) != self.classify(i, j, k))
        {
            return Err(StencilError::Invariant(format!(
                "cell ({i}, {j}, {k}) misclassified"
            )));
        }
        Ok(())
    }
}
