//! Role-specific initial values for the three solver meshes.

use crate::data::mesh::{CellKind, Mesh, MeshKind};
use crate::stencil_error::StencilError;
use crate::topology::decomposition::Decomposition;

/// Coefficient of the CONSTANT field at plain cell coordinates.
#[inline]
pub fn constant_coefficient(x: usize, y: usize, z: usize) -> f64 {
    ((z as f64) * (x as f64 + 0.311).cos() * (y as f64 + 0.817).cos() + 0.613).sin()
}

/// Fill `mesh` according to its role.
///
/// CONSTANT cells receive [`constant_coefficient`] at `offset + padded index`,
/// halo cells included; INPUT is `1.0` on core and `0.0` on the halo; OUTPUT
/// is zeroed.
///
/// # Errors
/// [`StencilError::DimensionMismatch`] if `mesh` was not sized for
/// `decomposition`.
pub fn init_mesh(mesh: &mut Mesh, decomposition: &Decomposition) -> Result<(), StencilError> {
    let expected = decomposition.mesh_dims();
    if mesh.dims() != expected {
        return Err(StencilError::DimensionMismatch {
            what: "init_mesh",
            expected,
            found: mesh.dims(),
        });
    }
    let [dx, dy, dz] = mesh.dims();
    let [ox, oy, oz] = decomposition.offset();
    match mesh.kind() {
        MeshKind::Constant => {
            for (i, j, k) in itertools::iproduct!(0..dx, 0..dy, 0..dz) {
                mesh[(i, j, k)] = constant_coefficient(ox + i, oy + j, oz + k);
            }
        }
        MeshKind::Input => {
            let (values, kinds) = mesh.values_and_kinds_mut();
            for (v, kind) in values.iter_mut().zip(kinds) {
                *v = match kind {
                    CellKind::Core => 1.0,
                    CellKind::Phantom => 0.0,
                };
            }
        }
        MeshKind::Output => mesh.values_mut().fill(0.0),
    }
    Ok(())
}

fn expect_role(mesh: &Mesh, role: MeshKind, what: &'static str) -> Result<(), StencilError> {
    if mesh.kind() != role {
        return Err(StencilError::RoleMismatch {
            what,
            expected: role.as_str(),
            found: mesh.kind().as_str(),
        });
    }
    Ok(())
}

/// Initialize the evolving field `a`, the coefficient field `b` and the
/// scratch field `c` of one rank.
pub fn init_meshes(
    a: &mut Mesh,
    b: &mut Mesh,
    c: &mut Mesh,
    decomposition: &Decomposition,
) -> Result<(), StencilError> {
    expect_role(a, MeshKind::Input, "init_meshes(A)")?;
    expect_role(b, MeshKind::Constant, "init_meshes(B)")?;
    expect_role(c, MeshKind::Output, "init_meshes(C)")?;
    a.ensure_same_dims(b, "init_meshes(A, B)")?;
    b.ensure_same_dims(c, "init_meshes(B, C)")?;

    init_mesh(a, decomposition)?;
    init_mesh(b, decomposition)?;
    init_mesh(c, decomposition)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meshes(d: &Decomposition) -> (Mesh, Mesh, Mesh) {
        let local = d.local_dims();
        (
            Mesh::new(local, MeshKind::Input).unwrap(),
            Mesh::new(local, MeshKind::Constant).unwrap(),
            Mesh::new(local, MeshKind::Output).unwrap(),
        )
    }

    #[test]
    fn input_is_one_on_core_only() {
        let d = Decomposition::new(0, 1, [3, 3, 3]).unwrap();
        let (mut a, mut b, mut c) = meshes(&d);
        init_meshes(&mut a, &mut b, &mut c, &d).unwrap();
        let ones = a.values().iter().filter(|&&v| v == 1.0).count();
        assert_eq!(ones, 27);
        assert_eq!(a.values().iter().sum::<f64>(), 27.0);
        assert!(c.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn constant_uses_offset_plus_padded_index() {
        let d = Decomposition::new(1, 2, [17, 17, 17]).unwrap();
        let (mut a, mut b, mut c) = meshes(&d);
        init_meshes(&mut a, &mut b, &mut c, &d).unwrap();
        assert_eq!(b.get(0, 0, 0), constant_coefficient(8, 0, 0));
        assert_eq!(b.get(3, 5, 7), constant_coefficient(11, 5, 7));
        assert_eq!(b.get(0, 0, 0), (0.613f64).sin());
    }

    #[test]
    fn swapped_roles_are_rejected() {
        let d = Decomposition::new(0, 1, [2, 2, 2]).unwrap();
        let (mut a, mut b, mut c) = meshes(&d);
        assert!(matches!(
            init_meshes(&mut b, &mut a, &mut c, &d),
            Err(StencilError::RoleMismatch { .. })
        ));
    }

    #[test]
    fn mesh_must_match_decomposition() {
        let d = Decomposition::new(0, 1, [2, 2, 2]).unwrap();
        let mut m = Mesh::new([2, 2, 3], MeshKind::Output).unwrap();
        assert!(matches!(
            init_mesh(&mut m, &d),
            Err(StencilError::DimensionMismatch { .. })
        ));
    }
}
