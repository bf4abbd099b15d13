//! Data module: halo-padded meshes and their initial values

pub mod init;
pub mod mesh;

pub use init::{init_mesh, init_meshes};
pub use mesh::{CellKind, Mesh, MeshKind};
