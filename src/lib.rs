#![cfg_attr(docsrs, feature(doc_cfg))]
//! # halo-stencil
//!
//! halo-stencil is a distributed-memory 3-D stencil solver. A rectangular
//! global domain is split over a fixed group of ranks; every rank owns one
//! box of cells padded by an 8-cell halo, applies a weighted order-8 star
//! stencil (Jacobi update) to its core, and refreshes its halo from its
//! topological neighbors between iterations.
//!
//! ## Features
//! - gcd-based process-grid splitting with neighbor discovery
//!   ([`topology::decomposition`])
//! - Halo-padded struct-of-arrays meshes with CORE/PHANTOM classification
//!   ([`data::mesh`])
//! - Three-phase halo exchange with barriers ([`algs::halo`])
//! - Cache-blocked kernel, data-parallel over x-blocks with `rayon`
//!   ([`algs::kernel`])
//! - Pluggable communication backends: a single process, an in-process group
//!   of threads, or MPI with the `mpi-support` feature
//!   ([`algs::communicator`])
//!
//! ## Determinism
//!
//! The per-cell summation order of the kernel is fixed, so results do not
//! depend on block sizes or thread counts. Runs whose split axes keep at least
//! [`HALO_WIDTH`] cells per rank reproduce the single-rank values bit for bit.
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! halo-stencil = "0.3"
//! # Optional features:
//! # features = ["mpi-support"]
//! ```

pub mod algs;
pub mod chrono;
pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod driver;
pub mod report;
pub mod stencil_error;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// Halo depth on every face, equal to the stencil order.
pub const HALO_WIDTH: usize = 8;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::HALO_WIDTH;
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, NoComm, ThreadComm, Wait};
    pub use crate::algs::halo::{GhostExchanger, exchange};
    pub use crate::algs::kernel::{BlockSize, KernelConfig};
    pub use crate::config::GlobalProblem;
    pub use crate::data::mesh::{CellKind, Mesh, MeshKind};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::driver::{Solver, run_threaded};
    pub use crate::report::ResultLine;
    pub use crate::stencil_error::StencilError;
    pub use crate::topology::decomposition::{Axis, Decomposition, Direction, Neighbors};
}
