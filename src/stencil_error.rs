//! StencilError: unified error type for halo-stencil public APIs
//!
//! The library never terminates the process. Every fatal condition (bad
//! topology, contract violations between meshes, allocation and I/O failures)
//! is returned as a `StencilError` and the binary decides how to exit.

use thiserror::Error;

/// Unified error type for halo-stencil operations.
#[derive(Debug, Error)]
pub enum StencilError {
    /// The process count cannot be mapped onto the global domain with the
    /// gcd-based splitting.
    #[error(
        "splitting does not match communicator size: expected {process_count} ranks, \
         got factors {factors:?} for global dims {dims:?}"
    )]
    Unfactorizable {
        process_count: usize,
        factors: [usize; 3],
        dims: [usize; 3],
    },
    /// The splitting puts more ranks on an axis than it has cells.
    #[error("{ranks} ranks along {axis} exceed the {cells} cells of that axis")]
    AxisOverflow {
        axis: &'static str,
        ranks: usize,
        cells: usize,
    },
    /// A rank outside `0..process_count`, or an empty process group.
    #[error("rank {rank} is not valid in a group of {process_count} processes")]
    InvalidRank { rank: usize, process_count: usize },
    /// A global dimension of zero.
    #[error("global dimensions must be positive, got {0:?}")]
    EmptyDomain([usize; 3]),
    /// Two meshes (or a mesh and its decomposition) disagree on their shape
    /// or role. This is a programming-contract violation.
    #[error("dimension mismatch in {what}: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: [usize; 3],
        found: [usize; 3],
    },
    /// A mesh was handed to an operation expecting a different role.
    #[error("mesh role mismatch in {what}: expected {expected}, found {found}")]
    RoleMismatch {
        what: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    /// Storage for a mesh could not be reserved.
    #[error("failed to allocate mesh storage for {cells} cells")]
    Allocation { cells: usize },
    /// Point-to-point communication with a neighbor failed or returned a
    /// payload of the wrong size.
    #[error("communication with rank {neighbor} failed: {reason}")]
    Comm { neighbor: usize, reason: String },
    /// A rank of an in-process group panicked.
    #[error("rank {0} panicked")]
    RankPanicked(usize),
    /// MPI could not be initialized (or was already initialized).
    #[error("MPI initialization failed")]
    MpiInit,
    /// Configuration text could not be parsed.
    #[error("configuration error at line {line}: {reason}")]
    Config { line: usize, reason: String },
    /// A result file line could not be parsed.
    #[error("malformed result at line {line}: {reason}")]
    ResultFormat { line: usize, reason: String },
    /// Reference and candidate results describe different problems.
    #[error("reference dims {reference:?} and result dims {results:?} do not match")]
    ResultDims {
        reference: [usize; 3],
        results: [usize; 3],
    },
    /// An invariant of a data structure does not hold.
    #[error("invariant violated: {0}")]
    Invariant(String),
    /// The result file could not be created.
    #[error("failed to open output file `{}`: {source}", path.display())]
    Output {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// I/O failure (result file, configuration file).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
