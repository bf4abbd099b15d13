//! Structural self-checks for decompositions and meshes.

use crate::stencil_error::StencilError;

/// Trait for validating data structure invariants.
pub trait DebugInvariants {
    /// Validate invariants and return the first error encountered.
    fn validate_invariants(&self) -> Result<(), StencilError>;

    /// Panic on a violated invariant in debug builds, or when one of the
    /// `strict-invariants` / `check-invariants` features is enabled.
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "structure check");
    }
}

/// Run a fallible check and panic on error when invariant checking is enabled.
/// Compiles to nothing in release builds without the checking features.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants", feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
