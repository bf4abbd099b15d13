//! Communication, halo exchange and the stencil kernel.

pub mod communicator;
pub mod halo;
pub mod kernel;
pub mod wire;

pub use halo::{GhostExchanger, exchange};
pub use kernel::{BlockSize, KernelConfig};
