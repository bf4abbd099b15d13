//! Process-grid topology.
//!
//! [`decomposition::Decomposition`] maps a rank to its box of the global
//! domain and to the ranks owning the six adjacent boxes.

pub mod decomposition;

pub use decomposition::{Axis, Decomposition, Direction, Neighbors};
