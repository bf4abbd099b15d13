//! Byte views of `f64` slabs for the communicator.
//!
//! Halo payloads are raw native-endian `f64`s: every rank of a run executes
//! the same binary on the same kind of node, so no wire framing is applied.

use crate::stencil_error::StencilError;

pub fn cast_slice(v: &[f64]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut(v: &mut [f64]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Copy a received payload into `dst`, which must be exactly as long.
///
/// The received `Vec<u8>` carries no alignment guarantee, so it is copied
/// byte-wise into the (aligned) destination rather than reinterpreted.
pub fn decode_into(peer: usize, payload: &[u8], dst: &mut [f64]) -> Result<(), StencilError> {
    let bytes = cast_slice_mut(dst);
    expect_exact_len(payload.len(), bytes.len())
        .map_err(|reason| StencilError::Comm { neighbor: peer, reason })?;
    bytes.copy_from_slice(payload);
    Ok(())
}
