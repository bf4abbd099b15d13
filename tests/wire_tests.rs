use halo_stencil::algs::wire::{cast_slice, decode_into, expect_exact_len};
use halo_stencil::stencil_error::StencilError;

#[test]
fn expect_exact_len_err() {
    assert!(expect_exact_len(3, 4).is_err());
    assert!(expect_exact_len(4, 4).is_ok());
}

#[test]
fn long_payload_is_rejected_too() {
    let src = [1.0f64, 2.0, 3.0];
    let mut dst = [0.0f64; 2];
    assert!(matches!(
        decode_into(1, cast_slice(&src), &mut dst),
        Err(StencilError::Comm { neighbor: 1, .. })
    ));
    assert_eq!(dst, [0.0, 0.0]);
}

#[test]
fn unaligned_payload_decodes() {
    let src = [0.25f64, -7.5];
    let mut shifted = vec![0u8; 17];
    shifted[1..].copy_from_slice(cast_slice(&src));
    let mut dst = [0.0f64; 2];
    decode_into(0, &shifted[1..], &mut dst).unwrap();
    assert_eq!(dst, src);
}
