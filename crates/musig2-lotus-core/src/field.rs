//! secp256k1 base-field arithmetic needed for the Lotus quadratic-residue
//! rule — `k256` does not expose a public API for raw field-element modular
//! exponentiation, so this computes Euler's criterion directly on the
//! coordinate bytes via `num-bigint`.
//!
//! This is deliberately distinct from BIP-340's "has even y" convention:
//! Lotus asks whether `y` is a quadratic residue mod `p`, not whether it is
//! even. The two rules pick different signs for roughly half of all points.

use num_bigint::BigUint;
use once_cell::sync::Lazy;

use crate::error::MusigError;

/// secp256k1 base field prime, `p = 2^256 - 2^32 - 977`.
const FIELD_PRIME_HEX: &str =
    "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFC2F";

static FIELD_PRIME: Lazy<BigUint> =
    Lazy::new(|| BigUint::parse_bytes(FIELD_PRIME_HEX.as_bytes(), 16).expect("valid prime literal"));

/// Euler's criterion: `y` is a quadratic residue mod `p` iff
/// `y^((p-1)/2) mod p == 1`. `y == 0` is treated as not-a-residue, matching
/// the convention that the point at infinity never appears here.
pub fn is_quadratic_residue(y: &BigUint) -> bool {
    if y == &BigUint::from(0u8) {
        return false;
    }
    let p = &*FIELD_PRIME;
    let exponent = (p - BigUint::from(1u8)) / BigUint::from(2u8);
    y.modpow(&exponent, p) == BigUint::from(1u8)
}

pub fn y_bytes_are_quadratic_residue(y: &[u8; 32]) -> bool {
    is_quadratic_residue(&BigUint::from_bytes_be(y))
}

/// Recovers the y-coordinate for a given x-coordinate on secp256k1
/// (`y^2 = x^3 + 7 mod p`), selecting whichever of the two roots is a
/// quadratic residue per the Lotus rule. Returns the 32-byte big-endian
/// encoding of that y.
pub fn lift_x_to_qr_y(x: &[u8; 32]) -> Result<[u8; 32], MusigError> {
    let p = &*FIELD_PRIME;
    let x_big = BigUint::from_bytes_be(x);
    if x_big >= *p {
        return Err(MusigError::InvalidInput("x coordinate out of field range".into()));
    }

    let rhs = (&x_big * &x_big * &x_big + BigUint::from(7u8)) % p;

    // p ≡ 3 (mod 4) for secp256k1, so a square root candidate is
    // rhs^((p+1)/4) mod p when rhs is indeed a quadratic residue.
    let sqrt_exponent = (p + BigUint::from(1u8)) / BigUint::from(4u8);
    let y0 = rhs.modpow(&sqrt_exponent, p);

    if (&y0 * &y0) % p != rhs {
        return Err(MusigError::InvalidInput("x is not on the curve".into()));
    }

    let y = if is_quadratic_residue(&y0) {
        y0
    } else {
        p - &y0
    };

    let mut out = [0u8; 32];
    let y_bytes = y.to_bytes_be();
    out[32 - y_bytes.len()..].copy_from_slice(&y_bytes);
    Ok(out)
}
