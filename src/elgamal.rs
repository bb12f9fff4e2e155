//! EC-ElGamal over secp256k1 for the HHH protocol variant: an additively-homomorphic
//! scheme over curve points, used in place of HGG's Paillier/DGK feature-selection layer
//! and comparison-via-garbled-circuit. A decrypted point only reveals its plaintext after
//! a bounded discrete-log search, so plaintexts here are small signed blinding masks and
//! comparison deltas rather than raw feature values.

use std::collections::HashMap;

use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::elliptic_curve::Field;
use k256::{EncodedPoint, ProjectivePoint, Scalar};
use rand_core::OsRng;

use crate::error::PdteError;

/// Plaintexts this scheme's bounded decode can recover are restricted to `[-bound, bound]`.
pub const DECODE_BOUND: i64 = 1000;

#[derive(Clone, Copy, Debug)]
pub struct ElGamalCiphertext {
    pub c1: ProjectivePoint,
    pub c2: ProjectivePoint,
}

#[derive(Clone)]
pub struct ElGamalKeypair {
    secret: Scalar,
    public: ProjectivePoint,
}

fn scalar_from_i64(m: i64) -> Scalar {
    let magnitude = Scalar::from(m.unsigned_abs());
    if m < 0 {
        -magnitude
    } else {
        magnitude
    }
}

impl ElGamalKeypair {
    pub fn generate() -> Self {
        let secret = Scalar::random(&mut OsRng);
        let public = ProjectivePoint::GENERATOR * secret;
        ElGamalKeypair { secret, public }
    }

    pub fn public_key(&self) -> ProjectivePoint {
        self.public
    }

    pub fn encrypt(&self, m: i64) -> ElGamalCiphertext {
        encrypt_with(&self.public, m)
    }

    pub fn decrypt(&self, ct: &ElGamalCiphertext) -> ProjectivePoint {
        ct.c2 - ct.c1 * self.secret
    }

    /// Decrypt and recover the signed plaintext via bounded discrete-log search.
    pub fn decrypt_bounded(&self, ct: &ElGamalCiphertext) -> Result<i64, PdteError> {
        decode_bounded(&self.decrypt(ct), DECODE_BOUND)
    }
}

/// Encrypt `m` under an arbitrary public key (used by the party that doesn't hold the
/// matching secret, e.g. a client encrypting under the server's published public key).
pub fn encrypt_with(public: &ProjectivePoint, m: i64) -> ElGamalCiphertext {
    let r = Scalar::random(&mut OsRng);
    let c1 = ProjectivePoint::GENERATOR * r;
    let c2 = ProjectivePoint::GENERATOR * scalar_from_i64(m) + *public * r;
    ElGamalCiphertext { c1, c2 }
}

/// `Enc(a) + Enc(b) = Enc(a + b)`.
pub fn add(a: &ElGamalCiphertext, b: &ElGamalCiphertext) -> ElGamalCiphertext {
    ElGamalCiphertext {
        c1: a.c1 + b.c1,
        c2: a.c2 + b.c2,
    }
}

/// `Enc(m) + k = Enc(m + k)` for a plaintext constant `k` (no re-randomization needed,
/// `c1` carries no information about `k`).
pub fn add_constant(ct: &ElGamalCiphertext, k: i64) -> ElGamalCiphertext {
    ElGamalCiphertext {
        c1: ct.c1,
        c2: ct.c2 + ProjectivePoint::GENERATOR * scalar_from_i64(k),
    }
}

/// `k * Enc(m) = Enc(k * m)`.
pub fn scalar_mul_const(ct: &ElGamalCiphertext, k: i64) -> ElGamalCiphertext {
    let s = scalar_from_i64(k);
    ElGamalCiphertext {
        c1: ct.c1 * s,
        c2: ct.c2 * s,
    }
}

fn point_key(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

/// Canonical compressed-point wire encoding (§6 "serialised via the chosen
/// curve library's canonical form").
pub fn point_to_bytes(point: &ProjectivePoint) -> Vec<u8> {
    point_key(point)
}

pub fn point_from_bytes(bytes: &[u8]) -> Result<ProjectivePoint, PdteError> {
    let encoded = EncodedPoint::from_bytes(bytes)
        .map_err(|e| PdteError::Protocol(format!("malformed curve point: {e}")))?;
    Option::from(ProjectivePoint::from_encoded_point(&encoded))
        .ok_or_else(|| PdteError::Protocol("curve point is not on the curve".into()))
}

pub fn ciphertext_to_bytes(ct: &ElGamalCiphertext) -> (Vec<u8>, Vec<u8>) {
    (point_to_bytes(&ct.c1), point_to_bytes(&ct.c2))
}

pub fn ciphertext_from_bytes(c1: &[u8], c2: &[u8]) -> Result<ElGamalCiphertext, PdteError> {
    Ok(ElGamalCiphertext {
        c1: point_from_bytes(c1)?,
        c2: point_from_bytes(c2)?,
    })
}

/// Recover `m` from `m * G` for `m` in `[-bound, bound]` via baby-step-giant-step.
/// Errors if no such `m` exists within the bound (the point wasn't a small-plaintext
/// encoding, e.g. because the ciphertext was malformed or the bound is too small for
/// the protocol's actual range of values).
pub fn decode_bounded(point: &ProjectivePoint, bound: i64) -> Result<i64, PdteError> {
    if bound < 0 {
        return Err(PdteError::Invariant("elgamal decode bound must be non-negative".into()));
    }
    if *point == ProjectivePoint::IDENTITY {
        return Ok(0);
    }

    let range = 2 * bound + 1;
    let step_count = (range as f64).sqrt().ceil() as i64 + 1;

    // Baby steps: table of `j * G` for `j` in `0..step_count`.
    let mut baby_steps = HashMap::with_capacity(step_count as usize);
    let mut acc = ProjectivePoint::IDENTITY;
    for j in 0..step_count {
        baby_steps.insert(point_key(&acc), j);
        acc += ProjectivePoint::GENERATOR;
    }

    // Shift the search window to start at 0: `gamma = point + bound * G` represents
    // `(m + bound) * G` for `m + bound` in `0..=range-1`.
    let shifted = *point + ProjectivePoint::GENERATOR * Scalar::from(bound as u64);
    let giant_stride = ProjectivePoint::GENERATOR * Scalar::from(step_count as u64);
    let giant_stride_neg = -giant_stride;

    let mut gamma = shifted;
    let giant_count = range / step_count + 1;
    for i in 0..=giant_count {
        if let Some(&j) = baby_steps.get(&point_key(&gamma)) {
            let candidate = i * step_count + j - bound;
            if candidate.abs() <= bound {
                return Ok(candidate);
            }
        }
        gamma += giant_stride_neg;
    }

    Err(PdteError::Crypto(format!(
        "elgamal plaintext not recoverable within bound {bound}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let keypair = ElGamalKeypair::generate();
        for m in [-999i64, -1, 0, 1, 42, 1000] {
            let ct = keypair.encrypt(m);
            assert_eq!(keypair.decrypt_bounded(&ct).unwrap(), m);
        }
    }

    #[test]
    fn homomorphic_add_matches_plaintext_sum() {
        let keypair = ElGamalKeypair::generate();
        let a = keypair.encrypt(300);
        let b = keypair.encrypt(-450);
        let sum = add(&a, &b);
        assert_eq!(keypair.decrypt_bounded(&sum).unwrap(), -150);
    }

    #[test]
    fn add_constant_and_scalar_mul_are_consistent() {
        let keypair = ElGamalKeypair::generate();
        let ct = keypair.encrypt(10);
        let shifted = add_constant(&ct, 5);
        assert_eq!(keypair.decrypt_bounded(&shifted).unwrap(), 15);

        let scaled = scalar_mul_const(&ct, -2);
        assert_eq!(keypair.decrypt_bounded(&scaled).unwrap(), -20);
    }

    #[test]
    fn encrypt_with_public_key_decrypts_with_matching_secret() {
        let keypair = ElGamalKeypair::generate();
        let ct = encrypt_with(&keypair.public_key(), -7);
        assert_eq!(keypair.decrypt_bounded(&ct).unwrap(), -7);
    }

    #[test]
    fn ciphertext_bytes_round_trip() {
        let keypair = ElGamalKeypair::generate();
        let ct = keypair.encrypt(17);
        let (c1, c2) = ciphertext_to_bytes(&ct);
        let rebuilt = ciphertext_from_bytes(&c1, &c2).unwrap();
        assert_eq!(keypair.decrypt_bounded(&rebuilt).unwrap(), 17);
    }

    #[test]
    fn out_of_bound_plaintext_fails_to_decode() {
        let keypair = ElGamalKeypair::generate();
        let ct = keypair.encrypt(5000);
        assert!(decode_bounded(&keypair.decrypt(&ct), DECODE_BOUND).is_err());
    }
}
