//! Wire encodings for HE public material and ciphertexts (§3 "Ciphertext
//! buffer layout"): Paillier ciphertexts are exported big-endian into a
//! `2*keybits/8`-byte slot, DGK ciphertexts little-endian into a
//! `keybits/8`-byte slot. The actual transport wraps these fixed-size
//! encodings in length-delimited protobuf `bytes` fields rather than the
//! original's raw socket framing (see `protocol` module docs), but the
//! byte-level encoding of each ciphertext itself follows the spec exactly
//! so the two are interchangeable if ever unwrapped from protobuf.

use num_bigint::BigUint;

use super::dgk::DgkPublicKey;
use super::paillier::PaillierPublicKey;
use crate::error::PdteError;

/// Big-endian, left-padded to exactly `n_bytes`. Errors if `value` doesn't
/// fit — a caller-side invariant violation, not a malformed-peer-message one.
pub fn encode_be(value: &BigUint, n_bytes: usize) -> Result<Vec<u8>, PdteError> {
    let raw = value.to_bytes_be();
    if raw.len() > n_bytes {
        return Err(PdteError::Invariant(format!(
            "value does not fit in {n_bytes} big-endian bytes (needs {})",
            raw.len()
        )));
    }
    let mut out = vec![0u8; n_bytes - raw.len()];
    out.extend_from_slice(&raw);
    Ok(out)
}

pub fn decode_be(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Little-endian, right-padded to exactly `n_bytes`.
pub fn encode_le(value: &BigUint, n_bytes: usize) -> Result<Vec<u8>, PdteError> {
    let raw = value.to_bytes_le();
    if raw.len() > n_bytes {
        return Err(PdteError::Invariant(format!(
            "value does not fit in {n_bytes} little-endian bytes (needs {})",
            raw.len()
        )));
    }
    let mut out = raw;
    out.resize(n_bytes, 0);
    Ok(out)
}

pub fn decode_le(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_le(bytes)
}

/// `ct_len` for a Paillier ciphertext of the given modulus bit length: `2n` bits.
pub fn paillier_ct_len(n_bits: u64) -> usize {
    2 * (n_bits as usize).div_ceil(8)
}

/// `ct_len` for a DGK ciphertext of the given modulus bit length: `n` bits.
pub fn dgk_ct_len(n_bits: u64) -> usize {
    (n_bits as usize).div_ceil(8)
}

pub fn encode_paillier_ct(ct: &BigUint, n_bits: u64) -> Result<Vec<u8>, PdteError> {
    encode_be(ct, paillier_ct_len(n_bits))
}

pub fn decode_paillier_ct(bytes: &[u8]) -> BigUint {
    decode_be(bytes)
}

pub fn encode_dgk_ct(ct: &BigUint, n_bits: u64) -> Result<Vec<u8>, PdteError> {
    encode_le(ct, dgk_ct_len(n_bits))
}

pub fn decode_dgk_ct(bytes: &[u8]) -> BigUint {
    decode_le(bytes)
}

/// Rebuild a peer's Paillier public key from the `n` it announced during
/// key exchange (§4.1 `keyExchange`: "send local n, receive remote n,
/// reconstruct the remote public key").
pub fn paillier_pubkey_from_n(n: BigUint) -> PaillierPublicKey {
    let n2 = &n * &n;
    PaillierPublicKey { n, n2 }
}

/// Rebuild a peer's DGK public key from its announced `(n, g, h, u)`.
pub fn dgk_pubkey_from_parts(n: BigUint, g: BigUint, h: BigUint, u: u64) -> DgkPublicKey {
    DgkPublicKey { n, g, h, u }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paillier_ciphertext_round_trips_through_its_wire_slot() {
        let n_bits = 256;
        let ct = BigUint::from(123456789u64);
        let bytes = encode_paillier_ct(&ct, n_bits).unwrap();
        assert_eq!(bytes.len(), paillier_ct_len(n_bits));
        assert_eq!(decode_paillier_ct(&bytes), ct);
    }

    #[test]
    fn dgk_ciphertext_round_trips_through_its_wire_slot() {
        let n_bits = 256;
        let ct = BigUint::from(987654321u64);
        let bytes = encode_dgk_ct(&ct, n_bits).unwrap();
        assert_eq!(bytes.len(), dgk_ct_len(n_bits));
        assert_eq!(decode_dgk_ct(&bytes), ct);
    }

    #[test]
    fn value_too_wide_for_the_slot_is_rejected() {
        let huge = BigUint::from(u64::MAX) << 200;
        assert!(encode_be(&huge, 4).is_err());
    }
}
