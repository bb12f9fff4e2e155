use num_bigint::BigUint;
use num_traits::ToPrimitive;

use crate::error::PdteError;

use super::dgk::{DgkKeypair, DgkPublicKey};
use super::paillier::{PaillierKeypair, PaillierPublicKey};

/// One homomorphically-encrypted value, tagged by scheme so the wire layer
/// and the comparator feed can stay scheme-agnostic.
#[derive(Debug, Clone)]
pub enum HeCiphertext {
    Paillier(BigUint),
    Dgk(BigUint),
}

/// DGK has no packing, so its plaintext modulus has to stay small enough for
/// its decode table to be buildable in memory. 2^20 covers the masked
/// feature values this port's demo trees use; real 64-bit features would
/// need scaling down (an application-level concern, not a protocol one) or
/// Paillier instead.
pub const DGK_PLAINTEXT_BITS: u32 = 20;

/// Unifies the Paillier and DGK selection-phase HE parties behind the one
/// sequence of operations `selction_HE` performs: encrypt the server's
/// feature vector, homomorphically select+mask per decision node, pack for
/// transfer (Paillier only — DGK ships one ciphertext per node), and decrypt
/// + unpack on the other end.
pub enum SelectionHeParty {
    Paillier(PaillierKeypair),
    Dgk(DgkKeypair),
}

impl SelectionHeParty {
    pub fn encrypt_features(&self, features: &[u64]) -> Vec<HeCiphertext> {
        match self {
            SelectionHeParty::Paillier(kp) => features
                .iter()
                .map(|f| HeCiphertext::Paillier(kp.public.encrypt(&BigUint::from(*f))))
                .collect(),
            SelectionHeParty::Dgk(kp) => {
                let modulus = 1u64 << DGK_PLAINTEXT_BITS;
                features
                    .iter()
                    .map(|f| HeCiphertext::Dgk(kp.public.encrypt(f % modulus)))
                    .collect()
            }
        }
    }

    /// `CT'_i = CTs[mapping[i]] + mask[i]` homomorphically — selects the
    /// feature each decision node's attribute index names, then blinds it
    /// with a fresh random mask so the ciphertext the client eventually
    /// decrypts never reveals the real feature value, only the masked one.
    pub fn select_and_mask(
        &self,
        cts: &[HeCiphertext],
        mapping: &[usize],
        masks: &[u64],
    ) -> Result<Vec<HeCiphertext>, PdteError> {
        if mapping.len() != masks.len() {
            return Err(PdteError::Invariant(
                "mapping and mask vectors must be the same length".into(),
            ));
        }

        mapping
            .iter()
            .zip(masks)
            .map(|(&idx, &mask)| {
                let ct = cts
                    .get(idx)
                    .ok_or_else(|| PdteError::Invariant(format!("selection mapping index {idx} out of range")))?;
                Ok(match (self, ct) {
                    (SelectionHeParty::Paillier(kp), HeCiphertext::Paillier(c)) => {
                        HeCiphertext::Paillier(kp.public.add_plaintext(c, &BigUint::from(mask)))
                    }
                    (SelectionHeParty::Dgk(kp), HeCiphertext::Dgk(c)) => {
                        HeCiphertext::Dgk(kp.public.add_plaintext(c, mask))
                    }
                    _ => return Err(PdteError::Invariant("ciphertext/party scheme mismatch".into())),
                })
            })
            .collect()
    }

    /// Pack masked ciphertexts into transfer-sized batches. Paillier packs
    /// `batch_size` values per ciphertext; DGK sends one ciphertext per
    /// value (no-op here, kept for a uniform call site).
    pub fn pack_for_transfer(&self, selected: &[HeCiphertext]) -> Result<Vec<BigUint>, PdteError> {
        match self {
            SelectionHeParty::Paillier(kp) => {
                let batch_size = kp.public.batch_size();
                let raw: Vec<BigUint> = selected
                    .iter()
                    .map(|c| match c {
                        HeCiphertext::Paillier(v) => Ok(v.clone()),
                        HeCiphertext::Dgk(_) => Err(PdteError::Invariant("expected Paillier ciphertexts".into())),
                    })
                    .collect::<Result<_, _>>()?;

                raw.chunks(batch_size)
                    .map(|chunk| kp.public.pack(chunk))
                    .collect()
            }
            SelectionHeParty::Dgk(_) => selected
                .iter()
                .map(|c| match c {
                    HeCiphertext::Dgk(v) => Ok(v.clone()),
                    HeCiphertext::Paillier(_) => Err(PdteError::Invariant("expected DGK ciphertexts".into())),
                })
                .collect(),
        }
    }

    /// Decrypt (and, for Paillier, unpack) a batch of ciphertexts back into
    /// `total` masked feature values.
    pub fn decrypt_and_unpack(&self, packed: &[BigUint], total: usize) -> Result<Vec<u64>, PdteError> {
        match self {
            SelectionHeParty::Paillier(kp) => {
                let batch_size = kp.public.batch_size();
                let mut out = Vec::with_capacity(total);

                let low64_mask = (BigUint::from(1u8) << 64u32) - BigUint::from(1u8);
                for ct in packed {
                    let remaining = total - out.len();
                    let slots = remaining.min(batch_size);
                    let plaintext = kp.decrypt(ct);
                    for slot in PaillierKeypair::unpack(&plaintext, slots) {
                        // Each 104-bit slot holds `feature + mask`; only the low 64 bits
                        // are the blinded feature, the rest is statistical-hiding headroom.
                        let low64 = slot & &low64_mask;
                        out.push(low64.to_u64().expect("masked to 64 bits"));
                    }
                }
                Ok(out)
            }
            SelectionHeParty::Dgk(kp) => packed.iter().map(|ct| kp.decrypt(ct)).collect(),
        }
    }
}

/// The counterpart to `SelectionHeParty` for the party that never holds the secret key
/// (the server, selecting against the client's published ciphertexts): the same
/// select-and-mask/pack operations, expressed over public key material only, since
/// neither needs anything but `add_plaintext`.
pub enum SelectionHePublic {
    Paillier(PaillierPublicKey),
    Dgk(DgkPublicKey),
}

impl SelectionHePublic {
    pub fn select_and_mask(
        &self,
        cts: &[HeCiphertext],
        mapping: &[usize],
        masks: &[u64],
    ) -> Result<Vec<HeCiphertext>, PdteError> {
        if mapping.len() != masks.len() {
            return Err(PdteError::Invariant(
                "mapping and mask vectors must be the same length".into(),
            ));
        }

        mapping
            .iter()
            .zip(masks)
            .map(|(&idx, &mask)| {
                let ct = cts
                    .get(idx)
                    .ok_or_else(|| PdteError::Invariant(format!("selection mapping index {idx} out of range")))?;
                Ok(match (self, ct) {
                    (SelectionHePublic::Paillier(pk), HeCiphertext::Paillier(c)) => {
                        HeCiphertext::Paillier(pk.add_plaintext(c, &BigUint::from(mask)))
                    }
                    (SelectionHePublic::Dgk(pk), HeCiphertext::Dgk(c)) => {
                        HeCiphertext::Dgk(pk.add_plaintext(c, mask))
                    }
                    _ => return Err(PdteError::Invariant("ciphertext/party scheme mismatch".into())),
                })
            })
            .collect()
    }

    pub fn pack_for_transfer(&self, selected: &[HeCiphertext]) -> Result<Vec<BigUint>, PdteError> {
        match self {
            SelectionHePublic::Paillier(pk) => {
                let batch_size = pk.batch_size();
                let raw: Vec<BigUint> = selected
                    .iter()
                    .map(|c| match c {
                        HeCiphertext::Paillier(v) => Ok(v.clone()),
                        HeCiphertext::Dgk(_) => Err(PdteError::Invariant("expected Paillier ciphertexts".into())),
                    })
                    .collect::<Result<_, _>>()?;

                raw.chunks(batch_size).map(|chunk| pk.pack(chunk)).collect()
            }
            SelectionHePublic::Dgk(_) => selected
                .iter()
                .map(|c| match c {
                    HeCiphertext::Dgk(v) => Ok(v.clone()),
                    HeCiphertext::Paillier(_) => Err(PdteError::Invariant("expected DGK ciphertexts".into())),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::he::paillier::PaillierKeypair;

    #[test]
    fn paillier_select_mask_pack_decrypt_round_trip() {
        let kp = PaillierKeypair::from_primes(
            BigUint::from(1000000007u64),
            BigUint::from(1000000009u64),
        );
        let party = SelectionHeParty::Paillier(kp);

        let features = vec![10, 20, 30, 40];
        let cts = party.encrypt_features(&features);

        let mapping = vec![2, 0, 3];
        let masks = vec![5, 7, 9];
        let selected = party.select_and_mask(&cts, &mapping, &masks).unwrap();

        let packed = party.pack_for_transfer(&selected).unwrap();
        let decrypted = party.decrypt_and_unpack(&packed, mapping.len()).unwrap();

        assert_eq!(decrypted, vec![35, 27, 49]);
    }

    #[test]
    fn public_only_party_matches_keypair_holder_across_the_two_roles() {
        // Mirrors the real split: the client holds the keypair and encrypts/decrypts,
        // the server only ever sees the public key and does the select-and-mask.
        let kp = PaillierKeypair::from_primes(
            BigUint::from(1000000007u64),
            BigUint::from(1000000009u64),
        );
        let public_copy = kp.public.clone();
        let client = SelectionHeParty::Paillier(kp);
        let server = SelectionHePublic::Paillier(public_copy);

        let features = vec![10, 20, 30, 40];
        let cts = client.encrypt_features(&features);

        let mapping = vec![2, 0, 3];
        let masks = vec![5, 7, 9];
        let selected = server.select_and_mask(&cts, &mapping, &masks).unwrap();
        let packed = server.pack_for_transfer(&selected).unwrap();

        let decrypted = client.decrypt_and_unpack(&packed, mapping.len()).unwrap();
        assert_eq!(decrypted, vec![35, 27, 49]);
    }
}
