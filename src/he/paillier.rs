use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::thread_rng;

use crate::error::PdteError;

/// Bit width reserved per packed slot: the 64-bit feature value plus a
/// 40-bit statistical blinding margin, matching the packing scheme's
/// statistical-hiding parameter.
pub const MASK_BIT_LEN: u32 = 104;

#[derive(Debug, Clone)]
pub struct PaillierPublicKey {
    pub n: BigUint,
    pub n2: BigUint,
}

#[derive(Debug, Clone)]
pub struct PaillierKeypair {
    pub public: PaillierPublicKey,
    p: BigUint,
    q: BigUint,
    lambda: BigUint,
    mu: BigUint,
}

impl PaillierPublicKey {
    /// g = n + 1, the standard simplification that makes `mu = lambda^-1 mod n`
    /// valid without tracking a separate generator.
    fn g(&self) -> BigUint {
        &self.n + BigUint::one()
    }

    /// How many 104-bit feature slots fit in one ciphertext's plaintext
    /// space (which is Z_n, not Z_{n^2}). Never zero, so chunking selected
    /// ciphertexts by this size is always well-defined even for the
    /// sub-104-bit moduli small test keys use.
    pub fn batch_size(&self) -> usize {
        ((self.n.bits() / MASK_BIT_LEN as u64) as usize).max(1)
    }

    /// Fresh-randomness encryption: every call draws a new `r`, per the
    /// requirement that repeated encryptions of the same plaintext must be
    /// unlinkable.
    pub fn encrypt(&self, m: &BigUint) -> BigUint {
        let mut rng = thread_rng();
        let r = loop {
            let candidate = rng.gen_biguint_below(&self.n);
            if !candidate.is_zero() && candidate.gcd(&self.n) == BigUint::one() {
                break candidate;
            }
        };

        let gm = (BigUint::one() + m * &self.n) % &self.n2;
        let rn = r.modpow(&self.n, &self.n2);
        (gm * rn) % &self.n2
    }

    /// Homomorphically add a known constant `k` to the plaintext under `ct`:
    /// `ct * g^k mod n^2`.
    pub fn add_plaintext(&self, ct: &BigUint, k: &BigUint) -> BigUint {
        (ct * self.g().modpow(k, &self.n2)) % &self.n2
    }

    /// Homomorphically multiply the plaintext under `ct` by a known
    /// constant `k`: `ct^k mod n^2`.
    pub fn mul_const(&self, ct: &BigUint, k: &BigUint) -> BigUint {
        ct.modpow(k, &self.n2)
    }

    /// Pack up to `batch_size` ciphertexts into one, each occupying a
    /// disjoint `MASK_BIT_LEN`-bit slot: `prod_j ct_j ^ (2^(104*j)) mod n^2`.
    /// Callers must ensure each underlying plaintext fits in `MASK_BIT_LEN`
    /// bits or slots will corrupt each other.
    pub fn pack(&self, cts: &[BigUint]) -> Result<BigUint, PdteError> {
        if cts.len() > self.batch_size() {
            return Err(PdteError::Crypto(format!(
                "cannot pack {} ciphertexts into a {}-slot batch",
                cts.len(),
                self.batch_size()
            )));
        }

        let mut acc = BigUint::one();
        for (j, ct) in cts.iter().enumerate() {
            let shift = BigUint::from(2u32).pow(MASK_BIT_LEN * j as u32);
            acc = (acc * self.mul_const(ct, &shift)) % &self.n2;
        }
        Ok(acc)
    }
}

impl PaillierKeypair {
    pub fn generate(bits: u64) -> Self {
        let half = bits / 2;
        let p = crate::crypto::rsa::random_prime(half);
        let q = crate::crypto::rsa::random_prime(half);
        Self::from_primes(p, q)
    }

    pub fn from_primes(p: BigUint, q: BigUint) -> Self {
        let n = &p * &q;
        let n2 = &n * &n;
        let lambda = (&p - BigUint::one()).lcm(&(&q - BigUint::one()));
        let mu = modinv(&lambda, &n).expect("lambda must be invertible mod n when g = n+1");

        PaillierKeypair {
            public: PaillierPublicKey { n, n2 },
            p,
            q,
            lambda,
            mu,
        }
    }

    pub fn factors(&self) -> (&BigUint, &BigUint) {
        (&self.p, &self.q)
    }

    pub fn decrypt(&self, ct: &BigUint) -> BigUint {
        let n = &self.public.n;
        let u = ct.modpow(&self.lambda, &self.public.n2);
        let l = (&u - BigUint::one()) / n;
        (l * &self.mu) % n
    }

    /// Split a decrypted packed plaintext back into its `MASK_BIT_LEN`-bit
    /// slots, low slot first.
    pub fn unpack(packed: &BigUint, slots: usize) -> Vec<BigUint> {
        let modulus = BigUint::from(2u32).pow(MASK_BIT_LEN);
        let mut remaining = packed.clone();
        let mut out = Vec::with_capacity(slots);

        for _ in 0..slots {
            out.push(&remaining % &modulus);
            remaining /= &modulus;
        }
        out
    }
}

fn modinv(a: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    let a = num_bigint::BigInt::from(a.clone());
    let m = num_bigint::BigInt::from(modulus.clone());
    let (mut old_r, mut r) = (a, m.clone());
    let (mut old_s, mut s) = (num_bigint::BigInt::one(), num_bigint::BigInt::zero());

    while !r.is_zero() {
        let q = &old_r / &r;
        let tmp_r = &old_r - &q * &r;
        old_r = std::mem::replace(&mut r, tmp_r);
        let tmp_s = &old_s - &q * &s;
        old_s = std::mem::replace(&mut s, tmp_s);
    }

    if old_r != num_bigint::BigInt::one() {
        return None;
    }

    let result = ((old_s % &m) + &m) % &m;
    result.to_biguint()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_keypair() -> PaillierKeypair {
        // Deterministic small primes keep the packing/round-trip tests fast;
        // security doesn't matter for exercising the arithmetic.
        PaillierKeypair::from_primes(BigUint::from(1000000007u64), BigUint::from(1000000009u64))
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let kp = small_keypair();
        let m = BigUint::from(42u64);
        let ct = kp.public.encrypt(&m);
        assert_eq!(kp.decrypt(&ct), m);
    }

    #[test]
    fn homomorphic_add_plaintext() {
        let kp = small_keypair();
        let ct = kp.public.encrypt(&BigUint::from(10u64));
        let ct = kp.public.add_plaintext(&ct, &BigUint::from(5u64));
        assert_eq!(kp.decrypt(&ct), BigUint::from(15u64));
    }

    #[test]
    fn pack_and_unpack_round_trip() {
        let kp = small_keypair();
        let values: Vec<BigUint> = (0..4u64).map(BigUint::from).collect();
        let cts: Vec<BigUint> = values.iter().map(|v| kp.public.encrypt(v)).collect();

        let packed = kp.public.pack(&cts).unwrap();
        let decrypted = kp.decrypt(&packed);
        let slots = PaillierKeypair::unpack(&decrypted, values.len());

        assert_eq!(slots, values);
    }
}
