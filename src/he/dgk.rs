use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::thread_rng;

use crate::crypto::rsa::{is_probably_prime, random_prime};
use crate::error::PdteError;

/// DGK (Damgard-Geisler-Kroeigaard) public-key material: a short-plaintext
/// homomorphic scheme used as an alternative to Paillier for the selection
/// phase. Unlike Paillier it has no packing — one ciphertext per decision
/// node — but its ciphertexts and modular exponentiations are both smaller.
#[derive(Debug, Clone)]
pub struct DgkPublicKey {
    pub n: BigUint,
    pub g: BigUint,
    pub h: BigUint,
    /// Plaintext modulus: the scheme encrypts values in `0..u`.
    pub u: u64,
}

#[derive(Debug, Clone)]
pub struct DgkKeypair {
    pub public: DgkPublicKey,
    p: BigUint,
    q: BigUint,
    vp: BigUint,
    /// Decode table: `decode_table[k] = (g mod p)^(vp * k) mod p`.
    decode_table: Vec<BigUint>,
}

impl DgkPublicKey {
    pub fn encrypt(&self, m: u64) -> BigUint {
        assert!(m < self.u, "plaintext out of range for this DGK key's plaintext modulus");
        let mut rng = thread_rng();
        let r = rng.gen_biguint(self.n.bits());

        let gm = self.g.modpow(&BigUint::from(m), &self.n);
        let hr = self.h.modpow(&r, &self.n);
        (gm * hr) % &self.n
    }

    /// Homomorphically add a known constant `k` (mod `u`) to the plaintext
    /// under `ct`.
    pub fn add_plaintext(&self, ct: &BigUint, k: u64) -> BigUint {
        (ct * self.g.modpow(&BigUint::from(k % self.u), &self.n)) % &self.n
    }
}

impl DgkKeypair {
    /// Generate a keypair whose plaintext space is `0..u`. `u` should be a
    /// small prime (the benchmark trees this port targets compare against
    /// 64-bit masked features, but the plaintext modulus itself only needs
    /// to be large enough to avoid wraparound in the comparator circuit's
    /// masked inputs — callers choose `u` accordingly).
    pub fn generate(u: u64, bits: u64) -> Self {
        let u_big = BigUint::from(u);
        let half = bits / 2;

        let (p, vp) = loop {
            let vp = random_prime(half);
            let candidate = &vp * &u_big + BigUint::one();
            if is_probably_prime(&candidate) {
                break (candidate, vp);
            }
        };
        let q = random_prime(half);
        let n = &p * &q;

        let g_p = find_order_u_element(&p, &vp);
        let h_p = find_order_vp_element(&p, u);
        let g_q = random_unit(&q);
        let h_q = random_unit(&q);

        let g = crt_combine(&g_p, &p, &g_q, &q);
        let h = crt_combine(&h_p, &p, &h_q, &q);

        let mut decode_table = Vec::with_capacity(u as usize);
        for k in 0..u {
            decode_table.push(g_p.modpow(&(&vp * BigUint::from(k)), &p));
        }

        DgkKeypair {
            public: DgkPublicKey { n, g, h, u },
            p,
            q,
            vp,
            decode_table,
        }
    }

    pub fn factors(&self) -> (&BigUint, &BigUint) {
        (&self.p, &self.q)
    }

    /// Rebuild a keypair from its stored factors and public material —
    /// used by the keypair cache so a restarted party doesn't have to
    /// re-run primality search or pick a fresh generator.
    pub fn from_cached(p: BigUint, q: BigUint, g: BigUint, h: BigUint, u: u64) -> Result<Self, PdteError> {
        let p_minus_one = &p - BigUint::one();
        let u_big = BigUint::from(u);
        if (&p_minus_one % &u_big) != BigUint::zero() {
            return Err(PdteError::Crypto(
                "cached DGK prime is not consistent with the plaintext modulus".into(),
            ));
        }
        let vp = p_minus_one / &u_big;
        let n = &p * &q;
        let g_p = &g % &p;

        let mut decode_table = Vec::with_capacity(u as usize);
        for k in 0..u {
            decode_table.push(g_p.modpow(&(&vp * BigUint::from(k)), &p));
        }

        Ok(DgkKeypair {
            public: DgkPublicKey { n, g, h, u },
            p,
            q,
            vp,
            decode_table,
        })
    }

    pub fn decrypt(&self, ct: &BigUint) -> Result<u64, PdteError> {
        let cp = ct % &self.p;
        let projected = cp.modpow(&self.vp, &self.p);

        self.decode_table
            .iter()
            .position(|candidate| *candidate == projected)
            .map(|k| k as u64)
            .ok_or_else(|| PdteError::Crypto("DGK ciphertext decoded to no known plaintext".into()))
    }
}

fn random_unit(modulus: &BigUint) -> BigUint {
    let mut rng = thread_rng();
    loop {
        let candidate = rng.gen_biguint_below(modulus);
        if !candidate.is_zero() {
            return candidate;
        }
    }
}

/// An element of order dividing `u` in Z_p^*, found as `b^vp mod p` for
/// random `b` (since `p - 1 = u * vp`).
fn find_order_u_element(p: &BigUint, vp: &BigUint) -> BigUint {
    loop {
        let b = random_unit(p);
        let candidate = b.modpow(vp, p);
        if candidate != BigUint::one() {
            return candidate;
        }
    }
}

/// An element of order dividing `vp` in Z_p^*, found as `b^u mod p`.
fn find_order_vp_element(p: &BigUint, u: u64) -> BigUint {
    loop {
        let b = random_unit(p);
        let candidate = b.modpow(&BigUint::from(u), p);
        if candidate != BigUint::one() {
            return candidate;
        }
    }
}

fn crt_combine(rp: &BigUint, p: &BigUint, rq: &BigUint, q: &BigUint) -> BigUint {
    let p_int = BigInt::from(p.clone());
    let q_int = BigInt::from(q.clone());
    let rp_int = BigInt::from(rp.clone());
    let rq_int = BigInt::from(rq.clone());

    let p_inv_mod_q = modinv(&p_int, &q_int);
    let diff = ((&rq_int - &rp_int) * &p_inv_mod_q).mod_floor(&q_int);
    let x = &rp_int + &p_int * diff;
    let n_int = &p_int * &q_int;

    x.mod_floor(&n_int).to_biguint().unwrap()
}

fn modinv(a: &BigInt, modulus: &BigInt) -> BigInt {
    let (mut old_r, mut r) = (a.clone(), modulus.clone());
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());

    while !r.is_zero() {
        let k = &old_r / &r;
        let tmp_r = &old_r - &k * &r;
        old_r = std::mem::replace(&mut r, tmp_r);
        let tmp_s = &old_s - &k * &s;
        old_s = std::mem::replace(&mut s, tmp_s);
    }

    ((old_s % modulus) + modulus) % modulus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let kp = DgkKeypair::generate(101, 256);
        for m in [0u64, 1, 50, 100] {
            let ct = kp.public.encrypt(m);
            assert_eq!(kp.decrypt(&ct).unwrap(), m);
        }
    }

    #[test]
    fn homomorphic_add_plaintext() {
        let kp = DgkKeypair::generate(101, 256);
        let ct = kp.public.encrypt(10);
        let ct = kp.public.add_plaintext(&ct, 5);
        assert_eq!(kp.decrypt(&ct).unwrap(), 15);
    }
}
