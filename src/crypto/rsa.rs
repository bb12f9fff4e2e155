use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::thread_rng;

/// Bit length of each RSA prime factor. The OT sub-protocol only needs RSA
/// as a trapdoor permutation over random blinding values, not long-term
/// security against a recorded transcript, so 512-bit primes (1024-bit
/// modulus) are plenty and keep keygen fast.
const PRIME_BITS: u64 = 512;
const MILLER_RABIN_ROUNDS: u32 = 40;

#[derive(Debug, Clone)]
pub struct PublicKey {
    pub e: BigUint,
    pub n: BigUint,
}

#[derive(Debug, Clone)]
pub struct PrivateKey {
    d: BigUint,
    n: BigUint,
}

impl PrivateKey {
    pub fn decrypt(&self, ciphertext: &BigUint) -> BigUint {
        ciphertext.modpow(&self.d, &self.n)
    }
}

#[derive(Debug, Clone)]
pub struct Keypair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl Keypair {
    /// Generate a fresh RSA keypair, or build one from caller-supplied
    /// primes (useful for deterministic tests).
    pub fn new(p: Option<BigUint>, q: Option<BigUint>) -> Keypair {
        let p = p.unwrap_or_else(|| random_prime(PRIME_BITS));
        let q = q.unwrap_or_else(|| random_prime(PRIME_BITS));

        let n = &p * &q;
        let one = BigUint::one();
        let phi = (&p - &one) * (&q - &one);
        let e = BigUint::from(65537u32);
        let d = modinv(&e, &phi).expect("e must be invertible mod phi(n)");

        Keypair {
            public: PublicKey { e, n: n.clone() },
            private: PrivateKey { d, n },
        }
    }
}

fn modinv(a: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    let (mut old_r, mut r) = (a.to_bigint(), modulus.to_bigint());
    let (mut old_s, mut s) = (num_bigint::BigInt::one(), num_bigint::BigInt::zero());

    while !r.is_zero() {
        let quotient = &old_r / &r;
        let tmp_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, tmp_r);
        let tmp_s = &old_s - &quotient * &s;
        old_s = std::mem::replace(&mut s, tmp_s);
    }

    if old_r != num_bigint::BigInt::one() {
        return None;
    }

    let m = modulus.to_bigint();
    let result = ((old_s % &m) + &m) % &m;
    result.to_biguint()
}

trait ToBigInt {
    fn to_bigint(&self) -> num_bigint::BigInt;
}

impl ToBigInt for BigUint {
    fn to_bigint(&self) -> num_bigint::BigInt {
        num_bigint::BigInt::from(self.clone())
    }
}

pub(crate) fn random_prime(bits: u64) -> BigUint {
    let mut rng = thread_rng();

    loop {
        let mut candidate = rng.gen_biguint(bits);
        candidate.set_bit(bits - 1, true);
        candidate.set_bit(0, true);

        if is_probably_prime(&candidate) {
            return candidate;
        }
    }
}

pub(crate) fn is_probably_prime(n: &BigUint) -> bool {
    let two = BigUint::from(2u32);
    let three = BigUint::from(3u32);

    if *n < two {
        return false;
    }
    if *n == two || *n == three {
        return true;
    }
    if n.is_even() {
        return false;
    }

    let n_minus_one = n - BigUint::one();
    let mut d = n_minus_one.clone();
    let mut r = 0u32;

    while d.is_even() {
        d /= &two;
        r += 1;
    }

    let mut rng = thread_rng();

    'witness: for _ in 0..MILLER_RABIN_ROUNDS {
        let a = rng.gen_biguint_range(&two, &n_minus_one);
        let mut x = a.modpow(&d, n);

        if x == BigUint::one() || x == n_minus_one {
            continue;
        }

        for _ in 0..r - 1 {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }

        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let keypair = Keypair::new(None, None);
        let msg = BigUint::from(424242u64);

        let ct = msg.modpow(&keypair.public.e, &keypair.public.n);
        let pt = keypair.private.decrypt(&ct);

        assert_eq!(pt, msg);
    }

    #[test]
    fn small_primes_are_detected() {
        assert!(is_probably_prime(&BigUint::from(7919u32)));
        assert!(!is_probably_prime(&BigUint::from(7920u32)));
    }
}
