use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use num_bigint::BigUint;

use super::dgk::DgkKeypair;
use super::paillier::PaillierKeypair;

/// Persisted HE keypair cache, one file per scheme/bit-length pair, named
/// after the original's `paillier_key_<bits>.bin` / `dgk_key_<bits>.bin`
/// convention. Rather than the original's raw export of (lambda, mu, n, n^2,
/// n+1), this stores the minimal material needed to rebuild the keypair
/// deterministically (the two prime factors, plus DGK's chosen generators) —
/// simpler, and just as fast to reload since there's no primality search on
/// cache hit.
fn write_biguint(out: &mut Vec<u8>, value: &BigUint) {
    let bytes = value.to_bytes_be();
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&bytes);
}

fn read_biguint(buf: &[u8], pos: &mut usize) -> io::Result<BigUint> {
    if buf.len() < *pos + 4 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated keycache"));
    }
    let len = u32::from_be_bytes(buf[*pos..*pos + 4].try_into().unwrap()) as usize;
    *pos += 4;
    if buf.len() < *pos + len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated keycache"));
    }
    let value = BigUint::from_bytes_be(&buf[*pos..*pos + len]);
    *pos += len;
    Ok(value)
}

pub fn default_paillier_path(bits: u64) -> String {
    format!("paillier_key_{bits}.bin")
}

pub fn default_dgk_path(bits: u64) -> String {
    format!("dgk_key_{bits}.bin")
}

/// Load a Paillier keypair from `path` if it exists and parses cleanly,
/// otherwise generate a fresh one and (best-effort) write it back. A
/// missing or corrupt cache file is never an error — only a `debug!`-level
/// event — since the cache is purely a performance optimization.
pub fn load_or_generate_paillier(path: &Path, bits: u64) -> PaillierKeypair {
    if let Ok(kp) = load_paillier(path) {
        tracing::debug!(?path, "loaded cached Paillier keypair");
        return kp;
    }

    tracing::debug!(?path, "no usable Paillier keycache, generating a fresh keypair");
    let kp = PaillierKeypair::generate(bits);
    if let Err(e) = store_paillier(path, &kp) {
        tracing::debug!(?path, error = %e, "failed to persist Paillier keycache");
    }
    kp
}

fn load_paillier(path: &Path) -> io::Result<PaillierKeypair> {
    let mut buf = Vec::new();
    File::open(path)?.read_to_end(&mut buf)?;
    let mut pos = 0;
    let p = read_biguint(&buf, &mut pos)?;
    let q = read_biguint(&buf, &mut pos)?;
    Ok(PaillierKeypair::from_primes(p, q))
}

fn store_paillier(path: &Path, kp: &PaillierKeypair) -> io::Result<()> {
    let (p, q) = kp.factors();
    let mut buf = Vec::new();
    write_biguint(&mut buf, p);
    write_biguint(&mut buf, q);
    File::create(path)?.write_all(&buf)
}

pub fn load_or_generate_dgk(path: &Path, u: u64, bits: u64) -> DgkKeypair {
    if let Ok(kp) = load_dgk(path, u) {
        tracing::debug!(?path, "loaded cached DGK keypair");
        return kp;
    }

    tracing::debug!(?path, "no usable DGK keycache, generating a fresh keypair");
    let kp = DgkKeypair::generate(u, bits);
    if let Err(e) = store_dgk(path, &kp) {
        tracing::debug!(?path, error = %e, "failed to persist DGK keycache");
    }
    kp
}

fn load_dgk(path: &Path, u: u64) -> io::Result<DgkKeypair> {
    let mut buf = Vec::new();
    File::open(path)?.read_to_end(&mut buf)?;
    let mut pos = 0;
    let p = read_biguint(&buf, &mut pos)?;
    let q = read_biguint(&buf, &mut pos)?;
    let g = read_biguint(&buf, &mut pos)?;
    let h = read_biguint(&buf, &mut pos)?;

    DgkKeypair::from_cached(p, q, g, h, u).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

fn store_dgk(path: &Path, kp: &DgkKeypair) -> io::Result<()> {
    let (p, q) = kp.factors();
    let mut buf = Vec::new();
    write_biguint(&mut buf, p);
    write_biguint(&mut buf, q);
    write_biguint(&mut buf, &kp.public.g);
    write_biguint(&mut buf, &kp.public.h);
    File::create(path)?.write_all(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    #[test]
    fn paillier_round_trips_through_the_cache_file() {
        let path = temp_dir().join(format!("pdte-test-paillier-{}.bin", std::process::id()));
        let kp = load_or_generate_paillier(&path, 256);
        let reloaded = load_paillier(&path).unwrap();

        assert_eq!(kp.public.n, reloaded.public.n);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_cache_file_falls_back_to_generation() {
        let path = temp_dir().join("pdte-test-nonexistent-keycache.bin");
        let _ = std::fs::remove_file(&path);
        let kp = load_or_generate_dgk(&path, 101, 256);
        assert_eq!(kp.public.u, 101);
        let _ = std::fs::remove_file(&path);
    }
}
