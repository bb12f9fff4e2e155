use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256;

/// AES-256 in counter mode, used to key-derive/encrypt garbled-gate rows.
///
/// Garbled wire keys are `KEY_SIZE = 32` bytes (256 bits, per the garbling
/// module's doubled security margin over the original's 128-bit keys), so
/// the block cipher backing each wire's derived keystream is AES-256, not
/// AES-128. The crate has no dedicated stream-cipher dependency, so CTR is
/// built directly on the `aes` block cipher: a big-endian 128-bit counter
/// is encrypted per 16-byte block and XORed with the input, matching
/// ordinary AES-CTR. `encrypt` and `decrypt` are the same operation (XOR
/// with a keystream); both names are kept so call sites read the way
/// they're used.
pub struct AesCtr {
    cipher: Aes256,
}

impl AesCtr {
    pub fn new(key: &[u8; 32]) -> Self {
        AesCtr {
            cipher: Aes256::new(GenericArray::from_slice(key)),
        }
    }

    pub fn encrypt(&self, data: &[u8], counter_start: u128) -> Vec<u8> {
        self.keystream_xor(data, counter_start)
    }

    pub fn decrypt(&self, data: &[u8], counter_start: u128) -> Vec<u8> {
        self.keystream_xor(data, counter_start)
    }

    fn keystream_xor(&self, data: &[u8], counter_start: u128) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        let mut counter = counter_start;

        for chunk in data.chunks(16) {
            let mut block = GenericArray::clone_from_slice(&counter.to_be_bytes());
            self.cipher.encrypt_block(&mut block);

            for (byte, ks) in chunk.iter().zip(block.iter()) {
                out.push(byte ^ ks);
            }

            counter = counter.wrapping_add(1);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::AesCtr;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let key = [7u8; 32];
        let cipher = AesCtr::new(&key);
        let plaintext = b"the quick brown fox jumps over the lazy dog";

        let ct = cipher.encrypt(plaintext, 0);
        let pt = cipher.decrypt(&ct, 0);

        assert_eq!(pt, plaintext);
    }

    #[test]
    fn distinct_keys_give_distinct_ciphertexts() {
        let a = AesCtr::new(&[1u8; 32]);
        let b = AesCtr::new(&[2u8; 32]);
        let plaintext = [0u8; 32];

        assert_ne!(a.encrypt(&plaintext, 0), b.encrypt(&plaintext, 0));
    }
}
