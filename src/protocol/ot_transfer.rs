//! Bulk 1-out-of-2 oblivious transfer over the control channel: the garbler
//! generates one RSA keypair per query and reuses it for every wire, exactly
//! as the original garbled-circuit demo this crate grew out of reused its
//! keypair across `circuit.n()/2` OT rounds (`src/bin/garbler.rs`), just
//! generalized to an arbitrary wire list instead of one fixed circuit half.

use std::io;
use std::net::TcpStream;

use num_bigint::BigUint;

use crate::backend::garbler_backend::protos::{OtBlindedIdx, OtEncMessages, RsaPubkey, Xs};
use crate::crypto::rsa::{Keypair, PublicKey};
use crate::error::PdteError;
use crate::garbling::{GarbledWire, KEY_SIZE};
use crate::message::MessageStream;
use crate::ot::{ObTransferReceiver, ObTransferSender};

fn key_to_biguint(key: [u8; KEY_SIZE]) -> BigUint {
    BigUint::from_bytes_be(&key)
}

fn biguint_to_key(value: &BigUint) -> Result<[u8; KEY_SIZE], PdteError> {
    let bytes = value.to_bytes_be();
    if bytes.len() > KEY_SIZE {
        return Err(PdteError::Protocol("OT result does not fit in a garbled-wire key".into()));
    }
    let mut out = [0u8; KEY_SIZE];
    out[KEY_SIZE - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

/// Garbler side: send a fresh RSA public key, then run one OT round per wire
/// so the evaluator receives exactly the key matching its (unknown) bit.
pub fn send_keys_via_ot(stream: &mut TcpStream, wires: &[GarbledWire]) -> Result<(), PdteError> {
    let keypair = Keypair::new(None, None);

    let mut pubkey_msg = RsaPubkey::new();
    pubkey_msg.e = keypair.public.e.to_bytes_be();
    pubkey_msg.n = keypair.public.n.to_bytes_be();
    MessageStream::<RsaPubkey>::send_msg(stream, pubkey_msg).map_err(PdteError::Io)?;

    for wire in wires {
        let msgs = (key_to_biguint(wire.off_key()), key_to_biguint(wire.on_key()));
        let sender = ObTransferSender::new(msgs, keypair.clone());

        let mut xs_msg = Xs::new();
        let (x0, x1) = sender.xs();
        xs_msg.x_0 = x0.to_bytes_be();
        xs_msg.x_1 = x1.to_bytes_be();
        MessageStream::<Xs>::send_msg(stream, xs_msg).map_err(PdteError::Io)?;

        let blinded = MessageStream::<OtBlindedIdx>::receive_msg(stream).map_err(PdteError::Io)?;
        let m_primes = sender.gen_combined(BigUint::from_bytes_be(&blinded.v));

        let mut reply = OtEncMessages::new();
        reply.m_prime_0 = m_primes.0.to_bytes_be();
        reply.m_prime_1 = m_primes.1.to_bytes_be();
        MessageStream::<OtEncMessages>::send_msg(stream, reply).map_err(PdteError::Io)?;
    }

    Ok(())
}

/// Evaluator side: receive the garbler's RSA public key once, then derive one
/// key per requested bit via OT, in the same order the garbler sent wires.
pub fn receive_keys_via_ot(stream: &mut TcpStream, bits: &[bool]) -> Result<Vec<[u8; KEY_SIZE]>, PdteError> {
    let pubkey_msg = MessageStream::<RsaPubkey>::receive_msg(stream).map_err(PdteError::Io)?;
    let sender_pubkey = PublicKey {
        e: BigUint::from_bytes_be(&pubkey_msg.e),
        n: BigUint::from_bytes_be(&pubkey_msg.n),
    };

    let mut out = Vec::with_capacity(bits.len());
    for &bit in bits {
        let xs_msg = MessageStream::<Xs>::receive_msg(stream).map_err(PdteError::Io)?;
        let xs = (BigUint::from_bytes_be(&xs_msg.x_0), BigUint::from_bytes_be(&xs_msg.x_1));
        let receiver = ObTransferReceiver::new(sender_pubkey.clone(), xs);

        let v = receiver.blind_idx(bit as usize);
        let mut blinded_msg = OtBlindedIdx::new();
        blinded_msg.v = v.to_bytes_be();
        MessageStream::<OtBlindedIdx>::send_msg(stream, blinded_msg).map_err(PdteError::Io)?;

        let reply = MessageStream::<OtEncMessages>::receive_msg(stream).map_err(PdteError::Io)?;
        let m_primes = (BigUint::from_bytes_be(&reply.m_prime_0), BigUint::from_bytes_be(&reply.m_prime_1));
        let msg = receiver.derive_msg(m_primes, bit as usize);
        out.push(biguint_to_key(&msg)?);
    }

    Ok(out)
}
