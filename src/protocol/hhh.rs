//! HHH (§4.7): additively-homomorphic EC-ElGamal comparison plus Tai et al.
//! path-cost tree evaluation. Every ciphertext in this protocol lives under
//! the Client's own ElGamal keypair -- the Server only ever combines
//! ciphertexts homomorphically and never holds a secret key, so there is no
//! decryption on the Server side at all.
//!
//! Bit order convention used throughout: bit index 0 is the least
//! significant bit, increasing index = increasing significance (this is
//! what makes `Σ_{j>i}` in the gt formula read as "more significant bits").

use std::collections::HashMap;
use std::net::TcpStream;

use k256::ProjectivePoint;
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};

use crate::backend::garbler_backend::protos::{ElGamalCiphertext as WireCt, ElGamalCiphertextBatch, ElGamalPubkey};
use crate::config::{Config, Role};
use crate::dectree::DecisionTree;
use crate::elgamal::{self, ElGamalCiphertext, ElGamalKeypair};
use crate::error::PdteError;
use crate::message::MessageStream;

use super::{build_handshake, check_handshake, load_server_tree};

pub fn run(cfg: &Config, control: &mut TcpStream) -> Result<Option<u64>, PdteError> {
    match cfg.role {
        Role::Server => {
            run_server(cfg, control)?;
            Ok(None)
        }
        Role::Client => run_client(cfg, control).map(Some),
    }
}

fn bits_of(value: u64, n: usize) -> Vec<u8> {
    (0..n).map(|i| ((value >> i) & 1) as u8).collect()
}

fn wire_ct(ct: &ElGamalCiphertext) -> WireCt {
    let (c1, c2) = elgamal::ciphertext_to_bytes(ct);
    let mut msg = WireCt::new();
    msg.c1 = c1;
    msg.c2 = c2;
    msg
}

fn unwire_ct(msg: &WireCt) -> Result<ElGamalCiphertext, PdteError> {
    elgamal::ciphertext_from_bytes(&msg.c1, &msg.c2)
}

fn batch_of(cts: &[ElGamalCiphertext]) -> ElGamalCiphertextBatch {
    let mut batch = ElGamalCiphertextBatch::new();
    batch.ciphertexts = cts.iter().map(wire_ct).collect();
    batch
}

fn is_dummy(node: &crate::dectree::DecNode) -> bool {
    !node.leaf && node.left.is_some() && node.left == node.right
}

fn run_server(cfg: &Config, control: &mut TcpStream) -> Result<(), PdteError> {
    let tree = load_server_tree(cfg)?;
    let handshake = build_handshake(cfg, &tree);
    MessageStream::<crate::backend::garbler_backend::protos::Handshake>::send_msg(control, handshake)
        .map_err(PdteError::Io)?;

    let bits = cfg.feature_bits as usize;
    let bit_mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
    let mut rng = thread_rng();

    let client_pub_msg = MessageStream::<ElGamalPubkey>::receive_msg(control).map_err(PdteError::Io)?;
    let client_pub = elgamal::point_from_bytes(&client_pub_msg.point)?;

    let feature_batch = MessageStream::<ElGamalCiphertextBatch>::receive_msg(control).map_err(PdteError::Io)?;
    let d = tree.num_attributes as usize;
    if feature_batch.ciphertexts.len() != d * bits {
        return Err(PdteError::Protocol(
            "client's feature ciphertext batch does not match the negotiated dimension/width".into(),
        ));
    }
    let feature_cts: Vec<Vec<ElGamalCiphertext>> = feature_batch
        .ciphertexts
        .chunks(bits)
        .map(|chunk| chunk.iter().map(unwire_ct).collect::<Result<Vec<_>, _>>())
        .collect::<Result<_, _>>()?;

    let decision_indices: Vec<usize> =
        tree.nodes.iter().enumerate().filter(|(_, n)| !n.leaf).map(|(i, _)| i).collect();
    let mut real_nodes: Vec<usize> =
        decision_indices.iter().copied().filter(|&i| !is_dummy(&tree.nodes[i])).collect();
    real_nodes.shuffle(&mut rng);

    let mut s_for: HashMap<usize, i64> = HashMap::new();
    let mut gt_batch = Vec::with_capacity(real_nodes.len() * bits);

    for &arena in &real_nodes {
        let node = &tree.nodes[arena];
        let y_bits = bits_of((node.threshold as u64) & bit_mask, bits);
        let x_cts = &feature_cts[node.attribute_index as usize];

        let s = if rng.gen::<bool>() { 1i64 } else { -1i64 };
        s_for.insert(arena, s);

        // xor_j = Enc(x_j) if y_j == 0, else Enc(1 - x_j).
        let xor_cts: Vec<ElGamalCiphertext> = (0..bits)
            .map(|j| {
                if y_bits[j] == 0 {
                    x_cts[j]
                } else {
                    elgamal::add_constant(&elgamal::scalar_mul_const(&x_cts[j], -1), 1)
                }
            })
            .collect();

        // suffix[i] = sum_{j>i} xor_j, computed high-to-low.
        let mut suffix: Vec<Option<ElGamalCiphertext>> = vec![None; bits];
        let mut acc: Option<ElGamalCiphertext> = None;
        for i in (0..bits).rev() {
            suffix[i] = acc;
            acc = Some(match acc {
                None => xor_cts[i],
                Some(a) => elgamal::add(&a, &xor_cts[i]),
            });
        }

        let mut c_vec: Vec<ElGamalCiphertext> = (0..bits)
            .map(|i| {
                let term = elgamal::add_constant(&x_cts[i], s - y_bits[i] as i64);
                match suffix[i] {
                    Some(ref suf) => elgamal::add(&term, &elgamal::scalar_mul_const(suf, 3)),
                    None => term,
                }
            })
            .collect();
        c_vec.shuffle(&mut rng);
        gt_batch.extend(c_vec);
    }

    MessageStream::<ElGamalCiphertextBatch>::send_msg(control, batch_of(&gt_batch)).map_err(PdteError::Io)?;

    let shares_batch = MessageStream::<ElGamalCiphertextBatch>::receive_msg(control).map_err(PdteError::Io)?;
    if shares_batch.ciphertexts.len() != real_nodes.len() {
        return Err(PdteError::Protocol("client returned the wrong number of comparison shares".into()));
    }

    let mut edge_cost: HashMap<usize, (ElGamalCiphertext, ElGamalCiphertext)> = HashMap::new();
    for &arena in &decision_indices {
        if is_dummy(&tree.nodes[arena]) {
            let zero_left = elgamal::encrypt_with(&client_pub, 0);
            let zero_right = elgamal::encrypt_with(&client_pub, 0);
            edge_cost.insert(arena, (zero_left, zero_right));
        }
    }
    for (i, &arena) in real_nodes.iter().enumerate() {
        let enc_b = unwire_ct(&shares_batch.ciphertexts[i])?;
        let server_share_bit = s_for[&arena] == -1;
        let true_result = if server_share_bit {
            elgamal::add_constant(&elgamal::scalar_mul_const(&enc_b, -1), 1)
        } else {
            enc_b
        };
        let cost_left = true_result;
        let cost_right = elgamal::add_constant(&elgamal::scalar_mul_const(&true_result, -1), 1);
        edge_cost.insert(arena, (cost_left, cost_right));
    }

    let leaf_indices: Vec<usize> = tree.nodes.iter().enumerate().filter(|(_, n)| n.leaf).map(|(i, _)| i).collect();

    let mut entries: Vec<(ElGamalCiphertext, ElGamalCiphertext)> = Vec::with_capacity(leaf_indices.len());
    for &leaf in &leaf_indices {
        let mut pathcost = elgamal::encrypt_with(&client_pub, 0);
        let mut cur = leaf;
        while let Some(parent) = tree.nodes[cur].parent {
            let (cost_left, cost_right) = &edge_cost[&parent];
            let edge = if tree.nodes[parent].left == Some(cur) { cost_left } else { cost_right };
            pathcost = elgamal::add(&pathcost, edge);
            cur = parent;
        }

        let r1 = rng.gen_range(1..=50i64);
        let masked_pathcost = elgamal::scalar_mul_const(&pathcost, r1);

        let r2 = rng.gen_range(1..=50i64);
        let label = tree.nodes[leaf].classification as i64;
        let classif = elgamal::add_constant(&elgamal::scalar_mul_const(&pathcost, r2), label);

        entries.push((masked_pathcost, classif));
    }
    entries.shuffle(&mut rng);

    let pathcosts: Vec<ElGamalCiphertext> = entries.iter().map(|(p, _)| *p).collect();
    let classifs: Vec<ElGamalCiphertext> = entries.iter().map(|(_, c)| *c).collect();
    MessageStream::<ElGamalCiphertextBatch>::send_msg(control, batch_of(&pathcosts)).map_err(PdteError::Io)?;
    MessageStream::<ElGamalCiphertextBatch>::send_msg(control, batch_of(&classifs)).map_err(PdteError::Io)?;

    tracing::info!(leaves = leaf_indices.len(), "server completed an HHH query");
    Ok(())
}

fn run_client(cfg: &Config, control: &mut TcpStream) -> Result<u64, PdteError> {
    let handshake =
        MessageStream::<crate::backend::garbler_backend::protos::Handshake>::receive_msg(control)
            .map_err(PdteError::Io)?;
    check_handshake(cfg, &handshake)?;

    let d = handshake.dimension as usize;
    if cfg.features.len() < d {
        return Err(PdteError::Config(format!(
            "--features must supply at least {d} values for this tree, got {}",
            cfg.features.len()
        )));
    }
    let bits = handshake.feature_bits as usize;

    let keypair = ElGamalKeypair::generate();
    let mut pub_msg = ElGamalPubkey::new();
    pub_msg.point = elgamal::point_to_bytes(&keypair.public_key());
    MessageStream::<ElGamalPubkey>::send_msg(control, pub_msg).map_err(PdteError::Io)?;

    let mut feature_cts = Vec::with_capacity(d * bits);
    for &value in cfg.features.iter().take(d) {
        for bit in bits_of(value, bits) {
            feature_cts.push(keypair.encrypt(bit as i64));
        }
    }
    MessageStream::<ElGamalCiphertextBatch>::send_msg(control, batch_of(&feature_cts)).map_err(PdteError::Io)?;

    let gt_batch = MessageStream::<ElGamalCiphertextBatch>::receive_msg(control).map_err(PdteError::Io)?;
    if gt_batch.ciphertexts.len() % bits != 0 {
        return Err(PdteError::Protocol("gt ciphertext batch is not a multiple of the bit width".into()));
    }
    let num_nodes = gt_batch.ciphertexts.len() / bits;

    let mut shares = Vec::with_capacity(num_nodes);
    for group in gt_batch.ciphertexts.chunks(bits) {
        let mut found_zero = false;
        for wire in group {
            let ct = unwire_ct(wire)?;
            if let Ok(0) = keypair.decrypt_bounded(&ct) {
                found_zero = true;
                break;
            }
        }
        shares.push(keypair.encrypt(found_zero as i64));
    }
    MessageStream::<ElGamalCiphertextBatch>::send_msg(control, batch_of(&shares)).map_err(PdteError::Io)?;

    let pathcosts_msg = MessageStream::<ElGamalCiphertextBatch>::receive_msg(control).map_err(PdteError::Io)?;
    let classifs_msg = MessageStream::<ElGamalCiphertextBatch>::receive_msg(control).map_err(PdteError::Io)?;
    if pathcosts_msg.ciphertexts.len() != classifs_msg.ciphertexts.len() {
        return Err(PdteError::Protocol("path-cost and classification batches have mismatched lengths".into()));
    }

    for (pathcost_wire, classif_wire) in pathcosts_msg.ciphertexts.iter().zip(classifs_msg.ciphertexts.iter()) {
        let pathcost_ct = unwire_ct(pathcost_wire)?;
        if matches!(keypair.decrypt_bounded(&pathcost_ct), Ok(0)) {
            let classif_ct = unwire_ct(classif_wire)?;
            let label = keypair.decrypt_bounded(&classif_ct)?;
            return Ok(label as u64);
        }
    }

    Err(PdteError::Invariant("no leaf's path cost decrypted to zero".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_of_is_least_significant_first() {
        assert_eq!(bits_of(0b1011, 4), vec![1, 1, 0, 1]);
    }
}
