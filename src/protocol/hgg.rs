//! HGG (§4): homomorphic-encryption or garbled-circuit feature selection,
//! a garbled threshold comparator per decision node, and garbled
//! decision-tree evaluation over the result.
//!
//! Both selection sub-paths (`SelectionAlg::He`, `SelectionAlg::Gc`) converge
//! on the same shape: the Server ends up with a `(k0, k1, pi)` triple per
//! slot and the Client ends up with the raw comparator output key it
//! evaluated for that slot. The tree-evaluation phase below is built once
//! against that shared shape and doesn't care which selection algorithm
//! produced it.

use std::collections::HashMap;
use std::net::TcpStream;
use std::path::PathBuf;

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};

use crate::backend::garbler_backend::protos::{
    CiphertextBatch, DgkPubkey, GarbledCircuitSend, PaillierPubkey,
};
use crate::backend::garbler_backend::{send_direct_input_keys, send_garbled_circuit};
use crate::backend::receiver_backend::{receive_direct_input_keys, GarbledCircuitRecv};
use crate::config::{Config, HeScheme, Role, SelectionAlg};
use crate::dectree::garbled::{Child, NodeGarbleInput, RECORD_LEN};
use crate::dectree::{DecisionTree, GarbledTree};
use crate::error::PdteError;
use crate::garbling::{GarbledWire, KEY_SIZE};
use crate::gc::GarbledComparator;
use crate::he::paillier::PaillierKeypair;
use crate::he::wire as he_wire;
use crate::he::{party::DGK_PLAINTEXT_BITS, HeCiphertext, SelectionHeParty, SelectionHePublic};
use crate::message::{receive_windowed, send_windowed, MessageStream};
use crate::selection::{GcSelectionCircuit, SelectionBlock};

use super::{build_handshake, check_handshake, load_server_tree, ot_transfer};

pub fn run(cfg: &Config, control: &mut TcpStream, tree_stream: &mut TcpStream) -> Result<Option<u64>, PdteError> {
    match cfg.role {
        Role::Server => {
            run_server(cfg, control, tree_stream)?;
            Ok(None)
        }
        Role::Client => run_client(cfg, control, tree_stream).map(Some),
    }
}

/// The comparator's wire width: the feature domain's bit width on the GC
/// path, or that same width clamped to DGK's small plaintext domain when
/// the selection phase runs over DGK ciphertexts.
fn comparator_bits(feature_bits: u32, selection_alg: SelectionAlg, he_scheme: HeScheme) -> usize {
    let feature_bits = feature_bits as usize;
    match (selection_alg, he_scheme) {
        (SelectionAlg::He, HeScheme::Dgk) => feature_bits.min(DGK_PLAINTEXT_BITS as usize),
        _ => feature_bits,
    }
}

/// A random permutation of `0..m` fixing `sigma(0) = 0`, so the root always
/// sits at slot 0 while every other decision node's slot stays hidden from
/// the Client.
fn random_sigma(m: usize) -> Vec<usize> {
    if m == 0 {
        return Vec::new();
    }
    let mut slots: Vec<usize> = (1..m).collect();
    slots.shuffle(&mut thread_rng());

    let mut sigma = vec![0usize; m];
    for (i, nat) in (1..m).enumerate() {
        sigma[nat] = slots[i];
    }
    sigma
}

fn invert_permutation(sigma: &[usize]) -> Vec<usize> {
    let mut inv = vec![0usize; sigma.len()];
    for (nat, &slot) in sigma.iter().enumerate() {
        inv[slot] = nat;
    }
    inv
}

fn fresh_difference() -> [u8; KEY_SIZE] {
    let mut difference = [0u8; KEY_SIZE];
    thread_rng().fill(&mut difference);
    difference[KEY_SIZE - 1] |= 1;
    difference
}

fn he_keycache_path(cfg: &Config, default: String) -> PathBuf {
    match &cfg.keycache_path {
        Some(p) => PathBuf::from(p),
        None => PathBuf::from(default),
    }
}

/// The non-leaf child of a decision node, expressed in slot space -- a leaf
/// child needs no slot at all, just its classification.
fn child_of(
    tree: &DecisionTree,
    arena_to_natural: &HashMap<usize, usize>,
    sigma: &[usize],
    node_key: &[[u8; KEY_SIZE]],
    arena_child: Option<usize>,
) -> Result<Child, PdteError> {
    let arena_child =
        arena_child.ok_or_else(|| PdteError::Invariant("decision node missing child".into()))?;
    let child_node = &tree.nodes[arena_child];

    if child_node.leaf {
        return Ok(Child::Leaf { classification: child_node.classification });
    }

    let child_natural = *arena_to_natural
        .get(&arena_child)
        .ok_or_else(|| PdteError::Invariant("decision child missing from node order".into()))?;
    let child_slot = sigma[child_natural];
    Ok(Child::Decision { slot: child_slot, node_key: node_key[child_slot] })
}

fn run_server(cfg: &Config, control: &mut TcpStream, tree_stream: &mut TcpStream) -> Result<(), PdteError> {
    let tree = load_server_tree(cfg)?;
    let handshake = build_handshake(cfg, &tree);
    MessageStream::<crate::backend::garbler_backend::protos::Handshake>::send_msg(control, handshake)
        .map_err(PdteError::Io)?;

    let m = tree.num_decision_nodes();
    let d = tree.num_attributes as usize;
    let order = tree.decision_node_order();
    let bits = comparator_bits(cfg.feature_bits, cfg.selection_alg, cfg.he_scheme);
    let bit_mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };

    let sigma = random_sigma(m);
    let inv_sigma = invert_permutation(&sigma);
    let arena_to_natural: HashMap<usize, usize> =
        order.iter().enumerate().map(|(nat, &arena)| (arena, nat)).collect();

    let mut rng = thread_rng();
    let mut mapping = vec![0usize; m];
    let mut thresholds = vec![0u64; m];
    let mut masks = vec![0u64; m];
    for slot in 0..m {
        let arena = order[inv_sigma[slot]];
        let node = &tree.nodes[arena];
        mapping[slot] = node.attribute_index as usize;
        thresholds[slot] = (node.threshold as u64) & bit_mask;
        masks[slot] = rng.gen::<u64>() & bit_mask;
    }

    let difference = fresh_difference();

    let comparator_outputs = match cfg.selection_alg {
        SelectionAlg::He => {
            run_server_he_selection(cfg, control, &mapping, &masks, &thresholds, bits, &difference)?
        }
        SelectionAlg::Gc => run_server_gc_selection(control, &mapping, d, &thresholds, bits, &difference)?,
    };

    let mut node_key = vec![[0u8; KEY_SIZE]; m];
    for key in node_key.iter_mut().skip(1) {
        rng.fill(key);
    }

    let mut garble_inputs = Vec::with_capacity(m);
    for slot in 0..m {
        let arena = order[inv_sigma[slot]];
        let node = &tree.nodes[arena];
        let (k0, k1, pi) = comparator_outputs[slot];

        garble_inputs.push(NodeGarbleInput {
            slot,
            node_key: node_key[slot],
            left: child_of(&tree, &arena_to_natural, &sigma, &node_key, node.left)?,
            right: child_of(&tree, &arena_to_natural, &sigma, &node_key, node.right)?,
            k0,
            k1,
            pi,
        });
    }

    let garbled_tree = GarbledTree::build(m, &garble_inputs)?;
    let flat: Vec<u8> = garbled_tree.records().iter().flatten().copied().collect();
    send_windowed(tree_stream, &flat).map_err(PdteError::Io)?;

    tracing::info!(m, d, "server completed an HGG query");
    Ok(())
}

/// The Server's half of the `SelectionAlg::He` path: receive the Client's HE
/// public key and feature ciphertexts, homomorphically select-and-mask each
/// decision node's attribute, send the masked ciphertexts back, then garble
/// and deliver one comparator per slot.
fn run_server_he_selection(
    cfg: &Config,
    control: &mut TcpStream,
    mapping: &[usize],
    masks: &[u64],
    thresholds: &[u64],
    bits: usize,
    difference: &[u8; KEY_SIZE],
) -> Result<Vec<([u8; KEY_SIZE], [u8; KEY_SIZE], bool)>, PdteError> {
    let m = mapping.len();
    let he_bits = cfg.he_bits as u64;

    let public = match cfg.he_scheme {
        HeScheme::Paillier => {
            let msg = MessageStream::<PaillierPubkey>::receive_msg(control).map_err(PdteError::Io)?;
            SelectionHePublic::Paillier(he_wire::paillier_pubkey_from_n(he_wire::decode_be(&msg.n)))
        }
        HeScheme::Dgk => {
            let msg = MessageStream::<DgkPubkey>::receive_msg(control).map_err(PdteError::Io)?;
            let n = he_wire::decode_be(&msg.n);
            let g = he_wire::decode_be(&msg.g);
            let h = he_wire::decode_be(&msg.h);
            let u = he_wire::decode_be(&msg.u)
                .to_u64()
                .ok_or_else(|| PdteError::Protocol("DGK plaintext modulus does not fit in u64".into()))?;
            SelectionHePublic::Dgk(he_wire::dgk_pubkey_from_parts(n, g, h, u))
        }
    };

    let cts_msg = MessageStream::<CiphertextBatch>::receive_msg(control).map_err(PdteError::Io)?;
    let cts: Vec<HeCiphertext> = cts_msg
        .ciphertexts
        .iter()
        .map(|bytes| match cfg.he_scheme {
            HeScheme::Paillier => HeCiphertext::Paillier(he_wire::decode_paillier_ct(bytes)),
            HeScheme::Dgk => HeCiphertext::Dgk(he_wire::decode_dgk_ct(bytes)),
        })
        .collect();

    let selected = public.select_and_mask(&cts, mapping, masks)?;
    let packed = public.pack_for_transfer(&selected)?;
    let packed_bytes: Vec<Vec<u8>> = packed
        .iter()
        .map(|ct| match cfg.he_scheme {
            HeScheme::Paillier => he_wire::encode_paillier_ct(ct, he_bits),
            HeScheme::Dgk => he_wire::encode_dgk_ct(ct, he_bits),
        })
        .collect::<Result<_, _>>()?;

    let mut reply = CiphertextBatch::new();
    reply.ciphertexts = packed_bytes;
    MessageStream::<CiphertextBatch>::send_msg(control, reply).map_err(PdteError::Io)?;

    let mut outputs = Vec::with_capacity(m);
    for slot in 0..m {
        let comparator = GarbledComparator::garble(bits, thresholds[slot], difference);
        send_garbled_circuit(control, comparator.circuit()).map_err(PdteError::Io)?;
        send_direct_input_keys(control, comparator.mask_wires(), &comparator.mask_bits(masks[slot]))
            .map_err(PdteError::Io)?;
        ot_transfer::send_keys_via_ot(control, comparator.blinded_input_wires())?;

        let (k0, k1) = comparator.output_keys();
        outputs.push((k0, k1, comparator.permutation_bit()));
    }

    Ok(outputs)
}

/// The Server's half of the `SelectionAlg::Gc` path: one garbled bundle
/// realizing selection-then-compare for every slot at once, sharing the
/// routing network's garbled gates.
fn run_server_gc_selection(
    control: &mut TcpStream,
    mapping: &[usize],
    d: usize,
    thresholds: &[u64],
    bits: usize,
    difference: &[u8; KEY_SIZE],
) -> Result<Vec<([u8; KEY_SIZE], [u8; KEY_SIZE], bool)>, PdteError> {
    let block = SelectionBlock::program(d, mapping)?;
    let bundle = GcSelectionCircuit::garble(&block, d, bits, thresholds, difference);

    send_direct_input_keys(control, bundle.control_wires(), &block.control_bits()).map_err(PdteError::Io)?;
    ot_transfer::send_keys_via_ot(control, bundle.feature_input_wires())?;

    for circuit in bundle.circuits() {
        send_garbled_circuit(control, circuit.clone()).map_err(PdteError::Io)?;
    }

    Ok(bundle.output_keys().to_vec())
}

fn run_client(cfg: &Config, control: &mut TcpStream, tree_stream: &mut TcpStream) -> Result<u64, PdteError> {
    let handshake =
        MessageStream::<crate::backend::garbler_backend::protos::Handshake>::receive_msg(control)
            .map_err(PdteError::Io)?;
    check_handshake(cfg, &handshake)?;

    let m = handshake.num_dec_nodes as usize;
    let d = handshake.dimension as usize;
    if cfg.features.len() < d {
        return Err(PdteError::Config(format!(
            "--features must supply at least {d} values for this tree, got {}",
            cfg.features.len()
        )));
    }
    let bits = comparator_bits(handshake.feature_bits, cfg.selection_alg, cfg.he_scheme);

    let node_output_key: Vec<[u8; KEY_SIZE]> = match cfg.selection_alg {
        SelectionAlg::He => run_client_he_selection(cfg, control, m, bits)?,
        SelectionAlg::Gc => run_client_gc_selection(cfg, control, m, d, bits)?,
    };

    let expected_len = 2 * m * RECORD_LEN;
    let flat = receive_windowed(tree_stream, expected_len).map_err(PdteError::Io)?;
    let records: Vec<[u8; RECORD_LEN]> = flat
        .chunks(RECORD_LEN)
        .map(|chunk| {
            let mut arr = [0u8; RECORD_LEN];
            arr.copy_from_slice(chunk);
            arr
        })
        .collect();
    let garbled_tree = GarbledTree::from_records(records)?;

    garbled_tree.traverse(|slot| {
        node_output_key
            .get(slot)
            .copied()
            .ok_or_else(|| PdteError::Invariant(format!("no evaluated comparator output for slot {slot}")))
    })
}

/// The Client's half of the `SelectionAlg::He` path: publish an HE public
/// key, send encrypted features, receive the masked-and-selected
/// ciphertexts back, decrypt+unpack them, then evaluate one comparator
/// circuit per slot against the resulting blinded value.
fn run_client_he_selection(
    cfg: &Config,
    control: &mut TcpStream,
    m: usize,
    bits: usize,
) -> Result<Vec<[u8; KEY_SIZE]>, PdteError> {
    let he_bits = cfg.he_bits as u64;

    let party = match cfg.he_scheme {
        HeScheme::Paillier => {
            let path = he_keycache_path(cfg, crate::he::keycache::default_paillier_path(he_bits));
            let kp = crate::he::keycache::load_or_generate_paillier(&path, he_bits);

            let mut msg = PaillierPubkey::new();
            msg.n = kp.public.n.to_bytes_be();
            MessageStream::<PaillierPubkey>::send_msg(control, msg).map_err(PdteError::Io)?;

            SelectionHeParty::Paillier(kp)
        }
        HeScheme::Dgk => {
            let u = 1u64 << DGK_PLAINTEXT_BITS;
            let path = he_keycache_path(cfg, crate::he::keycache::default_dgk_path(he_bits));
            let kp = crate::he::keycache::load_or_generate_dgk(&path, u, he_bits);

            let mut msg = DgkPubkey::new();
            msg.n = kp.public.n.to_bytes_be();
            msg.g = kp.public.g.to_bytes_be();
            msg.h = kp.public.h.to_bytes_be();
            msg.u = BigUint::from(kp.public.u).to_bytes_be();
            msg.s_bits = DGK_PLAINTEXT_BITS;
            MessageStream::<DgkPubkey>::send_msg(control, msg).map_err(PdteError::Io)?;

            SelectionHeParty::Dgk(kp)
        }
    };

    let cts = party.encrypt_features(&cfg.features);
    let mut batch = CiphertextBatch::new();
    batch.ciphertexts = cts
        .iter()
        .map(|c| match c {
            HeCiphertext::Paillier(v) => he_wire::encode_paillier_ct(v, he_bits),
            HeCiphertext::Dgk(v) => he_wire::encode_dgk_ct(v, he_bits),
        })
        .collect::<Result<_, _>>()?;
    MessageStream::<CiphertextBatch>::send_msg(control, batch).map_err(PdteError::Io)?;

    let reply = MessageStream::<CiphertextBatch>::receive_msg(control).map_err(PdteError::Io)?;
    let packed: Vec<BigUint> = reply
        .ciphertexts
        .iter()
        .map(|bytes| match cfg.he_scheme {
            HeScheme::Paillier => he_wire::decode_paillier_ct(bytes),
            HeScheme::Dgk => he_wire::decode_dgk_ct(bytes),
        })
        .collect();
    let blinded = party.decrypt_and_unpack(&packed, m)?;

    let mut keys = Vec::with_capacity(m);
    for &value in blinded.iter() {
        let recv: GarbledCircuitRecv =
            MessageStream::<GarbledCircuitSend>::receive_msg(control).map_err(PdteError::Io)?.into();
        let mask_keys = receive_direct_input_keys(control).map_err(PdteError::Io)?;
        let blinded_bits: Vec<bool> = (0..bits).map(|i| (value >> i) & 1 == 1).collect();
        let blinded_keys = ot_transfer::receive_keys_via_ot(control, &blinded_bits)?;

        let mut inputs = blinded_keys;
        inputs.extend(mask_keys);
        keys.push(recv.eval(&inputs));
    }

    Ok(keys)
}

/// The Client's half of the `SelectionAlg::Gc` path: receive the Server's
/// routing control keys directly, derive its own feature-bit keys via OT,
/// then evaluate the `m` received circuits against the combined input.
fn run_client_gc_selection(
    cfg: &Config,
    control: &mut TcpStream,
    m: usize,
    d: usize,
    bits: usize,
) -> Result<Vec<[u8; KEY_SIZE]>, PdteError> {
    let control_keys = receive_direct_input_keys(control).map_err(PdteError::Io)?;

    let mut feature_bits_flat = Vec::with_capacity(d * bits);
    for &value in cfg.features.iter().take(d) {
        for b in 0..bits {
            feature_bits_flat.push((value >> b) & 1 == 1);
        }
    }
    let feature_keys = ot_transfer::receive_keys_via_ot(control, &feature_bits_flat)?;

    let mut all_keys = feature_keys;
    all_keys.extend(control_keys);

    let mut keys = Vec::with_capacity(m);
    for _ in 0..m {
        let recv: GarbledCircuitRecv =
            MessageStream::<GarbledCircuitSend>::receive_msg(control).map_err(PdteError::Io)?.into();
        keys.push(recv.eval(&all_keys));
    }

    Ok(keys)
}
