//! Two-party query orchestration: the wire-level choreography that ties the
//! cryptographic primitives in the other modules into an actual PDTE query.
//!
//! Every query opens two TCP streams (§4.8): a *control* channel at `port`
//! carrying length-prefixed protobuf messages (handshake, HE/EC-ElGamal key
//! exchange, OT rounds, the final result), and a *bulk* channel at `port + 1`
//! carrying only the raw garbled decision tree, windowed in fixed-size
//! chunks with no length prefix since both peers already know its size from
//! the handshake. `hgg` implements the HE-selection + garbled-circuit
//! comparison + garbled-tree evaluation path; `hhh` implements the
//! EC-ElGamal bit-comparison + path-cost evaluation path.

pub mod hgg;
pub mod hhh;
mod ot_transfer;

use std::net::{TcpListener, TcpStream};

use crate::backend::garbler_backend::protos::Handshake;
use crate::config::{Config, HeScheme, Protocol, Role, SelectionAlg};
use crate::dectree::{parser, DecisionTree};
use crate::error::PdteError;

/// Open both channels, in role-appropriate order: the Server binds and
/// accepts on both ports before the Client dials either.
fn open_channels(cfg: &Config) -> Result<(TcpStream, TcpStream), PdteError> {
    match cfg.role {
        Role::Server => {
            let control_listener = TcpListener::bind((cfg.addr, cfg.port)).map_err(PdteError::Io)?;
            let tree_listener = TcpListener::bind((cfg.addr, cfg.port + 1)).map_err(PdteError::Io)?;
            tracing::info!(addr = %cfg.addr, port = cfg.port, "waiting for a client");
            let (control, peer) = control_listener.accept().map_err(PdteError::Io)?;
            tracing::info!(%peer, "client connected on control channel");
            let (tree, _) = tree_listener.accept().map_err(PdteError::Io)?;
            Ok((control, tree))
        }
        Role::Client => {
            tracing::info!(addr = %cfg.addr, port = cfg.port, "connecting to server");
            let control = TcpStream::connect((cfg.addr, cfg.port)).map_err(PdteError::Io)?;
            let tree = TcpStream::connect((cfg.addr, cfg.port + 1)).map_err(PdteError::Io)?;
            Ok((control, tree))
        }
    }
}

/// Run one query end to end. Returns the classification on the Client, `None`
/// on the Server (the Server never learns the result — that's the point).
pub fn run(cfg: &Config) -> Result<Option<u64>, PdteError> {
    let (mut control, mut tree_stream) = open_channels(cfg)?;

    match cfg.protocol {
        Protocol::Hgg => hgg::run(cfg, &mut control, &mut tree_stream),
        Protocol::Hhh => hhh::run(cfg, &mut control),
    }
}

/// Load (and depth-pad) the tree the Server evaluates against, from a tree
/// file or as a synthetic complete tree (§6 CLI: `--tree` / `--full-tree`).
pub(crate) fn load_server_tree(cfg: &Config) -> Result<DecisionTree, PdteError> {
    let mut tree = if let Some(path) = &cfg.tree_file {
        parser::parse_tree_file(path)?
    } else {
        let attrs = cfg
            .full_tree_attrs
            .ok_or_else(|| PdteError::Config("--full-tree requires <attrs> <depth>".into()))?;
        let depth = cfg
            .full_tree_depth
            .ok_or_else(|| PdteError::Config("--full-tree requires <attrs> <depth>".into()))?;
        DecisionTree::full_tree(attrs, depth)
    };
    tree.depth_pad();
    Ok(tree)
}

pub(crate) fn selection_alg_to_wire(alg: SelectionAlg) -> u32 {
    match alg {
        SelectionAlg::He => 0,
        SelectionAlg::Gc => 1,
    }
}

pub(crate) fn he_scheme_to_wire(scheme: HeScheme) -> u32 {
    match scheme {
        HeScheme::Paillier => 0,
        HeScheme::Dgk => 1,
    }
}

pub(crate) fn protocol_to_wire(protocol: Protocol) -> u32 {
    match protocol {
        Protocol::Hgg => 0,
        Protocol::Hhh => 1,
    }
}

/// Build the Server's opening handshake describing the padded tree's shape
/// and the negotiated protocol parameters.
pub(crate) fn build_handshake(cfg: &Config, tree: &DecisionTree) -> Handshake {
    let mut h = Handshake::new();
    h.num_dec_nodes = tree.num_decision_nodes() as u32;
    h.num_leaves = tree.num_leaves() as u32;
    h.dimension = tree.num_attributes;
    h.depth = tree.depth;
    h.selection_alg = selection_alg_to_wire(cfg.selection_alg);
    h.he_scheme = he_scheme_to_wire(cfg.he_scheme);
    h.protocol = protocol_to_wire(cfg.protocol);
    h.feature_bits = cfg.feature_bits;
    h
}

/// Validate that the Server's handshake matches what this Client was
/// configured to expect — a mismatch is a configuration error, not a
/// protocol bug, so it surfaces as `PdteError::Protocol`.
pub(crate) fn check_handshake(cfg: &Config, handshake: &Handshake) -> Result<(), PdteError> {
    if handshake.selection_alg != selection_alg_to_wire(cfg.selection_alg) {
        return Err(PdteError::Protocol(
            "server's selection algorithm does not match this client's configuration".into(),
        ));
    }
    if handshake.he_scheme != he_scheme_to_wire(cfg.he_scheme) {
        return Err(PdteError::Protocol(
            "server's HE scheme does not match this client's configuration".into(),
        ));
    }
    if handshake.protocol != protocol_to_wire(cfg.protocol) {
        return Err(PdteError::Protocol(
            "server's protocol variant does not match this client's configuration".into(),
        ));
    }
    if handshake.feature_bits != cfg.feature_bits {
        return Err(PdteError::Protocol(
            "server's feature bit width does not match this client's configuration".into(),
        ));
    }
    Ok(())
}
