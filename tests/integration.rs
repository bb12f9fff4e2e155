//! End-to-end scenarios (spec §8): a full two-party query over a real TCP
//! loopback connection, server and client each running the same `protocol::run`
//! entry point the `server`/`client` binaries call, one per thread.

use std::io::Write;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::Duration;

use pdte::config::{Config, HeScheme, Protocol, Role, SelectionAlg};
use pdte::protocol;

/// Distinct port ranges per test so they can run concurrently under `cargo test`
/// without colliding; `protocol::run` binds both a control and a control+1 port.
static NEXT_PORT: AtomicU16 = AtomicU16::new(17766);

fn next_port_pair() -> u16 {
    NEXT_PORT.fetch_add(2, Ordering::SeqCst)
}

/// The depth-2 toy tree from spec §8 scenario 1: root `X[0] <= 500`, left
/// leaf `7`; right subtree `X[1] <= 300` with left leaf `11`, right leaf `13`.
fn write_toy_tree() -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("pdte-toy-tree-{}.txt", std::process::id()));
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(
        f,
        r#"digraph {{
N0 [label="X0 <= 0.5"];
N1 [label="leaf:7"];
N2 [label="X1 <= 0.3"];
N3 [label="leaf:11"];
N4 [label="leaf:13"];
N0 -> N1;
N0 -> N2;
N2 -> N3;
N2 -> N4;
}}"#
    )
    .unwrap();
    path
}

fn base_config(role: Role, port: u16, tree_file: &std::path::Path) -> Config {
    Config {
        role,
        addr: Ipv4Addr::LOCALHOST,
        port,
        protocol: Protocol::Hgg,
        selection_alg: SelectionAlg::Gc,
        he_scheme: HeScheme::Paillier,
        tree_file: Some(tree_file.to_string_lossy().into_owned()),
        full_tree_attrs: None,
        full_tree_depth: None,
        keycache_path: None,
        security_bits: 128,
        he_bits: 512,
        feature_bits: 12,
        features: Vec::new(),
    }
}

/// Spawn the server on its own thread and run the client in-line, retrying the
/// client's connect briefly since the server thread may not have bound its
/// listener yet.
fn run_query(port: u16, tree_file: &std::path::Path, features: Vec<u64>) -> u64 {
    let server_cfg = base_config(Role::Server, port, tree_file);
    let server = thread::spawn(move || protocol::run(&server_cfg).unwrap());

    let mut client_cfg = base_config(Role::Client, port, tree_file);
    client_cfg.features = features;

    let mut attempt = 0;
    let result = loop {
        match protocol::run(&client_cfg) {
            Ok(Some(classification)) => break classification,
            Err(pdte::PdteError::Io(e)) if attempt < 50 => {
                attempt += 1;
                thread::sleep(Duration::from_millis(20));
                let _ = e;
                continue;
            }
            other => panic!("client query failed: {other:?}"),
        }
    };

    server.join().unwrap();
    result
}

#[test]
fn toy_tree_depth_two_left_path() {
    let tree = write_toy_tree();
    // X[0] = 100 <= 500 -> leaf 7.
    assert_eq!(run_query(next_port_pair(), &tree, vec![100, 0]), 7);
}

#[test]
fn toy_tree_depth_two_right_left_path() {
    let tree = write_toy_tree();
    // X[0] = 600 > 500 -> right; X[1] = 200 <= 300 -> leaf 11.
    assert_eq!(run_query(next_port_pair(), &tree, vec![600, 200]), 11);
}

#[test]
fn toy_tree_depth_two_right_right_path() {
    let tree = write_toy_tree();
    // X[0] = 600 > 500 -> right; X[1] = 400 > 300 -> leaf 13.
    assert_eq!(run_query(next_port_pair(), &tree, vec![600, 400]), 13);
}

#[test]
fn he_selection_path_matches_gc_selection_path() {
    let tree = write_toy_tree();
    let port = next_port_pair();

    let mut server_cfg = base_config(Role::Server, port, &tree);
    server_cfg.selection_alg = SelectionAlg::He;
    server_cfg.he_scheme = HeScheme::Paillier;
    let server = thread::spawn(move || protocol::run(&server_cfg).unwrap());

    let mut client_cfg = base_config(Role::Client, port, &tree);
    client_cfg.selection_alg = SelectionAlg::He;
    client_cfg.he_scheme = HeScheme::Paillier;
    client_cfg.features = vec![600, 400];

    let mut attempt = 0;
    let result = loop {
        match protocol::run(&client_cfg) {
            Ok(Some(classification)) => break classification,
            Err(pdte::PdteError::Io(_)) if attempt < 50 => {
                attempt += 1;
                thread::sleep(Duration::from_millis(20));
                continue;
            }
            other => panic!("client query failed: {other:?}"),
        }
    };

    server.join().unwrap();
    assert_eq!(result, 13);
}

#[test]
fn hhh_protocol_matches_plaintext_evaluation() {
    let tree = write_toy_tree();
    let port = next_port_pair();

    let mut server_cfg = base_config(Role::Server, port, &tree);
    server_cfg.protocol = Protocol::Hhh;
    let server = thread::spawn(move || protocol::run(&server_cfg).unwrap());

    let mut client_cfg = base_config(Role::Client, port, &tree);
    client_cfg.protocol = Protocol::Hhh;
    client_cfg.features = vec![100, 0];

    let mut attempt = 0;
    let result = loop {
        match protocol::run(&client_cfg) {
            Ok(Some(classification)) => break classification,
            Err(pdte::PdteError::Io(_)) if attempt < 50 => {
                attempt += 1;
                thread::sleep(Duration::from_millis(20));
                continue;
            }
            other => panic!("client query failed: {other:?}"),
        }
    };

    server.join().unwrap();
    assert_eq!(result, 7);
}

#[test]
fn full_tree_benchmark_shape_evaluates_consistently_with_plaintext() {
    // No tree file: a synthetic complete tree, exercised through the real
    // client/server wire protocol and cross-checked against the plaintext
    // evaluator every party could run locally for testing.
    let port = next_port_pair();
    let attrs = 3u32;
    let depth = 3u32;

    let server_cfg = Config {
        role: Role::Server,
        addr: Ipv4Addr::LOCALHOST,
        port,
        protocol: Protocol::Hgg,
        selection_alg: SelectionAlg::Gc,
        he_scheme: HeScheme::Paillier,
        tree_file: None,
        full_tree_attrs: Some(attrs),
        full_tree_depth: Some(depth),
        keycache_path: None,
        security_bits: 128,
        he_bits: 512,
        feature_bits: 12,
        features: Vec::new(),
    };
    let mut client_cfg = server_cfg.clone();
    client_cfg.role = Role::Client;
    client_cfg.features = vec![1000, 0, 0];

    let expected = {
        let mut tree = pdte::dectree::DecisionTree::full_tree(attrs, depth);
        tree.depth_pad();
        tree.evaluate(&[1000, 0, 0]).unwrap()
    };

    let server = thread::spawn(move || protocol::run(&server_cfg).unwrap());

    let mut attempt = 0;
    let result = loop {
        match protocol::run(&client_cfg) {
            Ok(Some(classification)) => break classification,
            Err(pdte::PdteError::Io(_)) if attempt < 50 => {
                attempt += 1;
                thread::sleep(Duration::from_millis(20));
                continue;
            }
            other => panic!("client query failed: {other:?}"),
        }
    };

    server.join().unwrap();
    assert_eq!(result, expected);
}
