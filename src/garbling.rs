use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{
    circuit::{Circuit, Node},
    crypto::aes_ctr::AesCtr,
};

pub const KEY_SIZE: usize = 32;

#[derive(Clone, Debug)]
pub struct GarbledWire {
    on_key: [u8; KEY_SIZE],
    off_key: [u8; KEY_SIZE],
}

#[derive(Debug, Clone)]
/// A garbled gate (from the garbler's POV, i.e. we know the gate's keys and operation unlike the receiver)
pub struct GarbledGate {
    c_00: Option<Vec<u8>>,
    c_01: Option<Vec<u8>>,
    c_10: Option<Vec<u8>>,
    c_11: Option<Vec<u8>>,
    pub left: Option<Rc<RefCell<GarbledNode>>>,
    pub right: Option<Rc<RefCell<GarbledNode>>>,
    left_wire: Option<GarbledWire>,
    right_wire: Option<GarbledWire>,
    /// This gate's own output wire -- generated once per gate and reused by every parent
    /// that reads this gate's output, rather than dictated per-edge by the caller. That's
    /// what lets a shared sub-circuit (e.g. a subtractor's borrow chain) be garbled once
    /// and referenced from multiple places without duplicating the work.
    out_wire: Option<GarbledWire>,
    op: Option<u8>,
}

#[derive(Debug, Clone)]
/// Possible nodes in a GarbledCircuit (analogous to `Node` in a regular Circuit)
pub enum GarbledNode {
    Input(usize),
    Gate(Rc<RefCell<GarbledGate>>),
}

/// A garbled circuit from the garbler's POV
#[derive(Debug, Clone)]
pub struct GarbledCircuit {
    out: GarbledNode,
    input_wires: HashMap<usize, GarbledWire>,
    n: usize,
}

impl GarbledWire {
    /// Generate a new wire with random on and off keys
    pub fn new() -> GarbledWire {
        let mut rng = ChaCha20Rng::from_entropy();
        let mut on_key = [0u8; KEY_SIZE];
        let mut off_key = [0u8; KEY_SIZE];

        rng.fill(&mut on_key);
        rng.fill(&mut off_key);

        GarbledWire { on_key, off_key }
    }

    /// We have to generate the out wire in a manner that allows the receiver
    /// to detect whether the gate output true or false. To do this,
    /// we set the on key to only 1s, and the off key to only 0s
    pub fn out_wire() -> Self {
        GarbledWire {
            on_key: [1u8; KEY_SIZE],
            off_key: [0u8; KEY_SIZE],
        }
    }

    /// Build a wire pair whose keys differ by exactly `difference` (`on = off ^ difference`).
    /// Used for the decision-tree's comparator output wire, where the color bit the client
    /// learns (`lsb(key)`) must flip deterministically between the two keys -- which requires
    /// `difference` to have its least-significant bit set.
    pub fn with_difference(off_key: [u8; KEY_SIZE], difference: &[u8; KEY_SIZE]) -> Self {
        let mut on_key = off_key;
        for i in 0..KEY_SIZE {
            on_key[i] ^= difference[i];
        }
        GarbledWire { on_key, off_key }
    }

    pub fn off_key(&self) -> [u8; KEY_SIZE] {
        self.off_key
    }

    pub fn on_key(&self) -> [u8; KEY_SIZE] {
        self.on_key
    }

    /// `lsb(K)` -- the color bit an evaluator reads off whichever key it's holding.
    pub fn color_bit(key: &[u8; KEY_SIZE]) -> bool {
        key[KEY_SIZE - 1] & 1 == 1
    }
}

impl Default for GarbledWire {
    fn default() -> Self {
        Self::new()
    }
}

impl GarbledGate {
    /// Generate a new gate from the gate's own output wire, and the gate's operation
    fn new(out_wire: Option<GarbledWire>, op: u8) -> Self {
        GarbledGate {
            c_00: None,
            c_01: None,
            c_10: None,
            c_11: None,
            left: None,
            right: None,
            left_wire: None,
            right_wire: None,
            out_wire,
            op: Some(op),
        }
    }

    /// Assign ciphertexts to this gate based on its encrypted inputs
    fn assign_ciphertexts(&mut self) {
        let op = self.op.unwrap();
        // Get the bits of the operation
        let vals = ((op & 1) != 0, (op & 2) != 0, (op & 4) != 0, (op & 8) != 0);
        // Encrypt the output wire's keys
        let out_on_key = self.out_wire.as_ref().unwrap().on_key;
        let out_off_key = self.out_wire.as_ref().unwrap().off_key;
        // Each bit in the operation determines whether we encrypt the output wire's on key or off key
        let (out_00, out_01, out_10, out_11) = (
            if vals.0 { out_on_key } else { out_off_key },
            if vals.1 { out_on_key } else { out_off_key },
            if vals.2 { out_on_key } else { out_off_key },
            if vals.3 { out_on_key } else { out_off_key },
        );
        let left_off_cipher = AesCtr::new(&self.left_wire.as_ref().unwrap().off_key);
        let left_on_cipher = AesCtr::new(&self.left_wire.as_ref().unwrap().on_key);
        let right_off_cipher = AesCtr::new(&self.right_wire.as_ref().unwrap().off_key);
        let right_on_cipher = AesCtr::new(&self.right_wire.as_ref().unwrap().on_key);
        // We append zeros to the ciphertexts so that the receiver will be able
        // to distinguish between valid decryptions and gibberish
        // (since the decrypted keys are, by definition, random sequences of bytes, indistinguishable from gibberish)
        let zeros = [0u8; KEY_SIZE];
        self.c_00 = Some(left_off_cipher.encrypt(
            &right_off_cipher.encrypt([out_00, zeros].as_flattened(), 0),
            0,
        ));
        self.c_01 = Some(left_off_cipher.encrypt(
            &right_on_cipher.encrypt([out_01, zeros].as_flattened(), 0),
            0,
        ));
        self.c_10 = Some(left_on_cipher.encrypt(
            &right_off_cipher.encrypt([out_10, zeros].as_flattened(), 0),
            0,
        ));
        self.c_11 = Some(left_on_cipher.encrypt(
            &right_on_cipher.encrypt([out_11, zeros].as_flattened(), 0),
            0,
        ));
    }

    pub fn c_00(&self) -> Vec<u8> {
        self.c_00.as_ref().unwrap().clone()
    }

    pub fn c_01(&self) -> Vec<u8> {
        self.c_01.as_ref().unwrap().clone()
    }

    pub fn c_10(&self) -> Vec<u8> {
        self.c_10.as_ref().unwrap().clone()
    }

    pub fn c_11(&self) -> Vec<u8> {
        self.c_11.as_ref().unwrap().clone()
    }
}

/// Garbles a `Circuit`'s `Node` DAG once per unique gate, memoizing both the wire each gate
/// owns and the resulting `GarbledNode`, keyed by the gate's `Rc` pointer identity. Without
/// this, a circuit built with shared sub-expressions (a ripple-borrow chain referenced by
/// every later bit, say) would be re-garbled once per reference path and blow up
/// exponentially in the chain length.
struct Garbler<'a> {
    input_wires: &'a HashMap<usize, GarbledWire>,
    wires: HashMap<usize, GarbledWire>,
    garbled: HashMap<usize, Rc<RefCell<GarbledNode>>>,
}

impl<'a> Garbler<'a> {
    fn wire_of(&mut self, node: &Node, ptr: usize) -> GarbledWire {
        match node {
            Node::Input(idx) => self.input_wires.get(idx).cloned().unwrap(),
            Node::Gate(..) => self.wires.entry(ptr).or_insert_with(GarbledWire::new).clone(),
        }
    }

    fn garble_rc(&mut self, node: &Rc<Node>) -> Rc<RefCell<GarbledNode>> {
        let ptr = Rc::as_ptr(node) as usize;
        if let Some(cached) = self.garbled.get(&ptr) {
            return cached.clone();
        }

        let result = match node.as_ref() {
            Node::Input(idx) => Rc::new(RefCell::new(GarbledNode::Input(*idx))),
            Node::Gate(op, left, right) => {
                let out_wire = self.wire_of(node, ptr);
                Rc::new(RefCell::new(self.garble_gate(*op, left, right, out_wire)))
            }
        };

        self.garbled.insert(ptr, result.clone());
        result
    }

    fn garble_gate(&mut self, op: u8, left: &Rc<Node>, right: &Rc<Node>, out_wire: GarbledWire) -> GarbledNode {
        let left_wire = self.wire_of(left, Rc::as_ptr(left) as usize);
        let right_wire = self.wire_of(right, Rc::as_ptr(right) as usize);

        let left_child = self.garble_rc(left);
        let right_child = self.garble_rc(right);

        let mut gate = GarbledGate::new(Some(out_wire), op);
        gate.left = Some(left_child);
        gate.right = Some(right_child);
        gate.left_wire = Some(left_wire);
        gate.right_wire = Some(right_wire);
        gate.assign_ciphertexts();

        GarbledNode::Gate(Rc::new(RefCell::new(gate)))
    }

    /// The circuit's root is visited exactly once, so it never needs the gate-sharing
    /// cache -- but it does need to accept the caller's chosen output wire rather than
    /// generate its own.
    fn garble_root(&mut self, root: &Node, out_wire: GarbledWire) -> GarbledNode {
        match root {
            Node::Input(idx) => GarbledNode::Input(*idx),
            Node::Gate(op, left, right) => self.garble_gate(*op, left, right, out_wire),
        }
    }
}

impl From<Circuit> for GarbledCircuit {
    /// Garble a circuit, using the fixed all-1s/all-0s output wire (suitable when the
    /// result is revealed directly rather than consumed as another wire downstream).
    fn from(value: Circuit) -> Self {
        GarbledCircuit::from_with_output(value, GarbledWire::out_wire())
    }
}

impl GarbledCircuit {
    pub fn new(out: GarbledNode, input_wires: HashMap<usize, GarbledWire>, n: usize) -> GarbledCircuit {
        GarbledCircuit { out, input_wires, n }
    }

    /// Garble a circuit with a caller-chosen output wire -- the decision-tree driver uses
    /// this to hand in a free-XOR-related (`K0`, `K1 = K0 ^ R`) pair so the resulting color
    /// bit flips deterministically between the two possible results.
    pub fn from_with_output(circuit: Circuit, output_wire: GarbledWire) -> Self {
        let n = circuit.n();
        let mut input_wires = HashMap::with_capacity(n);
        for i in 0..n {
            input_wires.insert(i, GarbledWire::new());
        }

        let mut garbler = Garbler {
            input_wires: &input_wires,
            wires: HashMap::new(),
            garbled: HashMap::new(),
        };
        let out = garbler.garble_root(&circuit.out(), output_wire);

        GarbledCircuit::new(out, input_wires, n)
    }

    pub fn input_keys(&self) -> HashMap<usize, GarbledWire> {
        self.input_wires.clone()
    }

    pub fn out(&self) -> GarbledNode {
        self.out.clone()
    }

    pub fn n(&self) -> usize {
        self.n
    }
}

/// Garble several circuits that may share sub-expressions -- e.g. `m` decision-node
/// comparators all reading off the same selection network's output words -- under a
/// single `Garbler`, so the shared subgraph is garbled exactly once no matter how many
/// roots reference it, instead of once per root as repeated calls to
/// `GarbledCircuit::from_with_output` would do. Every returned circuit shares the same
/// `n`-wide input wire set.
pub fn garble_bundle(n: usize, roots: Vec<(Node, GarbledWire)>) -> (HashMap<usize, GarbledWire>, Vec<GarbledCircuit>) {
    let mut input_wires = HashMap::with_capacity(n);
    for i in 0..n {
        input_wires.insert(i, GarbledWire::new());
    }

    let mut garbler = Garbler {
        input_wires: &input_wires,
        wires: HashMap::new(),
        garbled: HashMap::new(),
    };

    let circuits = roots
        .into_iter()
        .map(|(root, out_wire)| {
            let out = garbler.garble_root(&root, out_wire);
            GarbledCircuit::new(out, input_wires.clone(), n)
        })
        .collect();

    (input_wires, circuits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::receiver_backend::GarbledCircuitRecv;
    use crate::circuit::Node;

    #[test]
    fn shared_subcircuit_garbles_without_blowup() {
        // A chain of 48 XOR levels where each level's gate is referenced by the next
        // two levels (mimicking a borrow chain) would be intractable without gate
        // memoization; this should garble near-instantly.
        let xor_gate = 0b0110u8;
        let mut chain = Rc::new(Node::Input(0));
        for i in 1..48 {
            let input = Rc::new(Node::Input(i % 2));
            chain = Rc::new(Node::Gate(xor_gate, chain.clone(), Rc::new(Node::Gate(xor_gate, chain, input))));
        }
        let circuit = Circuit::new((*chain).clone());
        let garbled = GarbledCircuit::from(circuit);
        assert!(garbled.n() >= 1);
    }

    #[test]
    fn free_xor_output_wire_flips_color_bit() {
        let and_gate = 0b1000u8;
        let circuit = Circuit::new(Node::gate(and_gate, Node::Input(0), Node::Input(1)));

        let off_key = [7u8; KEY_SIZE];
        let mut difference = [0u8; KEY_SIZE];
        difference[KEY_SIZE - 1] = 1;
        let output_wire = GarbledWire::with_difference(off_key, &difference);

        let garbled = GarbledCircuit::from_with_output(circuit, output_wire.clone());
        let input_keys = garbled.input_keys();
        let recv: GarbledCircuitRecv = garbled.into();

        let eval = |a: bool, b: bool| -> [u8; KEY_SIZE] {
            let ka = if a { input_keys[&0].on_key() } else { input_keys[&0].off_key() };
            let kb = if b { input_keys[&1].on_key() } else { input_keys[&1].off_key() };
            recv.eval(&vec![ka, kb])
        };

        let off_result = eval(false, false);
        let on_result = eval(true, true);

        assert_ne!(
            GarbledWire::color_bit(&off_result),
            GarbledWire::color_bit(&on_result)
        );
        assert_eq!(off_result, output_wire.off_key());
        assert_eq!(on_result, output_wire.on_key());
    }

    #[test]
    fn garble_bundle_shares_common_subexpression_across_roots() {
        let and_gate = 0b1000u8;
        let xor_gate = 0b0110u8;
        let shared = Rc::new(Node::Gate(and_gate, Rc::new(Node::Input(0)), Rc::new(Node::Input(1))));
        let root_a = Node::Gate(xor_gate, shared.clone(), Rc::new(Node::Input(2)));
        let root_b = Node::Gate(xor_gate, shared, Rc::new(Node::Input(3)));

        let (input_wires, circuits) = garble_bundle(
            4,
            vec![(root_a, GarbledWire::out_wire()), (root_b, GarbledWire::out_wire())],
        );
        assert_eq!(circuits.len(), 2);

        let recv_a: GarbledCircuitRecv = circuits[0].clone().into();
        let recv_b: GarbledCircuitRecv = circuits[1].clone().into();

        let key = |idx: usize, bit: bool| -> [u8; KEY_SIZE] {
            if bit {
                input_wires[&idx].on_key()
            } else {
                input_wires[&idx].off_key()
            }
        };

        // a=1, b=1 -> shared (a AND b) = 1; root_a = shared XOR in2, root_b = shared XOR in3
        let keys = vec![key(0, true), key(1, true), key(2, false), key(3, true)];
        assert_eq!(recv_a.eval(&keys), GarbledWire::out_wire().on_key());
        assert_eq!(recv_b.eval(&keys), GarbledWire::out_wire().off_key());
    }
}
