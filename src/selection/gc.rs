//! Shared bit-vector ("word") gate helpers for building the oblivious
//! selection network as an actual garbled boolean circuit (the `SelectionAlg::Gc`
//! path, §4.3-4.5) rather than as plaintext routing (used by the HE path's
//! reference/test code in [`super::waksman`] and [`super::block`]).
//!
//! A `Word` is a feature value bit-sliced into `Node` wires, LSB first. Every
//! conditional swap in the permutation network becomes a per-bit multiplexer
//! gated by a *wire*, not a baked-in boolean -- the server knows the swap's
//! true/false value (it is the server's own secret routing decision) and
//! delivers it as a direct garbler input (see
//! `backend::garbler_backend::send_direct_input_keys`), but the circuit
//! topology itself must not vary with the permutation or it would leak it to
//! the party holding the wire labels.

use std::rc::Rc;

use crate::circuit::Node;

pub type Word = Vec<Rc<Node>>;

const AND_GATE: u8 = 0b1000;
const OR_GATE: u8 = 0b1110;
const NOT_GATE: u8 = 0b0011;

fn gate(op: u8, l: &Rc<Node>, r: &Rc<Node>) -> Rc<Node> {
    Rc::new(Node::Gate(op, l.clone(), r.clone()))
}

fn not(a: &Rc<Node>) -> Rc<Node> {
    gate(NOT_GATE, a, a)
}

fn and(a: &Rc<Node>, b: &Rc<Node>) -> Rc<Node> {
    gate(AND_GATE, a, b)
}

fn or(a: &Rc<Node>, b: &Rc<Node>) -> Rc<Node> {
    gate(OR_GATE, a, b)
}

/// `sel ? a : b`, one gate-triple per bit: `(sel & a) | (!sel & b)`.
pub fn mux_bit(sel: &Rc<Node>, a: &Rc<Node>, b: &Rc<Node>) -> Rc<Node> {
    or(&and(sel, a), &and(&not(sel), b))
}

pub fn mux_word(sel: &Rc<Node>, a: &Word, b: &Word) -> Word {
    a.iter().zip(b.iter()).map(|(x, y)| mux_bit(sel, x, y)).collect()
}

/// Build the `n` `Input` wires (bits `start..start+n`, LSB first) for one word.
pub fn input_word(start: usize, n: usize) -> Word {
    (0..n).map(|i| Rc::new(Node::Input(start + i))).collect()
}
