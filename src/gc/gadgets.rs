//! Boolean-gate building blocks for the decision-node comparator circuit:
//! a ripple-borrow subtractor feeding a bitwise magnitude comparator against
//! a compile-time threshold constant. Mirrors the shape of the teacher's
//! own `construct_circuit` (a bitwise `>` comparator over two equal-width
//! inputs), generalized to first undo the additive blinding and to fold the
//! (privately known, not wire-carried) threshold in as constants rather
//! than extra input wires.

use std::rc::Rc;

use crate::circuit::{Circuit, Node};

type NodeRc = Rc<Node>;

const AND_GATE: u8 = 0b1000;
const OR_GATE: u8 = 0b1110;
const XOR_GATE: u8 = 0b0110;
/// Depends only on the (duplicated) left input: row0 (x=0) -> 1, row3 (x=1) -> 0.
const NOT_GATE: u8 = 0b0011;
const CONST_TRUE_GATE: u8 = 0b1111;
const CONST_FALSE_GATE: u8 = 0b0000;

fn gate(op: u8, left: &NodeRc, right: &NodeRc) -> NodeRc {
    Rc::new(Node::Gate(op, left.clone(), right.clone()))
}

fn not(x: &NodeRc) -> NodeRc {
    gate(NOT_GATE, x, x)
}

fn and(a: &NodeRc, b: &NodeRc) -> NodeRc {
    gate(AND_GATE, a, b)
}

fn or(a: &NodeRc, b: &NodeRc) -> NodeRc {
    gate(OR_GATE, a, b)
}

fn xor(a: &NodeRc, b: &NodeRc) -> NodeRc {
    gate(XOR_GATE, a, b)
}

fn const_true(basis: &NodeRc) -> NodeRc {
    gate(CONST_TRUE_GATE, basis, basis)
}

fn const_false(basis: &NodeRc) -> NodeRc {
    gate(CONST_FALSE_GATE, basis, basis)
}

pub fn input_bits(start: usize, n: usize) -> Vec<NodeRc> {
    (0..n).map(|i| Rc::new(Node::Input(start + i))).collect()
}

/// `diff = a - b (mod 2^n)`, bits ordered LSB-first. Each level's borrow-out is read by
/// both this level's diff bit and the next level's borrow computation, so the node DAG
/// has real sharing -- the garbler's gate-memoization (see `garbling.rs`) is what keeps
/// garbling this linear in `n` rather than exponential.
pub fn subtract(a: &[NodeRc], b: &[NodeRc]) -> Vec<NodeRc> {
    assert_eq!(a.len(), b.len());
    let n = a.len();
    let mut diff = Vec::with_capacity(n);
    let mut borrow: Option<NodeRc> = None;

    for i in 0..n {
        let not_a = not(&a[i]);
        let (d, borrow_out) = match &borrow {
            None => (xor(&a[i], &b[i]), and(&not_a, &b[i])),
            Some(bin) => {
                let d = xor(&xor(&a[i], &b[i]), bin);
                let term1 = and(&not_a, &b[i]);
                let a_or_b = or(&not_a, &b[i]);
                let term2 = and(bin, &a_or_b);
                (d, or(&term1, &term2))
            }
        };
        diff.push(d);
        borrow = Some(borrow_out);
    }

    diff
}

/// `diff > threshold`, reading `diff`'s bits from the most-significant bit down while
/// threading an "equal so far" / "greater so far" pair of accumulators. `threshold` is a
/// plaintext constant known at circuit-build time (the decision node's private threshold),
/// so it shapes which gates get built rather than adding extra wires for it.
pub fn greater_than_const(diff: &[NodeRc], threshold: u64) -> NodeRc {
    let n = diff.len();
    assert!(n > 0 && n <= 64);
    let basis = diff[n - 1].clone();
    let mut gt = const_false(&basis);
    let mut eq = const_true(&basis);

    for i in (0..n).rev() {
        let d = &diff[i];
        let t_bit = (threshold >> i) & 1 == 1;

        if t_bit {
            eq = and(&eq, d);
        } else {
            let new_gt = or(&gt, &and(&eq, d));
            eq = and(&eq, &not(d));
            gt = new_gt;
        }
    }

    gt
}

/// Build the full per-decision-node comparator: input wires `0..n` carry the client's
/// blinded feature (`blinded`), wires `n..2n` carry the server's mask (`mask`); the
/// circuit computes `(blinded - mask) > threshold`, recovering the true feature value
/// from its additive blinding before comparing it.
pub fn build_decision_circuit(n: usize, threshold: u64) -> Circuit {
    let blinded = input_bits(0, n);
    let mask = input_bits(n, n);
    let diff = subtract(&blinded, &mask);
    let out = greater_than_const(&diff, threshold);
    Circuit::new((*out).clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_decision(n: usize, threshold: u64, blinded: u64, mask: u64) -> bool {
        let circuit = build_decision_circuit(n, threshold);
        let mut inputs = vec![false; 2 * n];
        for i in 0..n {
            inputs[i] = (blinded >> i) & 1 == 1;
            inputs[n + i] = (mask >> i) & 1 == 1;
        }
        circuit.eval(&inputs)
    }

    #[test]
    fn recovers_feature_and_compares_with_wraparound() {
        // feature = 5, mask = 10 => blinded = 15 (mod 2^8), no wraparound, diff = 5
        assert!(!eval_decision(8, 10, 15, 10));
        assert!(eval_decision(8, 4, 15, 10));

        // feature = 200, mask = 250, blinded = 450 mod 256 = 194 -- wraps around
        let blinded = (200u64 + 250) % 256;
        assert!(eval_decision(8, 199, blinded, 250));
        assert!(!eval_decision(8, 200, blinded, 250));
    }

    #[test]
    fn matches_plain_u64_comparison_across_random_cases() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let n = 16usize;
        let mask_mod = 1u64 << n;

        for _ in 0..200 {
            let feature: u64 = rng.gen_range(0..mask_mod);
            let mask: u64 = rng.gen_range(0..mask_mod);
            let threshold: u64 = rng.gen_range(0..mask_mod);
            let blinded = (feature + mask) % mask_mod;

            let expected = feature > threshold;
            assert_eq!(eval_decision(n, threshold, blinded, mask), expected);
        }
    }

    #[test]
    fn boundary_equal_to_threshold_is_not_greater() {
        assert!(!eval_decision(8, 50, 60, 10));
    }
}
