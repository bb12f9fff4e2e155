//! Combines the oblivious selection block with a per-decision-node threshold comparator
//! into one garbled-circuit bundle, for the `SelectionAlg::Gc` path (§4.3-4.5): instead
//! of the HE path's additive blind-then-subtract comparator (`gc::GarbledComparator`),
//! the client's raw feature bits are routed straight to each node's comparator gate by
//! the same mux-gated selection network `SelectionBlock::build_circuit` realizes, so the
//! routing itself never leaves plaintext form on either side.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::rc::Rc;

use crate::circuit::Node;
use crate::gc::gadgets::greater_than_const;
use crate::garbling::{garble_bundle, GarbledCircuit, GarbledWire, KEY_SIZE};

use super::block::SelectionBlock;
use super::gc::input_word;

/// `m` garbled `selected_feature > threshold` circuits sharing one garbled selection
/// network, plus the wire bookkeeping needed to deliver the client's feature bits (via
/// OT) and the server's routing control bits (directly).
pub struct GcSelectionCircuit {
    circuits: Vec<GarbledCircuit>,
    feature_input_wires: Vec<GarbledWire>,
    control_wires: Vec<GarbledWire>,
    /// `(k0, k1, pi)` per decision node, in the same order as `circuits()`.
    outputs: Vec<([u8; KEY_SIZE], [u8; KEY_SIZE], bool)>,
}

impl GcSelectionCircuit {
    /// Garble the selection-then-compare circuit for a block routing `u` feature words
    /// (each `n_bits` wide) into `thresholds.len()` decision-node slots. `difference` is
    /// the query-wide free-XOR difference shared across every node's output wire, as in
    /// `gc::GarbledComparator::garble`.
    pub fn garble(
        block: &SelectionBlock,
        u: usize,
        n_bits: usize,
        thresholds: &[u64],
        difference: &[u8; KEY_SIZE],
    ) -> Self {
        let switch_count = block.switch_count();
        let total_inputs = u * n_bits + switch_count;

        let feature_words: Vec<_> = (0..u).map(|i| input_word(i * n_bits, n_bits)).collect();
        let control_nodes: Vec<Rc<Node>> =
            (0..switch_count).map(|i| Rc::new(Node::Input(u * n_bits + i))).collect();
        let dummy = feature_words[0].clone();
        let selected = block.build_circuit(&feature_words, dummy, &control_nodes);
        assert_eq!(selected.len(), thresholds.len());

        let mut rng = ChaCha20Rng::from_entropy();
        let mut roots = Vec::with_capacity(thresholds.len());
        let mut outputs = Vec::with_capacity(thresholds.len());
        for (word, &threshold) in selected.iter().zip(thresholds) {
            let out_node = greater_than_const(word, threshold);

            let mut off_key = [0u8; KEY_SIZE];
            rng.fill(&mut off_key);
            let out_wire = GarbledWire::with_difference(off_key, difference);
            let k0 = out_wire.off_key();
            let k1 = out_wire.on_key();
            let pi = GarbledWire::color_bit(&k0);
            outputs.push((k0, k1, pi));
            roots.push(((*out_node).clone(), out_wire));
        }

        let (input_wires, circuits) = garble_bundle(total_inputs, roots);

        let feature_input_wires = (0..u * n_bits).map(|i| input_wires[&i].clone()).collect();
        let control_wires =
            (0..switch_count).map(|i| input_wires[&(u * n_bits + i)].clone()).collect();

        GcSelectionCircuit { circuits, feature_input_wires, control_wires, outputs }
    }

    /// The `m` per-decision-node comparator circuits, sharing the selection network's
    /// garbled gates under the hood but each independently evaluable.
    pub fn circuits(&self) -> &[GarbledCircuit] {
        &self.circuits
    }

    /// Wires `0..u*n_bits`: the client's own feature bits, unknown to the server.
    /// Delivered via oblivious transfer, word-major then bit-minor (word `i`, bit `j` is
    /// index `i * n_bits + j`).
    pub fn feature_input_wires(&self) -> &[GarbledWire] {
        &self.feature_input_wires
    }

    /// The selection network's routing control wires, in `SelectionBlock::control_bits`
    /// order. Sent directly -- the server already knows its own routing decision.
    pub fn control_wires(&self) -> &[GarbledWire] {
        &self.control_wires
    }

    /// `(k0, k1, pi)` per decision node, in `circuits()` order.
    pub fn output_keys(&self) -> &[([u8; KEY_SIZE], [u8; KEY_SIZE], bool)] {
        &self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::receiver_backend::GarbledCircuitRecv;

    #[test]
    fn gc_selection_circuit_matches_plaintext_select_then_compare() {
        let target = vec![1usize, 0];
        let block = SelectionBlock::program(2, &target).unwrap();
        let n_bits = 6usize;
        let thresholds = vec![10u64, 40u64];
        let mut difference = [0u8; KEY_SIZE];
        difference[KEY_SIZE - 1] = 1;

        let bundle = GcSelectionCircuit::garble(&block, 2, n_bits, &thresholds, &difference);
        assert_eq!(bundle.circuits().len(), 2);

        let features = vec![5u64, 50u64];
        let selected: Vec<u64> = target.iter().map(|&t| features[t]).collect();
        let expected: Vec<bool> =
            selected.iter().zip(&thresholds).map(|(&v, &t)| v > t).collect();

        let feature_keys: Vec<[u8; KEY_SIZE]> = (0..2 * n_bits)
            .map(|i| {
                let feature_idx = i / n_bits;
                let bit = i % n_bits;
                let bit_val = (features[feature_idx] >> bit) & 1 == 1;
                let wire = &bundle.feature_input_wires()[i];
                if bit_val { wire.on_key() } else { wire.off_key() }
            })
            .collect();

        let control_keys: Vec<[u8; KEY_SIZE]> = block
            .control_bits()
            .iter()
            .enumerate()
            .map(|(i, &b)| {
                let wire = &bundle.control_wires()[i];
                if b { wire.on_key() } else { wire.off_key() }
            })
            .collect();

        let mut all_keys = feature_keys;
        all_keys.extend(control_keys);

        for (idx, circuit) in bundle.circuits().iter().enumerate() {
            let recv: GarbledCircuitRecv = circuit.clone().into();
            let out_key = recv.eval(&all_keys);
            let (_, _, pi) = bundle.output_keys()[idx];
            let result = GarbledWire::color_bit(&out_key) ^ pi;
            assert_eq!(result, expected[idx]);
        }
    }
}
