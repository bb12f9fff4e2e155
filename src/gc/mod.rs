//! Per-decision-node garbled comparator: `(blinded_feature - mask) > threshold`, garbled
//! with a free-XOR-related output wire so the client learns only a color bit it must XOR
//! with a server-supplied permutation bit `pi` to recover the true comparison result.

pub mod gadgets;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::backend::receiver_backend::GarbledCircuitRecv;
use crate::garbling::{GarbledCircuit, GarbledWire, KEY_SIZE};

/// A garbled `(blinded - mask) > threshold` circuit, plus the bookkeeping the server needs
/// to deliver its own (mask) keys directly and the client's (blinded feature) keys via OT.
pub struct GarbledComparator {
    circuit: GarbledCircuit,
    blinded_input_wires: Vec<GarbledWire>,
    mask_wires: Vec<GarbledWire>,
    k0: [u8; KEY_SIZE],
    k1: [u8; KEY_SIZE],
    pi: bool,
}

impl GarbledComparator {
    /// Garble the comparator for an `n`-bit feature domain and a given `threshold`.
    /// `difference` is the query-wide free-XOR difference (must have its lsb set) shared
    /// across every decision node's output wire in the query, so the client only needs the
    /// per-node permutation bit `pi` (not a fresh difference) to decode its result.
    pub fn garble(n: usize, threshold: u64, difference: &[u8; KEY_SIZE]) -> Self {
        let circuit = gadgets::build_decision_circuit(n, threshold);

        let mut rng = ChaCha20Rng::from_entropy();
        let mut off_key = [0u8; KEY_SIZE];
        rng.fill(&mut off_key);
        let output_wire = GarbledWire::with_difference(off_key, difference);
        let k0 = output_wire.off_key();
        let k1 = output_wire.on_key();
        let pi = GarbledWire::color_bit(&k0);

        let garbled = GarbledCircuit::from_with_output(circuit, output_wire);
        let input_keys = garbled.input_keys();

        let blinded_input_wires = (0..n).map(|i| input_keys[&i].clone()).collect();
        let mask_wires = (0..n).map(|i| input_keys[&(n + i)].clone()).collect();

        GarbledComparator {
            circuit: garbled,
            blinded_input_wires,
            mask_wires,
            k0,
            k1,
            pi,
        }
    }

    /// Wires `0..n`: the client's own blinded-feature bits, unknown to the server. Delivered
    /// via oblivious transfer -- index `i`'s `(off_key, on_key)` are the OT sender's two
    /// messages for bit `i`.
    pub fn blinded_input_wires(&self) -> &[GarbledWire] {
        &self.blinded_input_wires
    }

    /// Wires `n..2n`: the server's own mask bits, sent directly (the server already knows
    /// its own input, so revealing the one matching key leaks nothing -- see
    /// `backend::garbler_backend::send_direct_input_keys`).
    pub fn mask_wires(&self) -> &[GarbledWire] {
        &self.mask_wires
    }

    pub fn mask_bits(&self, mask: u64) -> Vec<bool> {
        let n = self.mask_wires.len();
        (0..n).map(|i| (mask >> i) & 1 == 1).collect()
    }

    pub fn circuit(&self) -> GarbledCircuit {
        self.circuit.clone()
    }

    /// `(K0, K1)` in `(false, true)` order -- the two possible output keys.
    pub fn output_keys(&self) -> ([u8; KEY_SIZE], [u8; KEY_SIZE]) {
        (self.k0, self.k1)
    }

    /// `pi = lsb(K0)`. The client recovers the true result as `color_bit(observed) ^ pi`.
    pub fn permutation_bit(&self) -> bool {
        self.pi
    }
}

/// Evaluate a received comparator circuit given the client's own blinded-feature keys
/// (obtained via OT) and the server's directly-sent mask keys, recovering the true
/// `diff > threshold` bit via the node's permutation bit.
pub fn evaluate_comparator(
    recv: &GarbledCircuitRecv,
    blinded_keys: Vec<[u8; KEY_SIZE]>,
    mask_keys: Vec<[u8; KEY_SIZE]>,
    pi: bool,
) -> bool {
    let mut inputs = blinded_keys;
    inputs.extend(mask_keys);
    let out_key = recv.eval(&inputs);
    GarbledWire::color_bit(&out_key) ^ pi
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_for(wire: &GarbledWire, bit: bool) -> [u8; KEY_SIZE] {
        if bit { wire.on_key() } else { wire.off_key() }
    }

    #[test]
    fn comparator_round_trip_true_and_false() {
        let n = 8;
        let threshold = 50u64;
        let mut difference = [0u8; KEY_SIZE];
        difference[KEY_SIZE - 1] = 1;

        let comparator = GarbledComparator::garble(n, threshold, &difference);
        let pi = comparator.permutation_bit();
        let recv: GarbledCircuitRecv = comparator.circuit().into();

        let eval_for = |feature: u64, mask: u64| -> bool {
            let blinded = (feature + mask) % (1u64 << n);
            let blinded_keys: Vec<[u8; KEY_SIZE]> = (0..n)
                .map(|i| key_for(&comparator.blinded_input_wires()[i], (blinded >> i) & 1 == 1))
                .collect();
            let mask_keys: Vec<[u8; KEY_SIZE]> = (0..n)
                .map(|i| key_for(&comparator.mask_wires()[i], (mask >> i) & 1 == 1))
                .collect();
            evaluate_comparator(&recv, blinded_keys, mask_keys, pi)
        };

        assert!(eval_for(70, 10));
        assert!(!eval_for(30, 10));
        assert!(!eval_for(50, 0));
    }

    #[test]
    fn output_keys_match_observed_color_bits() {
        let n = 4;
        let mut difference = [0u8; KEY_SIZE];
        difference[KEY_SIZE - 1] = 1;
        let comparator = GarbledComparator::garble(n, 3, &difference);
        let (k0, k1) = comparator.output_keys();
        assert_ne!(GarbledWire::color_bit(&k0), GarbledWire::color_bit(&k1));
        assert_eq!(GarbledWire::color_bit(&k0), comparator.permutation_bit());
    }
}
