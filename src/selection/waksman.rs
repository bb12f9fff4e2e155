//! A recursive conditional-swap permutation network in the Waksman/Beneš style.
//!
//! `Network` realizes an arbitrary bijection on `{0, ..., n-1}` via `O(n log n)`
//! 2-input conditional swaps, programmed once via the classical cycle-following
//! ("looping") algorithm and then replayed structurally by `route` over any
//! `Clone`-able payload. Non-square `u -> v` shapes (the extended and truncated
//! selection-block variants) are realized by padding the smaller side with
//! don't-care slots up to `max(u, v)`, routing through a square bijection, and
//! discarding the padding on the side that doesn't matter -- a simplification
//! of the paper's dedicated odd/truncated boundary-case arithmetic that keeps
//! this engine to a single, fully general recursive construction.

use std::rc::Rc;

use crate::circuit::Node;
use crate::error::PdteError;

use super::gc::{mux_word, Word};

/// A programmed permutation network over `n` wires.
#[derive(Debug, Clone)]
pub enum Network {
    /// `n == 0` or `n == 1`: nothing to route.
    Trivial(usize),
    /// `n` was odd when this node was programmed; `inner` was built for `n + 1`
    /// wires with one dummy slot appended (mapped to itself).
    Padded { n: usize, inner: Box<Network> },
    /// `n` is even, split into two `n/2`-wire sub-networks.
    Recursive {
        half: usize,
        in_switches: Vec<bool>,
        out_switches: Vec<bool>,
        top: Box<Network>,
        bottom: Box<Network>,
    },
}

/// Program the switches realizing `perm` (`output[i] = input[perm[i]]`, `perm` a
/// bijection on `0..perm.len()`) via cycle-following over the bipartite "input
/// pairs vs. output pairs" graph induced by `perm`.
fn program_bijection(perm: &[usize]) -> (Vec<bool>, Vec<bool>, Vec<usize>, Vec<usize>) {
    let n = perm.len();
    debug_assert!(n % 2 == 0 && n > 0);
    let half = n / 2;

    let mut inv = vec![0usize; n];
    for (i, &x) in perm.iter().enumerate() {
        inv[x] = i;
    }

    let mut in_switch = vec![false; half];
    let mut out_switch = vec![false; half];
    let mut visited_pair = vec![false; half];
    let mut top_perm = vec![usize::MAX; half];
    let mut bottom_perm = vec![usize::MAX; half];

    for start_p in 0..half {
        if visited_pair[start_p] {
            continue;
        }
        let start_state = (start_p, 2 * start_p, true);
        let mut state = start_state;
        loop {
            let (p, phys_in, route_to_top) = state;
            let even_in = phys_in % 2 == 0;
            in_switch[p] = even_in != route_to_top;
            visited_pair[p] = true;

            let phys_out = inv[phys_in];
            let q = phys_out / 2;
            let even_out = phys_out % 2 == 0;
            out_switch[q] = even_out != route_to_top;
            if route_to_top {
                top_perm[q] = p;
            } else {
                bottom_perm[q] = p;
            }

            let partner_phys_out = phys_out ^ 1;
            let partner_phys_in = perm[partner_phys_out];
            let next_p = partner_phys_in / 2;
            let next_route_to_top = !route_to_top;
            let next_state = (next_p, partner_phys_in, next_route_to_top);

            if next_state == start_state {
                break;
            }
            state = next_state;
        }
    }

    (in_switch, out_switch, top_perm, bottom_perm)
}

impl Network {
    /// Program a network realizing the bijection `perm` on `0..perm.len()`.
    pub fn program(perm: &[usize]) -> Network {
        let n = perm.len();
        if n <= 1 {
            return Network::Trivial(n);
        }
        if n % 2 == 1 {
            let mut padded_perm = perm.to_vec();
            padded_perm.push(n);
            return Network::Padded {
                n,
                inner: Box::new(Network::program_even(&padded_perm)),
            };
        }
        Network::program_even(perm)
    }

    fn program_even(perm: &[usize]) -> Network {
        let (in_switches, out_switches, top_perm, bottom_perm) = program_bijection(perm);
        Network::Recursive {
            half: perm.len() / 2,
            in_switches,
            out_switches,
            top: Box::new(Network::program(&top_perm)),
            bottom: Box::new(Network::program(&bottom_perm)),
        }
    }

    /// Route `inputs` (length matching this network's designed size) through
    /// the programmed switches, returning the permuted outputs.
    pub fn route<T: Clone>(&self, inputs: &[T]) -> Vec<T> {
        match self {
            Network::Trivial(_) => inputs.to_vec(),
            Network::Padded { n, inner } => {
                let mut padded = inputs.to_vec();
                padded.push(inputs[0].clone());
                let mut out = inner.route(&padded);
                out.truncate(*n);
                out
            }
            Network::Recursive { half, in_switches, out_switches, top, bottom } => {
                let mut top_in = Vec::with_capacity(*half);
                let mut bottom_in = Vec::with_capacity(*half);
                for p in 0..*half {
                    let (a, b) = (inputs[2 * p].clone(), inputs[2 * p + 1].clone());
                    if in_switches[p] {
                        top_in.push(b);
                        bottom_in.push(a);
                    } else {
                        top_in.push(a);
                        bottom_in.push(b);
                    }
                }
                let top_out = top.route(&top_in);
                let bottom_out = bottom.route(&bottom_in);

                let mut outputs: Vec<Option<T>> = vec![None; 2 * half];
                for q in 0..*half {
                    if out_switches[q] {
                        outputs[2 * q] = Some(bottom_out[q].clone());
                        outputs[2 * q + 1] = Some(top_out[q].clone());
                    } else {
                        outputs[2 * q] = Some(top_out[q].clone());
                        outputs[2 * q + 1] = Some(bottom_out[q].clone());
                    }
                }
                outputs.into_iter().map(|x| x.unwrap()).collect()
            }
        }
    }

    /// Number of conditional-swap control bits this network consumes -- the
    /// size of the flat control-wire slice `build_circuit` expects.
    pub fn switch_count(&self) -> usize {
        match self {
            Network::Trivial(_) => 0,
            Network::Padded { inner, .. } => inner.switch_count(),
            Network::Recursive { half, top, bottom, .. } => {
                2 * half + top.switch_count() + bottom.switch_count()
            }
        }
    }

    /// Flatten this network's programmed switch values in the same traversal
    /// order `build_circuit` consumes control wires: in-switches, then the
    /// top sub-network's switches, then the bottom's, then out-switches.
    /// Used by the server, which knows the concrete permutation, to compute
    /// the plaintext bit values it hands to `build_circuit`'s control wires
    /// as direct garbler inputs.
    pub fn flatten_switches(&self) -> Vec<bool> {
        match self {
            Network::Trivial(_) => Vec::new(),
            Network::Padded { inner, .. } => inner.flatten_switches(),
            Network::Recursive { in_switches, out_switches, top, bottom, .. } => {
                let mut out = in_switches.clone();
                out.extend(top.flatten_switches());
                out.extend(bottom.flatten_switches());
                out.extend(out_switches.clone());
                out
            }
        }
    }

    /// Build the garbled-circuit equivalent of `route`: every conditional
    /// swap becomes a per-bit multiplexer gated by a wire from `controls`
    /// rather than a value baked into the circuit's shape, so the topology
    /// sent to the evaluator is identical regardless of which permutation
    /// the server programmed. `controls` must have exactly `switch_count()`
    /// wires, consumed in the same order `flatten_switches` reports values in.
    pub fn build_circuit(&self, inputs: &[Word], controls: &[Rc<Node>]) -> Vec<Word> {
        let mut used = 0;
        let out = self.build_circuit_inner(inputs, controls, &mut used);
        debug_assert_eq!(used, controls.len());
        out
    }

    fn build_circuit_inner(&self, inputs: &[Word], controls: &[Rc<Node>], used: &mut usize) -> Vec<Word> {
        match self {
            Network::Trivial(_) => inputs.to_vec(),
            Network::Padded { n, inner } => {
                let mut padded = inputs.to_vec();
                padded.push(inputs[0].clone());
                let mut out = inner.build_circuit_inner(&padded, controls, used);
                out.truncate(*n);
                out
            }
            Network::Recursive { half, top, bottom, .. } => {
                let in_switches = &controls[*used..*used + *half];
                *used += *half;

                let mut top_in = Vec::with_capacity(*half);
                let mut bottom_in = Vec::with_capacity(*half);
                for p in 0..*half {
                    let (a, b) = (&inputs[2 * p], &inputs[2 * p + 1]);
                    let sel = &in_switches[p];
                    top_in.push(mux_word(sel, b, a));
                    bottom_in.push(mux_word(sel, a, b));
                }

                let top_out = top.build_circuit_inner(&top_in, controls, used);
                let bottom_out = bottom.build_circuit_inner(&bottom_in, controls, used);

                let out_switches = &controls[*used..*used + *half];
                *used += *half;

                let mut outputs = vec![Word::new(); 2 * half];
                for q in 0..*half {
                    let sel = &out_switches[q];
                    outputs[2 * q] = mux_word(sel, &bottom_out[q], &top_out[q]);
                    outputs[2 * q + 1] = mux_word(sel, &top_out[q], &bottom_out[q]);
                }
                outputs
            }
        }
    }
}

/// A programmed routing network from `u` input wires to `v` output positions.
#[derive(Debug, Clone)]
pub struct PermutationNetwork {
    u: usize,
    v: usize,
    network: Network,
}

impl PermutationNetwork {
    /// Program a routing network where `target[i] = Some(input_index)` pins output
    /// `i` to a specific input and `target[i] = None` leaves it a "don't care" (filled
    /// with an unused input index, whose value is never meaningfully consumed --
    /// used by the selection block's duplicator stage to carry pass-through slots).
    /// The `Some` entries must be injective (no two outputs pinned to the same input).
    pub fn program(u: usize, v: usize, target: &[Option<usize>]) -> Result<Self, PdteError> {
        if target.len() != v {
            return Err(PdteError::Invariant(format!(
                "permutation target length {} does not match v={v}",
                target.len()
            )));
        }

        let size = u.max(v);
        let mut used = vec![false; size];
        let mut perm: Vec<Option<usize>> = vec![None; size];

        for (i, entry) in target.iter().enumerate() {
            if let Some(t) = *entry {
                if t >= u {
                    return Err(PdteError::Invariant(format!(
                        "selection index {t} out of range for {u} inputs"
                    )));
                }
                if used[t] {
                    return Err(PdteError::Invariant(format!(
                        "input {t} targeted by more than one output in a permutation network"
                    )));
                }
                used[t] = true;
                perm[i] = Some(t);
            }
        }

        let mut leftover = (0..size).filter(|&x| !used[x]);
        for slot in perm.iter_mut() {
            if slot.is_none() {
                *slot = Some(leftover.next().ok_or_else(|| {
                    PdteError::Invariant("ran out of padding inputs while programming permutation network".into())
                })?);
            }
        }

        let perm: Vec<usize> = perm.into_iter().map(|x| x.unwrap()).collect();
        Ok(PermutationNetwork { u, v, network: Network::program(&perm) })
    }

    /// Route `inputs` (length `u`) through the network, returning `v` outputs with
    /// `output[i] == inputs[target[i]]` for every pinned slot. `dummy` fills the
    /// padding input wires when `v > u` -- its value is never observed meaningfully.
    pub fn route<T: Clone>(&self, inputs: &[T], dummy: T) -> Vec<T> {
        let size = self.u.max(self.v);
        let mut padded = inputs.to_vec();
        padded.resize(size, dummy);
        let mut out = self.network.route(&padded);
        out.truncate(self.v);
        out
    }

    pub fn switch_count(&self) -> usize {
        self.network.switch_count()
    }

    pub fn control_bits(&self) -> Vec<bool> {
        self.network.flatten_switches()
    }

    /// Garbled-circuit equivalent of `route`: `controls` must have exactly
    /// `switch_count()` wires.
    pub fn build_circuit(&self, inputs: &[Word], dummy: Word, controls: &[Rc<Node>]) -> Vec<Word> {
        let size = self.u.max(self.v);
        let mut padded = inputs.to_vec();
        padded.resize(size, dummy);
        let mut out = self.network.build_circuit(&padded, controls);
        out.truncate(self.v);
        out
    }
}

/// Convenience wrapper for a true bijection (same entry used by `PermutationNetwork`
/// internally, exposed directly for permutation-only callers).
pub fn program_bijective(perm: &[usize]) -> Network {
    Network::program(perm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_perm(perm: &[usize]) -> Vec<usize> {
        let net = Network::program(perm);
        net.route(&(0..perm.len()).collect::<Vec<_>>())
    }

    #[test]
    fn identity_and_swap_size_two() {
        assert_eq!(route_perm(&[0, 1]), vec![0, 1]);
        assert_eq!(route_perm(&[1, 0]), vec![1, 0]);
    }

    #[test]
    fn arbitrary_permutations_up_to_sixteen() {
        // A handful of fixed permutations across sizes, including odd ones.
        let cases: Vec<Vec<usize>> = vec![
            vec![0, 1, 2],
            vec![2, 0, 1],
            vec![3, 1, 0, 2],
            vec![0, 2, 4, 1, 3],
            vec![7, 6, 5, 4, 3, 2, 1, 0],
            vec![4, 0, 6, 2, 1, 5, 3, 7, 8, 9, 10, 11, 12, 13, 14, 15],
        ];
        for perm in cases {
            let expected: Vec<usize> = perm.clone();
            assert_eq!(route_perm(&perm), expected, "perm {perm:?}");
        }
    }

    #[test]
    fn random_permutations_round_trip() {
        use rand::seq::SliceRandom;
        let mut rng = rand::thread_rng();
        for n in 1..=16usize {
            let mut perm: Vec<usize> = (0..n).collect();
            perm.shuffle(&mut rng);
            assert_eq!(route_perm(&perm), perm, "n={n} perm={perm:?}");
        }
    }

    #[test]
    fn extended_injective_network_routes_u_to_v() {
        // u=4 inputs, v=6 outputs; only positions 0,2,4 are pinned (injective subset),
        // the rest are don't-cares.
        let target = vec![Some(0), None, Some(2), None, Some(1), None];
        let net = PermutationNetwork::program(4, 6, &target).unwrap();
        let inputs = vec![10u64, 20, 30, 40];
        let out = net.route(&inputs, 0);
        assert_eq!(out[0], 10);
        assert_eq!(out[2], 30);
        assert_eq!(out[4], 20);
    }

    #[test]
    fn truncated_injective_network_selects_subset() {
        // u=8 inputs, v=3 outputs selecting indices 7, 7 is invalid (dup) so use distinct.
        let target = vec![Some(7), Some(0), Some(3)];
        let net = PermutationNetwork::program(8, 3, &target).unwrap();
        let inputs: Vec<u64> = (0..8).collect();
        let out = net.route(&inputs, 0);
        assert_eq!(out, vec![7, 0, 3]);
    }

    #[test]
    fn duplicate_target_is_rejected() {
        let target = vec![Some(0), Some(0)];
        assert!(PermutationNetwork::program(2, 2, &target).is_err());
    }
}
