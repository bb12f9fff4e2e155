//! The selection block: routes `u` server-held feature wires into `m` per-node slots
//! according to a (possibly non-injective) map `target: 0..m -> 0..u`, in three stages:
//!
//! 1. `P1` (`u -> m`): places the first occurrence of each distinct source value at
//!    the start of that source's contiguous run in a "staging order"; any remaining
//!    slot (only possible when `m > u`) is a don't-care, filled in by the duplicator.
//! 2. The duplicator: `m - 1` conditional pass/take gates that fan each source value
//!    out across the rest of its run by copying the preceding slot.
//! 3. `P2` (`m -> m`): a full permutation shuffling staging order into final order.
//!
//! This single pipeline handles both the "extended" (`m >= u`) and "truncated"
//! (`m < u`) shapes uniformly: a truncated block can still repeat a source (e.g.
//! selecting feature `7` twice out of `u=8` features into `m=3` slots), so the
//! duplicator isn't gated on `m` vs. `u`, only on whether a source actually repeats.

use std::rc::Rc;

use crate::circuit::Node;
use crate::error::PdteError;

use super::gc::{mux_word, Word};
use super::waksman::PermutationNetwork;

/// The `m - 1` conditional-copy gates following `P1` in the extended selection block.
#[derive(Debug, Clone)]
pub struct Duplicator {
    /// `program[i]` (for staging slot `i + 1`) is `true` if that slot passes through
    /// (copies its predecessor) rather than keeping the value `P1` placed there.
    program: Vec<bool>,
}

impl Duplicator {
    /// Program the duplicator from `staging_source[i]` = the source index feeding
    /// staging slot `i`, with same-source slots grouped contiguously.
    fn program(staging_source: &[usize]) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut program = Vec::with_capacity(staging_source.len().saturating_sub(1));
        for (i, &s) in staging_source.iter().enumerate() {
            let is_first = seen.insert(s);
            if i > 0 {
                program.push(!is_first);
            }
        }
        Duplicator { program }
    }

    fn apply<T: Clone>(&self, p1_output: &[T]) -> Vec<T> {
        let mut out = p1_output.to_vec();
        for i in 1..out.len() {
            if self.program[i - 1] {
                out[i] = out[i - 1].clone();
            }
        }
        out
    }

    /// Number of conditional pass/take gates, one per caller-supplied control wire.
    fn switch_count(&self) -> usize {
        self.program.len()
    }

    fn control_bits(&self) -> Vec<bool> {
        self.program.clone()
    }

    /// Garbled-circuit equivalent of `apply`: slot `i`'s output is `controls[i-1] ?
    /// (pass: copy slot i-1's output) : (take: keep P1's own output at slot i)`,
    /// chained left to right so a run of passes all trace back to the same take.
    fn build_circuit(&self, p1_output: &[Word], controls: &[Rc<Node>]) -> Vec<Word> {
        let mut out = Vec::with_capacity(p1_output.len());
        out.push(p1_output[0].clone());
        for i in 1..p1_output.len() {
            let sel = &controls[i - 1];
            out.push(mux_word(sel, &out[i - 1], &p1_output[i]));
        }
        out
    }
}

/// A programmed selection block realizing `output[i] == inputs[target[i]]` for every
/// `i` in `0..m`, `target` drawn from `0..u` with repeats allowed regardless of how
/// `m` compares to `u` -- a repeated source is fanned out by the duplicator whether
/// the block as a whole is extending (`m >= u`) or truncating (`m < u`) the feature
/// set, as in scenario with `u=8`, `m=3`, repeated source `7`.
pub struct SelectionBlock {
    p1: PermutationNetwork,
    duplicator: Duplicator,
    p2: PermutationNetwork,
}

impl SelectionBlock {
    pub fn program(u: usize, target: &[usize]) -> Result<Self, PdteError> {
        for &t in target {
            if t >= u {
                return Err(PdteError::Invariant(format!(
                    "selection target index {t} out of range for {u} inputs"
                )));
            }
        }
        if u == 0 {
            return Err(PdteError::Invariant("selection block requires at least one input".into()));
        }

        let m = target.len();
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); u];
        for (i, &s) in target.iter().enumerate() {
            groups[s].push(i);
        }

        let mut staging_source = Vec::with_capacity(m);
        let mut staging_final_positions = Vec::with_capacity(m);
        for (s, occurrences) in groups.iter().enumerate() {
            for &final_pos in occurrences {
                staging_source.push(s);
                staging_final_positions.push(final_pos);
            }
        }

        let mut p1_target: Vec<Option<usize>> = vec![None; m];
        let mut k = 0usize;
        for (s, occurrences) in groups.iter().enumerate() {
            if !occurrences.is_empty() {
                p1_target[k] = Some(s);
                k += occurrences.len();
            }
        }
        let p1 = PermutationNetwork::program(u, m, &p1_target)?;
        let duplicator = Duplicator::program(&staging_source);

        let mut p2_target = vec![None; m];
        for (k, &final_pos) in staging_final_positions.iter().enumerate() {
            p2_target[final_pos] = Some(k);
        }
        let p2 = PermutationNetwork::program(m, m, &p2_target)?;

        Ok(SelectionBlock { p1, duplicator, p2 })
    }

    pub fn select<T: Clone>(&self, inputs: &[T]) -> Vec<T> {
        let dummy = inputs[0].clone();
        let p1_out = self.p1.route(inputs, dummy.clone());
        let staged = self.duplicator.apply(&p1_out);
        self.p2.route(&staged, dummy)
    }

    /// Total conditional-swap/pass-take control wires this block's garbled-circuit
    /// form consumes, in `build_circuit`'s consumption order (`P1`, duplicator, `P2`).
    pub fn switch_count(&self) -> usize {
        self.p1.switch_count() + self.duplicator.switch_count() + self.p2.switch_count()
    }

    /// The server's plaintext control-wire values for this programming, in the
    /// same order `build_circuit` consumes `controls` -- these become the
    /// server's direct (non-OT) garbled-circuit inputs, since the server already
    /// knows its own secret routing decision and revealing the matching key leaks
    /// nothing (§4.3 "Circuit emission").
    pub fn control_bits(&self) -> Vec<bool> {
        let mut bits = self.p1.control_bits();
        bits.extend(self.duplicator.control_bits());
        bits.extend(self.p2.control_bits());
        bits
    }

    /// Garbled-circuit equivalent of `select`: routes `inputs` (length `u`, the
    /// client's feature words) through the same three stages as `select`, but as
    /// multiplexer gates gated by `controls` rather than baked-in swaps, so the
    /// circuit topology the client evaluates never varies with the server's secret
    /// mapping. `controls` must have exactly `switch_count()` wires.
    pub fn build_circuit(&self, inputs: &[Word], dummy: Word, controls: &[Rc<Node>]) -> Vec<Word> {
        let mut used = 0;

        let p1_switches = self.p1.switch_count();
        let p1_out = self.p1.build_circuit(inputs, dummy.clone(), &controls[used..used + p1_switches]);
        used += p1_switches;

        let dup_switches = self.duplicator.switch_count();
        let staged = self.duplicator.build_circuit(&p1_out, &controls[used..used + dup_switches]);
        used += dup_switches;

        let p2_switches = self.p2.switch_count();
        let out = self.p2.build_circuit(&staged, dummy, &controls[used..used + p2_switches]);
        used += p2_switches;

        debug_assert_eq!(used, controls.len());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_selection_block_repeats_sources() {
        // u=4, m=8, each of the 4 features selected exactly twice.
        let target = vec![0, 1, 2, 3, 0, 1, 2, 3];
        let block = SelectionBlock::program(4, &target).unwrap();
        let inputs = vec![10u64, 20, 30, 40];
        let out = block.select(&inputs);
        let expected: Vec<u64> = target.iter().map(|&t| inputs[t]).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn truncated_selection_block_picks_subset() {
        // u=8, m=3, selecting feature 7 twice and feature 0 once.
        let target = vec![7, 7, 0];
        let block = SelectionBlock::program(8, &target).unwrap();
        let inputs: Vec<u64> = (0..8).collect();
        let out = block.select(&inputs);
        assert_eq!(out, vec![7, 7, 0]);
    }

    #[test]
    fn rejects_out_of_range_target() {
        assert!(SelectionBlock::program(2, &[0, 5]).is_err());
    }

    #[test]
    fn extended_with_uneven_repetition_counts() {
        let target = vec![2, 0, 2, 1, 2, 0];
        let block = SelectionBlock::program(3, &target).unwrap();
        let inputs = vec![100u64, 200, 300];
        let out = block.select(&inputs);
        let expected: Vec<u64> = target.iter().map(|&t| inputs[t]).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn build_circuit_matches_select_for_extended_block() {
        use super::super::gc::input_word;

        let target = vec![0, 1, 2, 3, 0, 1, 2, 3];
        let block = SelectionBlock::program(4, &target).unwrap();
        let bits = 8usize;
        let u = 4usize;
        let switch_count = block.switch_count();

        let feature_words: Vec<Word> = (0..u).map(|i| input_word(i * bits, bits)).collect();
        let control_words: Vec<Rc<Node>> =
            (0..switch_count).map(|i| Rc::new(Node::Input(u * bits + i))).collect();
        let dummy = feature_words[0].clone();
        let out_words = block.build_circuit(&feature_words, dummy, &control_words);

        let feature_values = vec![10u64, 20, 30, 40];
        let mut input = vec![false; u * bits + switch_count];
        for (i, &v) in feature_values.iter().enumerate() {
            for b in 0..bits {
                input[i * bits + b] = (v >> b) & 1 == 1;
            }
        }
        for (i, &c) in block.control_bits().iter().enumerate() {
            input[u * bits + i] = c;
        }

        let expected: Vec<u64> = target.iter().map(|&t| feature_values[t]).collect();
        for (word, &exp) in out_words.iter().zip(&expected) {
            let mut v = 0u64;
            for (b, bit_node) in word.iter().enumerate() {
                if bit_node.eval(&input) {
                    v |= 1 << b;
                }
            }
            assert_eq!(v, exp);
        }
    }
}
