//! The truncated permutation-network shape (`v < u`): select a `v`-sized subset of
//! `u` inputs, discarding the rest. Shares `waksman::Network`'s recursive engine --
//! the only thing specific to the truncated shape is the injective, full-coverage
//! target array (every output slot is pinned, nothing left for a duplicator to fill).

use crate::error::PdteError;

use super::waksman::PermutationNetwork;

/// Program a truncated network selecting `target[i]` (an index into `0..u`) for each
/// output position `i`, `target.len() <= u`. All entries must be distinct.
pub fn program(u: usize, target: &[usize]) -> Result<PermutationNetwork, PdteError> {
    let v = target.len();
    if v > u {
        return Err(PdteError::Invariant(format!(
            "truncated network requires v <= u, got u={u} v={v}"
        )));
    }
    let pinned: Vec<Option<usize>> = target.iter().map(|&t| Some(t)).collect();
    PermutationNetwork::program(u, v, &pinned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_distinct_subset_in_requested_order() {
        let net = program(8, &[7, 0, 3]).unwrap();
        let inputs: Vec<u64> = (0..8).collect();
        let out = net.route(&inputs, 0);
        assert_eq!(out, vec![7, 0, 3]);
    }

    #[test]
    fn rejects_v_greater_than_u() {
        assert!(program(2, &[0, 1, 0]).is_err());
    }

    #[test]
    fn rejects_duplicate_selection() {
        assert!(program(4, &[1, 1]).is_err());
    }
}
