//! The garbled decision tree (§4.6): a per-node, color-bit-addressed pair of
//! encrypted child records that the client decrypts one level at a time,
//! learning nothing beyond the single root-to-leaf path its features force.
//!
//! Nodes are addressed throughout by *slot*, not by the tree's own arena
//! index or even [`DecisionTree::decision_node_order`]'s natural order --
//! slot `j` is `sigma(i)` for natural decision-node index `i`, where `sigma`
//! is the server's secret per-query permutation (`sigma(0) == 0`, so the
//! root always sits at slot 0). The garbled-circuit comparator for decision
//! node `i` is built and evaluated under label `sigma(i)` too, so the
//! client's evaluated wire keys already line up with garbled-tree slots
//! without any extra indirection.

use crate::error::PdteError;
use crate::garbling::{GarbledWire, KEY_SIZE};

/// `type(1) + child_slot(2, LE) + child_key(KEY_SIZE)`, the decision-node
/// shape; a leaf entry reuses the same fixed length with `classification`
/// in place of `child_slot`/`child_key` and the remainder zero-padded.
pub const RECORD_LEN: usize = 3 + KEY_SIZE;

fn hash_to_record(seed: &[u8; KEY_SIZE]) -> [u8; RECORD_LEN] {
    let mut out = Vec::with_capacity(RECORD_LEN + 32);
    let mut counter: u8 = 0;
    while out.len() < RECORD_LEN {
        let mut block = seed.to_vec();
        block.push(counter);
        out.extend(hex_decode(&sha256::digest(&block)));
        counter += 1;
    }
    out.truncate(RECORD_LEN);
    let mut arr = [0u8; RECORD_LEN];
    arr.copy_from_slice(&out);
    arr
}

fn hex_decode(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).expect("sha256::digest always returns hex"))
        .collect()
}

fn xor_key(a: &[u8; KEY_SIZE], b: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    let mut out = [0u8; KEY_SIZE];
    for i in 0..KEY_SIZE {
        out[i] = a[i] ^ b[i];
    }
    out
}

fn xor_record(a: &[u8; RECORD_LEN], b: &[u8; RECORD_LEN]) -> [u8; RECORD_LEN] {
    let mut out = [0u8; RECORD_LEN];
    for i in 0..RECORD_LEN {
        out[i] = a[i] ^ b[i];
    }
    out
}

fn encode_decision_child(slot: usize, key: &[u8; KEY_SIZE]) -> Result<[u8; RECORD_LEN], PdteError> {
    let slot: u16 = slot
        .try_into()
        .map_err(|_| PdteError::Invariant(format!("slot index {slot} does not fit in u16")))?;
    let mut out = [0u8; RECORD_LEN];
    out[0] = 0;
    out[1..3].copy_from_slice(&slot.to_le_bytes());
    out[3..3 + KEY_SIZE].copy_from_slice(key);
    Ok(out)
}

fn encode_leaf(classification: u64) -> [u8; RECORD_LEN] {
    let mut out = [0u8; RECORD_LEN];
    out[0] = 1;
    out[1..9].copy_from_slice(&classification.to_le_bytes());
    out
}

/// Either branch of a decision node: a pointer to another slot (with that
/// slot's node key, so the client can decode the next level), or a leaf
/// classification.
#[derive(Debug, Clone)]
pub enum Child {
    Decision { slot: usize, node_key: [u8; KEY_SIZE] },
    Leaf { classification: u64 },
}

/// Everything the server needs to garble one decision node into the tree,
/// already expressed in slot space.
pub struct NodeGarbleInput {
    pub slot: usize,
    pub node_key: [u8; KEY_SIZE],
    pub left: Child,
    pub right: Child,
    /// The comparator's two possible output keys for this node (`K0`, `K1`).
    pub k0: [u8; KEY_SIZE],
    pub k1: [u8; KEY_SIZE],
    /// The comparator's permutation bit `pi` (server-known).
    pub pi: bool,
}

/// The full garbled tree: `2*m` encrypted records, indexed `[2*slot + color]`.
#[derive(Debug, Clone)]
pub struct GarbledTree {
    records: Vec<[u8; RECORD_LEN]>,
    m: usize,
}

impl GarbledTree {
    /// Build the tree from one [`NodeGarbleInput`] per decision node (order
    /// doesn't matter -- every node is placed at its own `slot`).
    pub fn build(m: usize, nodes: &[NodeGarbleInput]) -> Result<Self, PdteError> {
        if nodes.len() != m {
            return Err(PdteError::Invariant(format!(
                "expected {m} node garble inputs, got {}",
                nodes.len()
            )));
        }

        let mut records = vec![[0u8; RECORD_LEN]; 2 * m];
        let mut written = vec![false; m];

        for n in nodes {
            if n.slot >= m {
                return Err(PdteError::Invariant(format!("slot {} out of range for m={m}", n.slot)));
            }
            if written[n.slot] {
                return Err(PdteError::Invariant(format!("slot {} garbled twice", n.slot)));
            }
            written[n.slot] = true;

            let left_plain = match &n.left {
                Child::Decision { slot, node_key } => encode_decision_child(*slot, node_key)?,
                Child::Leaf { classification } => encode_leaf(*classification),
            };
            let right_plain = match &n.right {
                Child::Decision { slot, node_key } => encode_decision_child(*slot, node_key)?,
                Child::Leaf { classification } => encode_leaf(*classification),
            };

            let color_for_left = GarbledWire::color_bit(&n.k0);
            let enc_left = xor_record(&left_plain, &hash_to_record(&xor_key(&n.node_key, &n.k0)));
            let enc_right = xor_record(&right_plain, &hash_to_record(&xor_key(&n.node_key, &n.k1)));

            let base = 2 * n.slot;
            records[base + color_for_left as usize] = enc_left;
            records[base + (!color_for_left) as usize] = enc_right;
        }

        if written.iter().any(|&w| !w) {
            return Err(PdteError::Invariant("not every slot was garbled".into()));
        }

        Ok(GarbledTree { records, m })
    }

    pub fn m(&self) -> usize {
        self.m
    }

    /// Raw serialized records, in slot-major `(color 0, color 1)` pairs --
    /// the wire form sent to the client (`2*m*(3+KEY_SIZE)` bytes total).
    pub fn records(&self) -> &[[u8; RECORD_LEN]] {
        &self.records
    }

    pub fn from_records(records: Vec<[u8; RECORD_LEN]>) -> Result<Self, PdteError> {
        if records.len() % 2 != 0 {
            return Err(PdteError::Protocol("garbled tree record count must be even".into()));
        }
        let m = records.len() / 2;
        Ok(GarbledTree { records, m })
    }

    /// Walk the tree from the root (slot 0, `nk = 0`), pulling the client's
    /// evaluated comparator output key for each slot visited from
    /// `eval_key_for_slot`. Returns the classification at the leaf reached,
    /// after exactly `depth` steps on a well-formed tree.
    pub fn traverse(
        &self,
        mut eval_key_for_slot: impl FnMut(usize) -> Result<[u8; KEY_SIZE], PdteError>,
    ) -> Result<u64, PdteError> {
        let mut slot = 0usize;
        let mut nk = [0u8; KEY_SIZE];

        loop {
            if slot >= self.m {
                return Err(PdteError::Invariant(format!("slot {slot} out of range for m={}", self.m)));
            }
            let key = eval_key_for_slot(slot)?;
            let color = GarbledWire::color_bit(&key);
            let entry = &self.records[2 * slot + color as usize];
            let data = xor_record(entry, &hash_to_record(&xor_key(&nk, &key)));

            match data[0] {
                1 => {
                    let classification = u64::from_le_bytes(data[1..9].try_into().unwrap());
                    return Ok(classification);
                }
                0 => {
                    let next_slot = u16::from_le_bytes([data[1], data[2]]) as usize;
                    let mut next_nk = [0u8; KEY_SIZE];
                    next_nk.copy_from_slice(&data[3..3 + KEY_SIZE]);
                    slot = next_slot;
                    nk = next_nk;
                }
                other => {
                    return Err(PdteError::Invariant(format!(
                        "decoded garbled-tree record has invalid type byte {other}"
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, RngCore};

    fn random_key() -> [u8; KEY_SIZE] {
        let mut k = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut k);
        k
    }

    /// A comparator stand-in: garbles a free-XOR-related (K0, K1) pair and
    /// lets a test pick which key the "client" ends up holding for a given
    /// boolean result, matching `GarbledComparator`'s contract without
    /// pulling in a real circuit.
    struct FakeComparator {
        k0: [u8; KEY_SIZE],
        k1: [u8; KEY_SIZE],
        pi: bool,
    }

    impl FakeComparator {
        fn new() -> Self {
            let off = random_key();
            let mut difference = random_key();
            difference[KEY_SIZE - 1] |= 1;
            let wire = GarbledWire::with_difference(off, &difference);
            let k0 = wire.off_key();
            let k1 = wire.on_key();
            let pi = GarbledWire::color_bit(&k0);
            FakeComparator { k0, k1, pi }
        }

        fn key_for_result(&self, result: bool) -> [u8; KEY_SIZE] {
            if result {
                self.k1
            } else {
                self.k0
            }
        }
    }

    #[test]
    fn toy_tree_depth_two_all_three_paths() {
        // root: X[0] <= 500 -> left leaf 7; right: X[1] <= 300 -> left leaf 11, right leaf 13
        // Slots: 0 = root, 1 = right subtree's decision node.
        let root_cmp = FakeComparator::new();
        let sub_cmp = FakeComparator::new();

        let nk0 = [0u8; KEY_SIZE];
        let nk1 = random_key();

        let nodes = vec![
            NodeGarbleInput {
                slot: 0,
                node_key: nk0,
                left: Child::Leaf { classification: 7 },
                right: Child::Decision { slot: 1, node_key: nk1 },
                k0: root_cmp.k0,
                k1: root_cmp.k1,
                pi: root_cmp.pi,
            },
            NodeGarbleInput {
                slot: 1,
                node_key: nk1,
                left: Child::Leaf { classification: 11 },
                right: Child::Leaf { classification: 13 },
                k0: sub_cmp.k0,
                k1: sub_cmp.k1,
                pi: sub_cmp.pi,
            },
        ];

        let tree = GarbledTree::build(2, &nodes).unwrap();

        // Features [100, *] -> root compare false -> leaf 7.
        let keys = [root_cmp.key_for_result(false)];
        let result = tree
            .traverse(|slot| Ok(keys[slot]))
            .unwrap();
        assert_eq!(result, 7);

        // Features [600, 200] -> root true, sub false -> leaf 11.
        let keys = [root_cmp.key_for_result(true), sub_cmp.key_for_result(false)];
        let result = tree.traverse(|slot| Ok(keys[slot])).unwrap();
        assert_eq!(result, 11);

        // Features [600, 400] -> root true, sub true -> leaf 13.
        let keys = [root_cmp.key_for_result(true), sub_cmp.key_for_result(true)];
        let result = tree.traverse(|slot| Ok(keys[slot])).unwrap();
        assert_eq!(result, 13);
    }

    #[test]
    fn traversal_visits_exactly_depth_many_nodes_and_extracts_classification() {
        // A depth-3 chain of dummy-like single-child decisions ending in a
        // marked leaf, to check the "exactly D steps" invariant.
        let comparators: Vec<FakeComparator> = (0..3).map(|_| FakeComparator::new()).collect();
        let node_keys: Vec<[u8; KEY_SIZE]> = std::iter::once([0u8; KEY_SIZE])
            .chain((1..3).map(|_| random_key()))
            .collect();

        let nodes = vec![
            NodeGarbleInput {
                slot: 0,
                node_key: node_keys[0],
                left: Child::Decision { slot: 1, node_key: node_keys[1] },
                right: Child::Decision { slot: 1, node_key: node_keys[1] },
                k0: comparators[0].k0,
                k1: comparators[0].k1,
                pi: comparators[0].pi,
            },
            NodeGarbleInput {
                slot: 1,
                node_key: node_keys[1],
                left: Child::Decision { slot: 2, node_key: node_keys[2] },
                right: Child::Decision { slot: 2, node_key: node_keys[2] },
                k0: comparators[1].k0,
                k1: comparators[1].k1,
                pi: comparators[1].pi,
            },
            NodeGarbleInput {
                slot: 2,
                node_key: node_keys[2],
                left: Child::Leaf { classification: 0xDEADBEEF },
                right: Child::Leaf { classification: 0xDEADBEEF },
                k0: comparators[2].k0,
                k1: comparators[2].k1,
                pi: comparators[2].pi,
            },
        ];

        let tree = GarbledTree::build(3, &nodes).unwrap();

        let mut visited = 0usize;
        let mut rng = rand::thread_rng();
        let bits: Vec<bool> = (0..3).map(|_| rng.gen_bool(0.5)).collect();
        let result = tree
            .traverse(|slot| {
                visited += 1;
                Ok(comparators[slot].key_for_result(bits[slot]))
            })
            .unwrap();

        assert_eq!(result, 0xDEADBEEF);
        assert_eq!(visited, 3);
    }

    #[test]
    fn wrong_key_fails_the_type_byte_check_with_overwhelming_probability() {
        let cmp = FakeComparator::new();
        let nodes = vec![NodeGarbleInput {
            slot: 0,
            node_key: [0u8; KEY_SIZE],
            left: Child::Leaf { classification: 1 },
            right: Child::Leaf { classification: 2 },
            k0: cmp.k0,
            k1: cmp.k1,
            pi: cmp.pi,
        }];
        let tree = GarbledTree::build(1, &nodes).unwrap();

        let bogus_key = random_key();
        let result = tree.traverse(|_| Ok(bogus_key));
        assert!(result.is_err());
    }
}
