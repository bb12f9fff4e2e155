use crate::error::PdteError;

/// A node in the decision tree arena. Children/parent are arena indices
/// rather than pointers — idiomatic in a language without a garbage
/// collector, and it sidesteps the original's raw-pointer node graph.
#[derive(Debug, Clone)]
pub struct DecNode {
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub parent: Option<usize>,
    pub level: u32,
    pub leaf: bool,
    /// Only meaningful for decision nodes.
    pub threshold: i64,
    /// Only meaningful for leaves.
    pub classification: u64,
    /// Only meaningful for decision nodes: which feature vector slot this
    /// node's comparison reads.
    pub attribute_index: u32,
}

impl DecNode {
    fn new_leaf(classification: u64, level: u32, parent: Option<usize>) -> Self {
        DecNode {
            left: None,
            right: None,
            parent,
            level,
            leaf: true,
            threshold: 0,
            classification,
            attribute_index: 0,
        }
    }

    fn new_decision(attribute_index: u32, threshold: i64, level: u32, parent: Option<usize>) -> Self {
        DecNode {
            left: None,
            right: None,
            parent,
            level,
            leaf: false,
            threshold,
            classification: 0,
            attribute_index,
        }
    }
}

/// A decision tree: an arena of `DecNode`s plus the index of the root.
///
/// `depth_pad` inserts dummy decision nodes above under-depth leaves so
/// every root-to-leaf path has exactly `depth` decision nodes — this keeps
/// the garbled-tree node count and the client's traversal pattern
/// independent of which leaf is reached, closing the path-length side
/// channel.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    pub nodes: Vec<DecNode>,
    pub root: usize,
    pub num_attributes: u32,
    pub depth: u32,
}

impl DecisionTree {
    pub fn new(nodes: Vec<DecNode>, root: usize, num_attributes: u32) -> Self {
        let depth = Self::compute_depth(&nodes, root);
        DecisionTree {
            nodes,
            root,
            num_attributes,
            depth,
        }
    }

    fn compute_depth(nodes: &[DecNode], node: usize) -> u32 {
        let n = &nodes[node];
        if n.leaf {
            return 0;
        }
        let left = n.left.map_or(0, |c| 1 + Self::compute_depth(nodes, c));
        let right = n.right.map_or(0, |c| 1 + Self::compute_depth(nodes, c));
        left.max(right)
    }

    pub fn num_decision_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| !n.leaf).count()
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.leaf).count()
    }

    /// Assigns every decision node a natural index `0..m` in breadth-first
    /// order starting from the root, returned as `order[natural_index] =
    /// arena_index`. The root always lands at natural index 0 — the
    /// invariant the garbled-tree key schedule and the server's secret
    /// node permutation σ (σ(0) = 0) both depend on.
    pub fn decision_node_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.num_decision_nodes());
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(self.root);

        while let Some(idx) = queue.pop_front() {
            let node = &self.nodes[idx];
            if node.leaf {
                continue;
            }
            order.push(idx);
            if let Some(l) = node.left {
                queue.push_back(l);
            }
            if let Some(r) = node.right {
                queue.push_back(r);
            }
        }

        order
    }

    /// Build a complete binary decision tree of the given attribute count
    /// and depth, used for synthetic benchmarking when no tree file is
    /// supplied. Thresholds and attribute indices cycle through the
    /// available attributes; classifications are assigned by leaf order.
    pub fn full_tree(num_attributes: u32, depth: u32) -> Self {
        let mut nodes = Vec::new();
        let root = Self::build_full_subtree(&mut nodes, num_attributes, depth, 0, None);
        DecisionTree::new(nodes, root, num_attributes)
    }

    fn build_full_subtree(
        nodes: &mut Vec<DecNode>,
        num_attributes: u32,
        remaining_depth: u32,
        level: u32,
        parent: Option<usize>,
    ) -> usize {
        if remaining_depth == 0 {
            let idx = nodes.len();
            nodes.push(DecNode::new_leaf(idx as u64, level, parent));
            return idx;
        }

        let attribute_index = level % num_attributes.max(1);
        let idx = nodes.len();
        nodes.push(DecNode::new_decision(attribute_index, 500, level, parent));

        let left = Self::build_full_subtree(nodes, num_attributes, remaining_depth - 1, level + 1, Some(idx));
        let right = Self::build_full_subtree(nodes, num_attributes, remaining_depth - 1, level + 1, Some(idx));

        nodes[idx].left = Some(left);
        nodes[idx].right = Some(right);
        idx
    }

    /// Insert a dummy decision node above every leaf shallower than `depth`,
    /// so every path from root to leaf has exactly `depth` decisions. A
    /// dummy node's left and right children both point at the same original
    /// child, so either branch taken at that node reaches the same place.
    pub fn depth_pad(&mut self) {
        let target = self.depth;
        self.pad_subtree(self.root, target);
    }

    fn pad_subtree(&mut self, node: usize, remaining: u32) {
        if self.nodes[node].leaf {
            if remaining > 0 {
                self.insert_dummy_chain(node, remaining);
            }
            return;
        }

        let (left, right) = (self.nodes[node].left, self.nodes[node].right);
        if let Some(left) = left {
            self.pad_subtree(left, remaining - 1);
        }
        if let Some(right) = right {
            self.pad_subtree(right, remaining - 1);
        }
    }

    fn insert_dummy_chain(&mut self, leaf: usize, remaining: u32) {
        let parent = self.nodes[leaf].parent;
        let base_level = parent.map_or(0, |p| self.nodes[p].level + 1);
        let mut below = leaf;

        for i in 0..remaining {
            let idx = self.nodes.len();
            self.nodes
                .push(DecNode::new_decision(0, i64::MAX, base_level + i, None));
            self.nodes[idx].left = Some(below);
            self.nodes[idx].right = Some(below);
            self.nodes[below].parent = Some(idx);
            below = idx;
        }

        self.nodes[below].parent = parent;

        if let Some(parent) = parent {
            if self.nodes[parent].left == Some(leaf) {
                self.nodes[parent].left = Some(below);
            }
            if self.nodes[parent].right == Some(leaf) {
                self.nodes[parent].right = Some(below);
            }
        } else {
            self.root = below;
        }
    }

    /// Evaluate the tree directly (used only by tests and the non-private
    /// reference evaluator, never by either protocol party on a real
    /// query).
    pub fn evaluate(&self, features: &[i64]) -> Result<u64, PdteError> {
        let mut current = self.root;
        loop {
            let node = &self.nodes[current];
            if node.leaf {
                return Ok(node.classification);
            }
            let attr = *features.get(node.attribute_index as usize).ok_or_else(|| {
                PdteError::Invariant(format!(
                    "feature vector too short for attribute index {}",
                    node.attribute_index
                ))
            })?;

            current = if attr <= node.threshold {
                node.left
            } else {
                node.right
            }
            .ok_or_else(|| PdteError::Invariant("decision node missing child".into()))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_tree_has_expected_shape() {
        let tree = DecisionTree::full_tree(3, 3);
        assert_eq!(tree.num_leaves(), 8);
        assert_eq!(tree.num_decision_nodes(), 7);
        assert_eq!(tree.depth, 3);
    }

    #[test]
    fn evaluate_walks_to_correct_leaf() {
        let tree = DecisionTree::full_tree(2, 2);
        // Every threshold is 500, every path compares feature 0 then feature 1 <=.
        let low = tree.evaluate(&[0, 0]).unwrap();
        let high = tree.evaluate(&[1000, 1000]).unwrap();
        assert_ne!(low, high);
    }

    #[test]
    fn decision_node_order_puts_root_first() {
        let tree = DecisionTree::full_tree(2, 3);
        let order = tree.decision_node_order();
        assert_eq!(order.len(), tree.num_decision_nodes());
        assert_eq!(order[0], tree.root);
        // every arena index in the order is actually a decision node
        assert!(order.iter().all(|&i| !tree.nodes[i].leaf));
    }

    #[test]
    fn depth_pad_equalizes_leaf_depths() {
        let mut nodes = vec![
            DecNode::new_decision(0, 10, 0, None),
            DecNode::new_leaf(1, 1, Some(0)),
            DecNode::new_decision(1, 20, 1, Some(0)),
            DecNode::new_leaf(2, 2, Some(2)),
            DecNode::new_leaf(3, 2, Some(2)),
        ];
        nodes[0].left = Some(1);
        nodes[0].right = Some(2);
        nodes[2].left = Some(3);
        nodes[2].right = Some(4);

        let mut tree = DecisionTree::new(nodes, 0, 2);
        assert_eq!(tree.depth, 2);
        tree.depth_pad();

        fn leaf_depths(tree: &DecisionTree, node: usize, depth: u32, out: &mut Vec<u32>) {
            let n = &tree.nodes[node];
            if n.leaf {
                out.push(depth);
            } else {
                if let Some(l) = n.left {
                    leaf_depths(tree, l, depth + 1, out);
                }
                if let Some(r) = n.right {
                    leaf_depths(tree, r, depth + 1, out);
                }
            }
        }

        let mut depths = Vec::new();
        leaf_depths(&tree, tree.root, 0, &mut depths);
        assert!(depths.iter().all(|&d| d == tree.depth));
    }
}
