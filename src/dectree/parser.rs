use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::PdteError;

use super::tree::{DecNode, DecisionTree};

/// Parse a decision-tree file in the GraphViz-subset format the original
/// benchmark trees use: one internal-node or leaf declaration per line
/// (`N3 [label="X2 <= 500"]`, `N7 [label="leaf:3"]`), plus edge lines
/// (`N3 -> N7;`). The first edge seen into a node becomes its left child,
/// the second becomes its right child, matching the source format's
/// ordering convention.
pub fn parse_tree_file<P: AsRef<Path>>(path: P) -> Result<DecisionTree, PdteError> {
    let contents = fs::read_to_string(path)?;
    parse_tree_str(&contents)
}

pub fn parse_tree_str(contents: &str) -> Result<DecisionTree, PdteError> {
    let mut nodes: Vec<DecNode> = Vec::new();
    let mut name_to_idx: HashMap<String, usize> = HashMap::new();
    let mut max_attribute = 0u32;
    let mut root_candidate: Option<usize> = None;
    let mut has_parent: HashMap<usize, bool> = HashMap::new();

    let mut get_or_insert = |name: &str, nodes: &mut Vec<DecNode>, name_to_idx: &mut HashMap<String, usize>| -> usize {
        if let Some(&idx) = name_to_idx.get(name) {
            return idx;
        }
        let idx = nodes.len();
        nodes.push(DecNode {
            left: None,
            right: None,
            parent: None,
            level: 0,
            leaf: true,
            threshold: 0,
            classification: 0,
            attribute_index: 0,
        });
        name_to_idx.insert(name.to_string(), idx);
        idx
    };

    for raw_line in contents.lines() {
        let line = raw_line.trim().trim_end_matches(';').trim();
        if line.is_empty() || line.starts_with("//") || line.starts_with("digraph") || line == "}" || line == "{" {
            continue;
        }

        if let Some(arrow) = line.find("->") {
            let (lhs, rhs) = line.split_at(arrow);
            let rhs = &rhs[2..];
            let from_name = lhs.trim();
            let to_name = rhs
                .trim()
                .trim_start_matches('[')
                .split('[')
                .next()
                .unwrap_or("")
                .trim();

            let from = get_or_insert(from_name, &mut nodes, &mut name_to_idx);
            let to = get_or_insert(to_name, &mut nodes, &mut name_to_idx);

            nodes[to].parent = Some(from);
            has_parent.insert(to, true);

            if nodes[from].left.is_none() {
                nodes[from].left = Some(to);
            } else if nodes[from].right.is_none() {
                nodes[from].right = Some(to);
            } else {
                return Err(PdteError::Protocol(format!(
                    "node '{from_name}' already has two children"
                )));
            }
            continue;
        }

        let bracket = line.find('[').ok_or_else(|| {
            PdteError::Protocol(format!("malformed tree file line: '{line}'"))
        })?;
        let name = line[..bracket].trim();
        let idx = get_or_insert(name, &mut nodes, &mut name_to_idx);

        let label_start = line.find('"').ok_or_else(|| {
            PdteError::Protocol(format!("missing label in line: '{line}'"))
        })?;
        let label_end = line[label_start + 1..]
            .find('"')
            .map(|p| p + label_start + 1)
            .ok_or_else(|| PdteError::Protocol(format!("unterminated label in line: '{line}'")))?;
        let label = &line[label_start + 1..label_end];

        if let Some(rest) = label.strip_prefix('X') {
            // "X<attr> <= <threshold>"
            let mut parts = rest.split_whitespace();
            let attr: u32 = parts
                .next()
                .ok_or_else(|| PdteError::Protocol(format!("missing attribute index in '{label}'")))?
                .parse()
                .map_err(|_| PdteError::Protocol(format!("bad attribute index in '{label}'")))?;
            let threshold_str = parts
                .last()
                .ok_or_else(|| PdteError::Protocol(format!("missing threshold in '{label}'")))?;
            let threshold: f64 = threshold_str
                .parse()
                .map_err(|_| PdteError::Protocol(format!("bad threshold in '{label}'")))?;

            nodes[idx].leaf = false;
            nodes[idx].attribute_index = attr;
            nodes[idx].threshold = (threshold * 1000.0) as i64;
            max_attribute = max_attribute.max(attr + 1);
        } else {
            nodes[idx].leaf = true;
            let classification = label
                .strip_prefix("leaf:")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(idx as u64);
            nodes[idx].classification = classification;
        }

        if root_candidate.is_none() {
            root_candidate = Some(idx);
        }
    }

    if nodes.is_empty() {
        return Err(PdteError::Protocol("tree file declared no nodes".into()));
    }

    // The root is the single node nobody pointed an edge at.
    let root = (0..nodes.len())
        .find(|i| nodes[*i].parent.is_none())
        .ok_or_else(|| PdteError::Protocol("tree file has no root (every node has a parent)".into()))?;

    Ok(DecisionTree::new(nodes, root, max_attribute.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_small_tree() {
        let text = r#"
            digraph {
                N0 [label="X0 <= 0.5"];
                N1 [label="leaf:1"];
                N2 [label="leaf:0"];
                N0 -> N1;
                N0 -> N2;
            }
        "#;

        let tree = parse_tree_str(text).unwrap();
        assert_eq!(tree.num_decision_nodes(), 1);
        assert_eq!(tree.num_leaves(), 2);
        assert_eq!(tree.evaluate(&[0]).unwrap(), 1);
        assert_eq!(tree.evaluate(&[1000]).unwrap(), 0);
    }

    #[test]
    fn rejects_line_with_no_label() {
        let text = "N0 [foo]";
        assert!(parse_tree_str(text).is_err());
    }
}
