pub mod garbled;
pub mod parser;
pub mod tree;

pub use garbled::GarbledTree;
pub use tree::{DecNode, DecisionTree};
