pub mod dgk;
pub mod keycache;
pub mod paillier;
pub mod party;
pub mod wire;

pub use party::{HeCiphertext, SelectionHeParty, SelectionHePublic};
