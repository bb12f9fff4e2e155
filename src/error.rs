use std::io;

/// Error kinds per the protocol's error-handling design: the core recovers
/// from nothing, every error aborts the query. The sole exception (a missing
/// HE keypair cache file) is handled inline where it occurs and never
/// surfaces as a `PdteError`.
#[derive(Debug, thiserror::Error)]
pub enum PdteError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, PdteError>;
