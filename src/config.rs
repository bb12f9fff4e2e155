use std::env;
use std::net::Ipv4Addr;

use crate::error::PdteError;

/// Which party is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Which protocol variant to run: HGG (HE selection + garbled-circuit
/// comparison + garbled-tree evaluation) or HHH (EC-ElGamal bit comparison +
/// Tai et al. path-cost evaluation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Hgg,
    Hhh,
}

/// Selection algorithm for the HGG protocol: HE feature selection or
/// garbled-circuit selection block. Irrelevant for HHH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionAlg {
    He,
    Gc,
}

/// HE scheme backing `SelectionAlg::He`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeScheme {
    Paillier,
    Dgk,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub addr: Ipv4Addr,
    pub port: u16,
    pub protocol: Protocol,
    pub selection_alg: SelectionAlg,
    pub he_scheme: HeScheme,
    pub tree_file: Option<String>,
    pub full_tree_attrs: Option<u32>,
    pub full_tree_depth: Option<u32>,
    pub keycache_path: Option<String>,
    /// Symmetric security parameter in bits (§6, default 128). Only shapes
    /// the HE modulus size when `he_bits` isn't given explicitly.
    pub security_bits: u32,
    /// Paillier/DGK modulus size in bits. Defaults to a size derived from
    /// `security_bits` (2048 for 128-bit security, per §3), overridable for
    /// faster local runs and tests.
    pub he_bits: u32,
    /// Bit width of a single feature/comparator wire (§3 "feature domain",
    /// defaults to 64). Shapes the garbled comparator and selection-network
    /// circuits on both the HE and GC selection paths.
    pub feature_bits: u32,
    /// The client's private feature vector (CLIENT role only).
    pub features: Vec<u64>,
}

const USAGE: &str = "usage: (server|client) <ip> <port> [--tree <path> | --full-tree <attrs> <depth>] \
[--protocol hgg|hhh] [--selection he|gc] [--he paillier|dgk] [--keycache <path>] \
[--features v0,v1,...] [--security-bits N] [--he-bits N] [--feature-bits N]";

fn default_he_bits(security_bits: u32) -> u32 {
    if security_bits >= 128 {
        2048
    } else {
        1024
    }
}

impl Config {
    pub fn from_args() -> Result<Self, PdteError> {
        let args: Vec<String> = env::args().collect();
        Self::from_str_args(&args)
    }

    fn from_str_args(args: &[String]) -> Result<Self, PdteError> {
        if args.len() < 4 {
            return Err(PdteError::Config(USAGE.to_string()));
        }

        let role = match args[1].as_str() {
            "server" => Role::Server,
            "client" => Role::Client,
            other => {
                return Err(PdteError::Config(format!(
                    "unknown role '{other}', expected 'server' or 'client'\n{USAGE}"
                )))
            }
        };

        let addr: Ipv4Addr = args[2]
            .parse()
            .map_err(|e| PdteError::Config(format!("bad ip address '{}': {e}", args[2])))?;
        let port: u16 = args[3]
            .parse()
            .map_err(|e| PdteError::Config(format!("bad port '{}': {e}", args[3])))?;

        let mut protocol = Protocol::Hgg;
        let mut selection_alg = SelectionAlg::He;
        let mut he_scheme = HeScheme::Paillier;
        let mut tree_file = None;
        let mut full_tree_attrs = None;
        let mut full_tree_depth = None;
        let mut keycache_path = None;
        let mut security_bits = 128u32;
        let mut he_bits = None;
        let mut feature_bits = 64u32;
        let mut features = Vec::new();

        let mut i = 4;
        while i < args.len() {
            match args[i].as_str() {
                "--tree" => {
                    let path = args.get(i + 1).ok_or_else(|| {
                        PdteError::Config("--tree requires a path argument".into())
                    })?;
                    tree_file = Some(path.clone());
                    i += 2;
                }
                "--full-tree" => {
                    let attrs = args
                        .get(i + 1)
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| {
                            PdteError::Config("--full-tree requires <attrs> <depth>".into())
                        })?;
                    let depth = args
                        .get(i + 2)
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| {
                            PdteError::Config("--full-tree requires <attrs> <depth>".into())
                        })?;
                    full_tree_attrs = Some(attrs);
                    full_tree_depth = Some(depth);
                    i += 3;
                }
                "--protocol" => {
                    protocol = match args.get(i + 1).map(String::as_str) {
                        Some("hgg") => Protocol::Hgg,
                        Some("hhh") => Protocol::Hhh,
                        _ => return Err(PdteError::Config("--protocol requires hgg|hhh".into())),
                    };
                    i += 2;
                }
                "--selection" => {
                    selection_alg = match args.get(i + 1).map(String::as_str) {
                        Some("he") => SelectionAlg::He,
                        Some("gc") => SelectionAlg::Gc,
                        _ => return Err(PdteError::Config("--selection requires he|gc".into())),
                    };
                    i += 2;
                }
                "--he" => {
                    he_scheme = match args.get(i + 1).map(String::as_str) {
                        Some("paillier") => HeScheme::Paillier,
                        Some("dgk") => HeScheme::Dgk,
                        _ => {
                            return Err(PdteError::Config(
                                "--he requires paillier|dgk".into(),
                            ))
                        }
                    };
                    i += 2;
                }
                "--keycache" => {
                    let path = args.get(i + 1).ok_or_else(|| {
                        PdteError::Config("--keycache requires a path argument".into())
                    })?;
                    keycache_path = Some(path.clone());
                    i += 2;
                }
                "--features" => {
                    let list = args
                        .get(i + 1)
                        .ok_or_else(|| PdteError::Config("--features requires a comma-separated list".into()))?;
                    features = list
                        .split(',')
                        .map(|v| {
                            v.trim()
                                .parse::<u64>()
                                .map_err(|e| PdteError::Config(format!("bad feature value '{v}': {e}")))
                        })
                        .collect::<Result<Vec<u64>, _>>()?;
                    i += 2;
                }
                "--security-bits" => {
                    security_bits = args
                        .get(i + 1)
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| PdteError::Config("--security-bits requires an integer".into()))?;
                    i += 2;
                }
                "--he-bits" => {
                    he_bits = Some(args.get(i + 1).and_then(|s| s.parse().ok()).ok_or_else(|| {
                        PdteError::Config("--he-bits requires an integer".into())
                    })?);
                    i += 2;
                }
                "--feature-bits" => {
                    feature_bits = args.get(i + 1).and_then(|s| s.parse().ok()).ok_or_else(|| {
                        PdteError::Config("--feature-bits requires an integer".into())
                    })?;
                    i += 2;
                }
                other => {
                    return Err(PdteError::Config(format!(
                        "unrecognized argument '{other}'\n{USAGE}"
                    )))
                }
            }
        }

        if tree_file.is_none() && full_tree_attrs.is_none() {
            return Err(PdteError::Config(format!(
                "either --tree or --full-tree is required\n{USAGE}"
            )));
        }

        let he_bits = he_bits.unwrap_or_else(|| default_he_bits(security_bits));

        Ok(Config {
            role,
            addr,
            port,
            protocol,
            selection_alg,
            he_scheme,
            tree_file,
            full_tree_attrs,
            full_tree_depth,
            keycache_path,
            security_bits,
            he_bits,
            feature_bits,
            features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_minimal_server_args() {
        let cfg = Config::from_str_args(&args(&[
            "pdte",
            "server",
            "127.0.0.1",
            "7766",
            "--tree",
            "tree.txt",
        ]))
        .unwrap();
        assert_eq!(cfg.role, Role::Server);
        assert_eq!(cfg.port, 7766);
        assert_eq!(cfg.tree_file.as_deref(), Some("tree.txt"));
    }

    #[test]
    fn rejects_missing_tree_source() {
        let err = Config::from_str_args(&args(&["pdte", "client", "127.0.0.1", "7766"]));
        assert!(err.is_err());
    }

    #[test]
    fn rejects_unknown_role() {
        let err = Config::from_str_args(&args(&["pdte", "bogus", "127.0.0.1", "7766"]));
        assert!(err.is_err());
    }

    #[test]
    fn parses_full_tree_and_protocol_override() {
        let cfg = Config::from_str_args(&args(&[
            "pdte",
            "client",
            "10.0.0.1",
            "9000",
            "--full-tree",
            "4",
            "4",
            "--protocol",
            "hhh",
        ]))
        .unwrap();
        assert_eq!(cfg.full_tree_attrs, Some(4));
        assert_eq!(cfg.full_tree_depth, Some(4));
        assert_eq!(cfg.protocol, Protocol::Hhh);
    }

    #[test]
    fn parses_features_and_bit_size_overrides() {
        let cfg = Config::from_str_args(&args(&[
            "pdte",
            "client",
            "127.0.0.1",
            "7766",
            "--tree",
            "tree.txt",
            "--features",
            "600, 200, 450",
            "--security-bits",
            "80",
            "--he-bits",
            "512",
        ]))
        .unwrap();
        assert_eq!(cfg.features, vec![600, 200, 450]);
        assert_eq!(cfg.security_bits, 80);
        assert_eq!(cfg.he_bits, 512);
    }

    #[test]
    fn default_he_bits_follow_security_bits() {
        let cfg = Config::from_str_args(&args(&[
            "pdte", "server", "127.0.0.1", "7766", "--tree", "tree.txt",
        ]))
        .unwrap();
        assert_eq!(cfg.security_bits, 128);
        assert_eq!(cfg.he_bits, 2048);
    }
}
