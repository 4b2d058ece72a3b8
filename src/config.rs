//! Node configuration, loaded from an optional TOML file and overridden
//! by CLI flags.
//!
//! Feynman: there are exactly five knobs a Kademlia node has - how many
//! peers a bucket remembers, how many RPCs run at once during a
//! lookup, who we claim to be, how long we wait for an answer, and how
//! often we dust off the routing table. Everything else is derived.

use crate::error::{Error, Result};
use crate::identity::NodeId;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Default bucket capacity / replication factor (k/ksize).
pub const DEFAULT_KSIZE: usize = 20;
/// Default per-lookup concurrency ceiling (α).
pub const DEFAULT_ALPHA: usize = 3;
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_LISTEN_PORT: u16 = 8468;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ksize: usize,
    pub alpha: usize,
    /// Override for this node's id; `None` means pick one at random.
    #[serde(default)]
    pub node_id: Option<[u8; crate::identity::ID_BYTES]>,
    #[serde(with = "duration_secs")]
    pub rpc_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub refresh_interval: Duration,
    pub listen_addr: String,
    pub listen_port: u16,
    pub data_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ksize: DEFAULT_KSIZE,
            alpha: DEFAULT_ALPHA,
            node_id: None,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            listen_addr: "0.0.0.0".to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            data_dir: "~/.bitdht".to_string(),
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults for any field
    /// the file omits. A missing file is not an error - it just means
    /// "use the defaults".
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn node_id(&self) -> NodeId {
        match self.node_id {
            Some(bytes) => NodeId::from_bytes(bytes),
            None => NodeId::random(),
        }
    }

    pub fn listen_socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.listen_addr, self.listen_port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address: {e}")))
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/bitdht.toml")).unwrap();
        assert_eq!(cfg.ksize, DEFAULT_KSIZE);
        assert_eq!(cfg.alpha, DEFAULT_ALPHA);
    }

    #[test]
    fn random_node_id_when_unset() {
        let cfg = Config::default();
        let a = cfg.node_id();
        let b = cfg.node_id();
        assert_ne!(a, b);
    }

    #[test]
    fn fixed_node_id_when_set() {
        let mut cfg = Config::default();
        cfg.node_id = Some([7u8; crate::identity::ID_BYTES]);
        assert_eq!(cfg.node_id(), cfg.node_id());
    }

    #[test]
    fn parses_toml_overrides() {
        let toml_src = "ksize = 10\nalpha = 2\nrpc_timeout = 1\nrefresh_interval = 2\nlisten_addr = \"127.0.0.1\"\nlisten_port = 9000\ndata_dir = \"/tmp/x\"\n";
        let cfg: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.ksize, 10);
        assert_eq!(cfg.alpha, 2);
        assert_eq!(cfg.rpc_timeout, Duration::from_secs(1));
        assert!(cfg.node_id.is_none());
    }
}
