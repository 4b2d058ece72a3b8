//! Bootstrap state persistence.
//!
//! An opaque byte blob this node writes on shutdown and reads on
//! startup so it can rejoin the network without a fresh bootstrap
//! contact every time. The format is private to this implementation;
//! it is not part of the wire protocol.

use crate::contact::Contact;
use crate::error::{Error, Result};
use crate::identity::NodeId;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct BootstrapState {
    ksize: usize,
    alpha: usize,
    node_id: NodeId,
    neighbors: Vec<Contact>,
}

/// Write the current routing table snapshot to `path`, replacing any
/// existing file atomically (write to a temp file, then rename).
pub fn save(
    path: &Path,
    ksize: usize,
    alpha: usize,
    node_id: NodeId,
    neighbors: Vec<Contact>,
) -> Result<()> {
    let state = BootstrapState {
        ksize,
        alpha,
        node_id,
        neighbors,
    };
    let bytes = bincode::serialize(&state)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, &bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Result of loading a bootstrap state file.
pub struct Loaded {
    pub node_id: NodeId,
    pub neighbors: Vec<Contact>,
}

/// Load a previously saved state file. A missing file is not an error
/// - there's simply nothing to resume from.
pub fn load(path: &Path) -> Result<Option<Loaded>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    let state: BootstrapState = bincode::deserialize(&bytes)
        .map_err(|e| Error::Persistence(format!("corrupt bootstrap state: {e}")))?;
    Ok(Some(Loaded {
        node_id: state.node_id,
        neighbors: state.neighbors,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.bin");
        assert!(load(&path).unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.bin");
        let id = NodeId::random();
        let neighbor = Contact::new(
            NodeId::random(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000),
        );
        save(&path, 20, 3, id, vec![neighbor.clone()]).unwrap();
        let loaded = load(&path).unwrap().expect("state should load");
        assert_eq!(loaded.node_id, id);
        assert_eq!(loaded.neighbors.len(), 1);
        assert_eq!(loaded.neighbors[0].id, neighbor.id);
    }
}
