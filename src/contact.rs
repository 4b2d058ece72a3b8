//! Contact: a node id paired with its network address.

use crate::identity::NodeId;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// A peer's id and where to reach it. Equality and hashing are by id
/// only - two contacts with the same id but different addresses are
/// "the same peer" as far as the routing table is concerned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: NodeId,
    pub addr: SocketAddr,
}

impl Contact {
    pub fn new(id: NodeId, addr: SocketAddr) -> Self {
        Self { id, addr }
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Contact {}

impl std::hash::Hash for Contact {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
