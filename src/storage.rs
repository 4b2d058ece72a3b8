//! Local value storage.
//!
//! Feynman: a node's storage is just the set of values it has agreed to
//! babysit for the network. It doesn't know or care who asked for a key
//! to be stored, only how long it's held it and whether it has been
//! told again recently that the value still matters.

use crate::identity::NodeId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A stored value together with the bookkeeping needed for republish.
#[derive(Debug, Clone)]
pub struct StoredValue {
    pub data: Vec<u8>,
    pub stored_at: Instant,
}

/// In-memory key/value store backing a node's STORE/FIND_VALUE handling.
pub trait Storage: Send + Sync {
    fn get(&self, key: &NodeId) -> Option<Vec<u8>>;
    fn set(&mut self, key: NodeId, data: Vec<u8>);
    /// Keys whose value has not been refreshed within `max_age` - the
    /// candidates for this node's own republish pass.
    fn iter_older_than(&self, max_age: Duration) -> Vec<(NodeId, Vec<u8>)>;
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: HashMap<NodeId, StoredValue>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &NodeId) -> Option<Vec<u8>> {
        self.entries.get(key).map(|v| v.data.clone())
    }

    fn set(&mut self, key: NodeId, data: Vec<u8>) {
        self.entries.insert(
            key,
            StoredValue {
                data,
                stored_at: Instant::now(),
            },
        );
    }

    fn iter_older_than(&self, max_age: Duration) -> Vec<(NodeId, Vec<u8>)> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, v)| now.duration_since(v.stored_at) >= max_age)
            .map(|(k, v)| (*k, v.data.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let mut s = MemoryStorage::new();
        let key = NodeId::digest(b"k");
        s.set(key, b"v".to_vec());
        assert_eq!(s.get(&key), Some(b"v".to_vec()));
    }

    #[test]
    fn missing_key_returns_none() {
        let s = MemoryStorage::new();
        assert_eq!(s.get(&NodeId::digest(b"nope")), None);
    }

    #[test]
    fn overwriting_a_key_resets_its_age() {
        let mut s = MemoryStorage::new();
        let key = NodeId::digest(b"k");
        s.set(key, b"v1".to_vec());
        assert!(s.iter_older_than(Duration::from_secs(0)).len() == 1);
        s.set(key, b"v2".to_vec());
        assert_eq!(s.get(&key), Some(b"v2".to_vec()));
    }
}
