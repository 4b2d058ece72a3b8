//! A Kademlia distributed hash table node.
//!
//! Four components, leaves first: node identity and XOR distance
//! (`identity`), the k-bucket routing table (`routing`), the UDP
//! protocol layer (`protocol`), and the iterative lookup engine
//! (`spider`). `node` composes them into the two public operations a
//! running node offers the outside world: `get` and `set`.

pub mod config;
pub mod contact;
pub mod error;
pub mod identity;
pub mod node;
pub mod persistence;
pub mod protocol;
pub mod routing;
pub mod spider;
pub mod storage;

pub use contact::Contact;
pub use error::{Error, Result};
pub use identity::NodeId;
pub use node::Node;
pub use protocol::message::Value;
