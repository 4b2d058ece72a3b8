//! Wire message shapes for the four Kademlia RPCs.
//!
//! Feynman: every datagram is either someone asking us something or us
//! hearing back from someone we asked. Both shapes carry the same
//! `message_id` so a reply can find its way back to the call that's
//! still waiting on it.

use crate::contact::Contact;
use crate::identity::NodeId;
use serde::{Deserialize, Serialize};

/// The value types `set` is permitted to store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestPayload {
    Ping {
        sender_id: NodeId,
    },
    Store {
        sender_id: NodeId,
        key: NodeId,
        value: Value,
    },
    FindNode {
        sender_id: NodeId,
        target: NodeId,
    },
    FindValue {
        sender_id: NodeId,
        key: NodeId,
    },
}

impl RequestPayload {
    pub fn sender_id(&self) -> NodeId {
        match self {
            RequestPayload::Ping { sender_id }
            | RequestPayload::Store { sender_id, .. }
            | RequestPayload::FindNode { sender_id, .. }
            | RequestPayload::FindValue { sender_id, .. } => *sender_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
    Pong { responder_id: NodeId },
    Stored,
    Nodes(Vec<Contact>),
    FoundValue(Value),
}

/// A datagram's decoded payload: a request or a response, each keyed by
/// the `message_id` that correlates it with an outstanding call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Envelope {
    Request {
        message_id: NodeId,
        payload: RequestPayload,
    },
    /// `Err` carries a human-readable reason; it is never itself raised
    /// to a caller - a transport-level error just resolves a pending
    /// call as timed out.
    Response {
        message_id: NodeId,
        result: Result<ResponsePayload, String>,
    },
}
