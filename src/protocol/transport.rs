//! UDP transport: datagram I/O, pending-call correlation, the four
//! Kademlia RPC handlers, and the new-peer welcome side effect.
//!
//! Feynman: think of this as the node's mail room. Every envelope that
//! goes out gets a claim ticket (`message_id`); when a reply comes back
//! with a matching ticket, whoever is holding it gets woken up. If no
//! reply shows up before the clock runs out, the ticket is torn up and
//! the caller is told "nobody answered" - never why.

use super::codec;
use super::message::{Envelope, RequestPayload, ResponsePayload, Value};
use crate::contact::Contact;
use crate::identity::NodeId;
use crate::node::Shared;
use crate::routing::Observation;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, Mutex};

/// Outcome of a `find_value` RPC: either the value itself, or the
/// responder's closest-known-nodes list (a miss).
pub enum FindValueOutcome {
    Value(Value),
    Nodes(Vec<Contact>),
}

struct PendingCall {
    reply: oneshot::Sender<(SocketAddr, ResponsePayload)>,
}

pub struct Transport {
    socket: Arc<UdpSocket>,
    pending: Mutex<HashMap<NodeId, PendingCall>>,
    rpc_timeout: Duration,
    shared: Arc<Shared>,
}

impl Transport {
    pub async fn bind(addr: SocketAddr, rpc_timeout: Duration, shared: Arc<Shared>) -> crate::error::Result<Arc<Self>> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Arc::new(Transport {
            socket: Arc::new(socket),
            pending: Mutex::new(HashMap::new()),
            rpc_timeout,
            shared,
        }))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawn the receive loop. Runs until the socket is closed.
    pub fn listen(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.recv_loop().await })
    }

    async fn recv_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];
        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "udp recv error");
                    continue;
                }
            };
            let envelope = match codec::decode(&buf[..len]) {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!(error = %e, %from, "dropping malformed datagram");
                    continue;
                }
            };
            match envelope {
                Envelope::Request { message_id, payload } => {
                    self.handle_request(message_id, payload, from).await;
                }
                Envelope::Response { message_id, result } => {
                    self.handle_response(message_id, result, from).await;
                }
            }
        }
    }

    async fn handle_response(
        &self,
        message_id: NodeId,
        result: Result<ResponsePayload, String>,
        from: SocketAddr,
    ) {
        let slot = { self.pending.lock().await.remove(&message_id) };
        let Some(slot) = slot else {
            return; // no one waiting (already timed out, or unsolicited)
        };
        if let Ok(payload) = result {
            let _ = slot.reply.send((from, payload));
        }
        // Err(reason) from a responder is treated the same as silence:
        // the waiting call simply never gets a value and times out.
    }

    async fn handle_request(self: &Arc<Self>, message_id: NodeId, payload: RequestPayload, from: SocketAddr) {
        let sender = Contact::new(payload.sender_id(), from);
        let observation = {
            let mut rt = self.shared.routing.lock().await;
            rt.observe(sender.clone())
        };
        match observation {
            Observation::PendingEviction { candidate } => {
                self.spawn_eviction_probe(candidate, sender.clone());
            }
            Observation::Inserted => self.spawn_welcome(sender.clone()),
            Observation::Updated => {}
        }

        let response = self.build_response(payload, &sender).await;
        let envelope = Envelope::Response {
            message_id,
            result: Ok(response),
        };
        match codec::encode(&envelope) {
            Ok(bytes) => {
                if let Err(e) = self.socket.send_to(&bytes, from).await {
                    tracing::warn!(error = %e, %from, "failed to send response");
                }
            }
            Err(e) => tracing::warn!(error = %e, %from, "response too large to encode, dropping"),
        }
    }

    async fn build_response(&self, payload: RequestPayload, sender: &Contact) -> ResponsePayload {
        match payload {
            RequestPayload::Ping { .. } => ResponsePayload::Pong {
                responder_id: self.shared.local_id,
            },
            RequestPayload::Store { key, value, .. } => {
                let bytes = bincode::serialize(&value).unwrap_or_default();
                self.shared.storage.lock().await.set(key, bytes);
                ResponsePayload::Stored
            }
            RequestPayload::FindNode { target, .. } => {
                let rt = self.shared.routing.lock().await;
                ResponsePayload::Nodes(rt.find_neighbors(&target, self.shared.ksize, Some(&sender.id)))
            }
            RequestPayload::FindValue { key, .. } => {
                let stored = self.shared.storage.lock().await.get(&key);
                match stored.and_then(|bytes| bincode::deserialize::<Value>(&bytes).ok()) {
                    Some(value) => ResponsePayload::FoundValue(value),
                    None => {
                        let rt = self.shared.routing.lock().await;
                        ResponsePayload::Nodes(rt.find_neighbors(&key, self.shared.ksize, Some(&sender.id)))
                    }
                }
            }
        }
    }

    /// Probe a bucket-head candidate on behalf of a pending eviction and
    /// report the outcome back to the routing table.
    fn spawn_eviction_probe(self: &Arc<Self>, candidate: Contact, new_contact: Contact) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let alive = this.ping(candidate).await;
            this.shared.routing.lock().await.complete_eviction(new_contact, alive);
        });
    }

    /// Best-effort arrival-time replication: forward locally stored
    /// values the new peer is now among the k closest known nodes for.
    fn spawn_welcome(self: &Arc<Self>, new_contact: Contact) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let entries = this.shared.storage.lock().await.iter_older_than(Duration::from_secs(0));
            for (key, bytes) in entries {
                let closest = {
                    let rt = this.shared.routing.lock().await;
                    rt.find_neighbors(&key, this.shared.ksize, None)
                };
                let qualifies = closest.iter().any(|c| c.id == new_contact.id)
                    || closest.len() < this.shared.ksize;
                if !qualifies {
                    continue;
                }
                if let Ok(value) = bincode::deserialize::<Value>(&bytes) {
                    this.store(new_contact.clone(), key, value).await;
                }
            }
        });
    }

    /// Issue a request and await its response or timeout. A timeout (or
    /// decode/malformed outcome) resolves to `None` and never observes
    /// the peer; a genuine response observes it using the UDP source
    /// address.
    async fn call(&self, peer: Contact, payload: RequestPayload) -> Option<ResponsePayload> {
        let message_id = NodeId::random();
        let (tx, rx) = oneshot::channel();
        {
            self.pending.lock().await.insert(message_id, PendingCall { reply: tx });
        }

        let envelope = Envelope::Request { message_id, payload };
        let bytes = match codec::encode(&envelope) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "outbound payload too large, dropping");
                self.pending.lock().await.remove(&message_id);
                return None;
            }
        };
        if let Err(e) = self.socket.send_to(&bytes, peer.addr).await {
            tracing::warn!(error = %e, peer = %peer.addr, "send failed");
            self.pending.lock().await.remove(&message_id);
            return None;
        }

        match tokio::time::timeout(self.rpc_timeout, rx).await {
            Ok(Ok((from, result))) => {
                // A Pong carries the responder's true id, which matters
                // when `peer.id` was only a placeholder (e.g. an
                // address-only bootstrap seed); every other response
                // targeted a peer whose id we already knew.
                let observed_id = match &result {
                    ResponsePayload::Pong { responder_id } => *responder_id,
                    _ => peer.id,
                };
                let observed = Contact::new(observed_id, from);
                self.shared.routing.lock().await.observe(observed);
                Some(result)
            }
            Ok(Err(_)) => None, // sender dropped - treat as unresponsive
            Err(_) => {
                self.pending.lock().await.remove(&message_id);
                None
            }
        }
    }

    pub async fn ping(&self, peer: Contact) -> bool {
        let payload = RequestPayload::Ping {
            sender_id: self.shared.local_id,
        };
        matches!(self.call(peer, payload).await, Some(ResponsePayload::Pong { .. }))
    }

    pub async fn store(&self, peer: Contact, key: NodeId, value: Value) -> bool {
        let payload = RequestPayload::Store {
            sender_id: self.shared.local_id,
            key,
            value,
        };
        matches!(self.call(peer, payload).await, Some(ResponsePayload::Stored))
    }

    pub async fn find_node(&self, peer: Contact, target: NodeId) -> Option<Vec<Contact>> {
        let payload = RequestPayload::FindNode {
            sender_id: self.shared.local_id,
            target,
        };
        match self.call(peer, payload).await {
            Some(ResponsePayload::Nodes(v)) => Some(v),
            _ => None,
        }
    }

    pub async fn find_value(&self, peer: Contact, key: NodeId) -> Option<FindValueOutcome> {
        let payload = RequestPayload::FindValue {
            sender_id: self.shared.local_id,
            key,
        };
        match self.call(peer, payload).await {
            Some(ResponsePayload::FoundValue(v)) => Some(FindValueOutcome::Value(v)),
            Some(ResponsePayload::Nodes(v)) => Some(FindValueOutcome::Nodes(v)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RoutingTable;
    use crate::storage::MemoryStorage;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    async fn make(local_id: NodeId, ksize: usize) -> Arc<Transport> {
        let shared = Arc::new(Shared {
            local_id,
            ksize,
            routing: Mutex::new(RoutingTable::new(local_id, ksize, Duration::from_secs(3600))),
            storage: Mutex::new(Box::new(MemoryStorage::new())),
        });
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let t = Transport::bind(addr, Duration::from_millis(500), shared)
            .await
            .unwrap();
        t.listen();
        t
    }

    #[tokio::test]
    async fn ping_with_placeholder_id_learns_the_true_responder_id() {
        let a = make(NodeId::random(), 20).await;
        let b = make(NodeId::random(), 20).await;
        let b_addr = b.local_addr().unwrap();
        let b_real_id = b.shared.local_id;

        // Simulate an address-only bootstrap seed: the caller does not
        // yet know `b`'s real id, only where to reach it.
        let placeholder = Contact::new(NodeId::random(), b_addr);
        assert!(a.ping(placeholder).await);

        let rt = a.shared.routing.lock().await;
        let found = rt.find_neighbors(&b_real_id, 1, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, b_real_id, "must observe the Pong's responder_id, not the placeholder");
    }
}
