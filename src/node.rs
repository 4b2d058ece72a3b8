//! Server orchestration: the thin layer composing identity, routing
//! table, protocol layer and spiders into the two public operations
//! (`get`, `set`) plus bootstrap and periodic maintenance.

use crate::config::Config;
use crate::contact::Contact;
use crate::error::{Error, Result};
use crate::identity::NodeId;
use crate::persistence;
use crate::protocol::message::Value;
use crate::protocol::transport::{FindValueOutcome, Transport};
use crate::routing::RoutingTable;
use crate::spider::{NodeSpider, ValueSpider};
use crate::storage::{MemoryStorage, Storage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// State shared between the transport's request handler and the
/// orchestration layer: the routing table and the storage backend.
pub struct Shared {
    pub local_id: NodeId,
    pub ksize: usize,
    pub routing: Mutex<RoutingTable>,
    pub storage: Mutex<Box<dyn Storage>>,
}

pub struct Node {
    shared: Arc<Shared>,
    transport: Arc<Transport>,
    alpha: usize,
    refresh_interval: Duration,
    bootstrap_path: PathBuf,
}

impl Node {
    pub async fn new(config: Config) -> Result<Self> {
        let local_id = config.node_id();
        let shared = Arc::new(Shared {
            local_id,
            ksize: config.ksize,
            routing: Mutex::new(RoutingTable::new(local_id, config.ksize, config.refresh_interval)),
            storage: Mutex::new(Box::new(MemoryStorage::new())),
        });
        let addr = config.listen_socket_addr()?;
        let transport = Transport::bind(addr, config.rpc_timeout, Arc::clone(&shared)).await?;

        let data_dir = shellexpand_home(&config.data_dir);
        std::fs::create_dir_all(&data_dir)?;
        let bootstrap_path = data_dir.join("bootstrap.bin");

        Ok(Node {
            shared,
            transport,
            alpha: config.alpha,
            refresh_interval: config.refresh_interval,
            bootstrap_path,
        })
    }

    pub fn local_id(&self) -> NodeId {
        self.shared.local_id
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Start listening and the periodic maintenance task. Returns the
    /// join handles so the caller can await graceful shutdown.
    pub fn start(self: &Arc<Self>) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let listen_handle = self.transport.listen();
        let maintenance_handle = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.maintenance_loop().await })
        };
        (listen_handle, maintenance_handle)
    }

    /// Load a prior bootstrap state file (if any) and contact every
    /// saved neighbor, then contact the given seed contacts. Either
    /// source populates the routing table via the PING side effect.
    pub async fn bootstrap(&self, seeds: Vec<Contact>) -> Result<()> {
        let mut all_seeds = seeds;
        if let Some(state) = persistence::load(&self.bootstrap_path)? {
            all_seeds.extend(state.neighbors);
        }
        for seed in all_seeds {
            self.transport.ping(seed).await;
        }
        // Seed our own neighborhood by looking ourselves up.
        let local_id = self.shared.local_id;
        let _ = self.lookup_nodes(local_id).await;
        Ok(())
    }

    async fn lookup_nodes(&self, target: NodeId) -> Vec<Contact> {
        let seeds = {
            let rt = self.shared.routing.lock().await;
            rt.find_neighbors(&target, self.shared.ksize, None)
        };
        let spider = NodeSpider::new(&self.transport, target, self.shared.ksize, self.alpha);
        spider.find(seeds).await
    }

    /// `get(key)`: local hit short-circuits; otherwise run a
    /// `ValueSpider`. Returns absence rather than raising.
    pub async fn get(&self, key: &[u8]) -> Option<Value> {
        let digest = NodeId::digest(key);
        if let Some(bytes) = self.shared.storage.lock().await.get(&digest) {
            if let Ok(value) = bincode::deserialize::<Value>(&bytes) {
                return Some(value);
            }
        }

        let seeds = {
            let rt = self.shared.routing.lock().await;
            rt.find_neighbors(&digest, self.shared.ksize, None)
        };
        if seeds.is_empty() {
            return None; // no known neighbors: no RPC issued
        }
        let spider = ValueSpider::new(&self.transport, digest, self.shared.ksize, self.alpha);
        spider.find(seeds).await
    }

    /// `set(key, value)`: hash the key, run a `NodeSpider`, store to
    /// every result. Succeeds if any store completes; additionally
    /// stores locally if this node is among the k closest.
    pub async fn set(&self, key: &[u8], value: Value) -> Result<bool> {
        let digest = NodeId::digest(key);

        let seeds = {
            let rt = self.shared.routing.lock().await;
            rt.find_neighbors(&digest, self.shared.ksize, None)
        };
        if seeds.is_empty() {
            return Err(Error::NoNeighbors);
        }

        let targets = self.lookup_nodes(digest).await;
        let mut any_ok = false;
        // targets is sorted ascending by distance to `digest` (Shortlist
        // invariant), so its last element is the farthest of the k
        // closest found. An empty result (no node answered) has no
        // farthest to compare to, so we store locally rather than drop
        // the value.
        let self_qualifies = targets
            .last()
            .map(|farthest| self.shared.local_id.distance(&digest) < farthest.id.distance(&digest))
            .unwrap_or(true);
        for peer in &targets {
            if self.transport.store(peer.clone(), digest, value.clone()).await {
                any_ok = true;
            }
        }
        if self_qualifies {
            let bytes = bincode::serialize(&value)?;
            self.shared.storage.lock().await.set(digest, bytes);
            any_ok = true;
        }
        Ok(any_ok)
    }

    async fn maintenance_loop(&self) {
        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            self.refresh_stale_buckets().await;
            self.republish_stored_values().await;
            if let Err(e) = self.save_bootstrap_state().await {
                tracing::warn!(error = %e, "failed to persist bootstrap state");
            }
        }
    }

    async fn refresh_stale_buckets(&self) {
        let ids = {
            let rt = self.shared.routing.lock().await;
            rt.get_refresh_ids()
        };
        for id in ids {
            self.lookup_nodes(id).await;
        }
    }

    async fn republish_stored_values(&self) {
        let stale = {
            let storage = self.shared.storage.lock().await;
            storage.iter_older_than(self.refresh_interval)
        };
        for (key, bytes) in stale {
            if let Ok(value) = bincode::deserialize::<Value>(&bytes) {
                let targets = self.lookup_nodes(key).await;
                for peer in targets {
                    self.transport.store(peer, key, value.clone()).await;
                }
                // Refresh our own copy's age too, per S6 ("exactly once").
                self.shared.storage.lock().await.set(key, bytes);
            }
        }
    }

    async fn save_bootstrap_state(&self) -> Result<()> {
        let neighbors = {
            let rt = self.shared.routing.lock().await;
            rt.find_neighbors(&self.shared.local_id, self.shared.ksize * 8, None)
        };
        persistence::save(
            &self.bootstrap_path,
            self.shared.ksize,
            self.alpha,
            self.shared.local_id,
            neighbors,
        )
    }

    /// Flush routing state to disk. Call on shutdown.
    pub async fn shutdown(&self) -> Result<()> {
        self.save_bootstrap_state().await
    }
}

fn shellexpand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
