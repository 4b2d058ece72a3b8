//! Iterative α-parallel lookup ("spider crawl") - the shortlist
//! bookkeeping shared by `NodeSpider` and `ValueSpider`.
//!
//! Feynman: a spider doesn't know the network's shape in advance. It
//! starts with a handful of known contacts, asks the closest few "who's
//! even closer to this target than you?", and keeps pulling in fresher
//! candidates until an entire round goes by without anyone turning up
//! closer than what it already has.

pub mod node_spider;
pub mod value_spider;

use crate::contact::Contact;
use crate::identity::{Distance, NodeId};
use std::collections::HashSet;

pub use node_spider::NodeSpider;
pub use value_spider::ValueSpider;

/// Ordered candidate pool for one lookup. Distance is always measured
/// against the lookup's fixed target.
pub(crate) struct Shortlist {
    target: NodeId,
    /// Ascending by (distance, insertion order) - ties broken stably.
    entries: Vec<Contact>,
    contacted: HashSet<NodeId>,
    /// Contacts that responded successfully at least once.
    live: HashSet<NodeId>,
}

impl Shortlist {
    pub fn new(target: NodeId, seeds: Vec<Contact>) -> Self {
        let mut sl = Shortlist {
            target,
            entries: Vec::new(),
            contacted: HashSet::new(),
            live: HashSet::new(),
        };
        sl.merge(seeds);
        sl
    }

    fn distance_to(&self, id: &NodeId) -> Distance {
        self.target.distance(id)
    }

    /// Merge newly observed contacts in, deduped by id, keeping the
    /// vector sorted by ascending distance with stable insertion order
    /// for ties.
    pub fn merge(&mut self, contacts: Vec<Contact>) {
        let known: HashSet<NodeId> = self.entries.iter().map(|c| c.id).collect();
        for c in contacts {
            if c.id != self.target && !known.contains(&c.id) {
                self.entries.push(c);
            }
        }
        self.entries
            .sort_by(|a, b| self.distance_to(&a.id).cmp(&self.distance_to(&b.id)));
    }

    /// Up to `count` closest entries (regardless of contacted state) -
    /// used both for round selection and for the final result.
    fn closest(&self, count: usize) -> Vec<Contact> {
        self.entries.iter().take(count).cloned().collect()
    }

    /// Pick up to `alpha` uncontacted candidates from the closest `k`
    /// known entries, and mark them contacted immediately at dispatch
    /// time.
    pub fn select_round(&mut self, k: usize, alpha: usize) -> Vec<Contact> {
        let mut picked = Vec::new();
        for c in self.closest(k) {
            if picked.len() == alpha {
                break;
            }
            if self.contacted.insert(c.id) {
                picked.push(c);
            }
        }
        picked
    }

    pub fn mark_live(&mut self, id: NodeId) {
        self.live.insert(id);
    }

    /// Drop a failed responder from the shortlist permanently.
    pub fn drop_dead(&mut self, id: &NodeId) {
        self.entries.retain(|c| &c.id != id);
    }

    /// Closest distance among live (successfully-contacted) entries, if any.
    pub fn closest_live_distance(&self, k: usize) -> Option<Distance> {
        self.closest(k)
            .iter()
            .find(|c| self.live.contains(&c.id))
            .map(|c| self.distance_to(&c.id))
    }

    /// Whether any uncontacted candidate remains among the closest k.
    pub fn has_uncontacted_within_k(&self, k: usize) -> bool {
        self.closest(k).iter().any(|c| !self.contacted.contains(&c.id))
    }

    /// The k closest contacted, live contacts - the spider's final result.
    pub fn closest_k_live(&self, k: usize) -> Vec<Contact> {
        self.entries
            .iter()
            .filter(|c| self.live.contains(&c.id))
            .take(k)
            .cloned()
            .collect()
    }

    pub fn is_live(&self, id: &NodeId) -> bool {
        self.live.contains(id)
    }
}
