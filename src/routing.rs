//! The k-bucket routing table.
//!
//! Feynman: think of the table as a folder of index cards, one card per
//! "neighborhood" of the id space. Close neighborhoods get their own
//! card early; far neighborhoods share one big card because we'll never
//! need to remember more than `k` of them anyway. A card splits into two
//! only once it's full and happens to be the card that would otherwise
//! have to hold our own id.

use crate::contact::Contact;
use crate::identity::{NodeId, ID_BITS};
use std::time::{Duration, Instant};

struct Entry {
    contact: Contact,
    seq: u64,
}

/// One bucket, covering bucket-index range `[lo, hi)` (distances whose
/// `floor(log2(distance))` falls in that half-open range).
struct KBucket {
    lo: usize,
    hi: usize,
    entries: Vec<Entry>,
    last_updated: Instant,
}

impl KBucket {
    fn full_range() -> Self {
        KBucket {
            lo: 0,
            hi: ID_BITS,
            entries: Vec::new(),
            last_updated: Instant::now(),
        }
    }

    fn covers(&self, index: usize) -> bool {
        self.lo <= index && index < self.hi
    }

    fn position_of(&self, id: &NodeId) -> Option<usize> {
        self.entries.iter().position(|e| &e.contact.id == id)
    }

    fn is_splittable(&self) -> bool {
        // Only the bucket covering bucket-index 0 (distance zero - this
        // node's own neighborhood) ever splits, and only while it still
        // spans more than one index.
        self.lo == 0 && self.hi - self.lo > 1
    }
}

/// Outcome of `RoutingTable::observe`.
pub enum Observation {
    /// The contact already existed; its recency was refreshed.
    Updated,
    /// The contact was a new entry and there was room for it.
    Inserted,
    /// The covering bucket is full and unsplittable. `candidate` is the
    /// head (staleness candidate) that must be PINGed; call
    /// `complete_eviction` with the result once the probe resolves.
    PendingEviction { candidate: Contact },
}

pub struct RoutingTable {
    local_id: NodeId,
    k: usize,
    refresh_interval: Duration,
    buckets: Vec<KBucket>,
    next_seq: u64,
}

impl RoutingTable {
    pub fn new(local_id: NodeId, k: usize, refresh_interval: Duration) -> Self {
        RoutingTable {
            local_id,
            k,
            refresh_interval,
            buckets: vec![KBucket::full_range()],
            next_seq: 0,
        }
    }

    fn bucket_for(&mut self, index: usize) -> usize {
        self.buckets
            .iter()
            .position(|b| b.covers(index))
            .expect("bucket ranges always partition the full id space")
    }

    /// Admit or refresh `contact`. See `Observation` for the possible
    /// outcomes; a `PendingEviction` result means the caller must PING
    /// the candidate and report back via `complete_eviction`.
    pub fn observe(&mut self, contact: Contact) -> Observation {
        if contact.id == self.local_id {
            return Observation::Updated; // never route to ourselves
        }
        let index = self.local_id.bucket_index(&contact.id);

        loop {
            let bi = self.bucket_for(index);

            if let Some(pos) = self.buckets[bi].position_of(&contact.id) {
                let seq = self.buckets[bi].entries[pos].seq;
                self.buckets[bi].entries.remove(pos);
                self.buckets[bi].entries.push(Entry { contact, seq });
                self.buckets[bi].last_updated = Instant::now();
                return Observation::Updated;
            }

            if self.buckets[bi].entries.len() < self.k {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.buckets[bi].entries.push(Entry { contact, seq });
                self.buckets[bi].last_updated = Instant::now();
                return Observation::Inserted;
            }

            if self.buckets[bi].is_splittable() {
                self.split_bucket(bi);
                continue; // retry in the narrower child bucket
            }

            let candidate = self.buckets[bi].entries[0].contact.clone();
            return Observation::PendingEviction { candidate };
        }
    }

    /// Resolve a `PendingEviction`: drop `new_contact` if the candidate
    /// answered the PING, otherwise evict it and admit `new_contact`.
    pub fn complete_eviction(&mut self, new_contact: Contact, candidate_alive: bool) {
        if candidate_alive {
            return;
        }
        let index = self.local_id.bucket_index(&new_contact.id);
        let bi = self.bucket_for(index);
        if !self.buckets[bi].entries.is_empty() {
            self.buckets[bi].entries.remove(0);
        }
        if self.buckets[bi].entries.len() < self.k {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.buckets[bi]
                .entries
                .push(Entry { contact: new_contact, seq });
            self.buckets[bi].last_updated = Instant::now();
        }
        // Otherwise the bucket filled back up while the probe was in
        // flight; drop the new contact rather than re-splitting here.
    }

    fn split_bucket(&mut self, bi: usize) {
        let old = self.buckets.remove(bi);
        let mid = old.lo + (old.hi - old.lo) / 2;
        let mut left = KBucket {
            lo: old.lo,
            hi: mid,
            entries: Vec::new(),
            last_updated: Instant::now(),
        };
        let mut right = KBucket {
            lo: mid,
            hi: old.hi,
            entries: Vec::new(),
            last_updated: Instant::now(),
        };
        for entry in old.entries {
            let idx = self.local_id.bucket_index(&entry.contact.id);
            if left.covers(idx) {
                left.entries.push(entry);
            } else {
                right.entries.push(entry);
            }
        }
        self.buckets.insert(bi, right);
        self.buckets.insert(bi, left);
    }

    /// Up to `count` contacts closest to `target`, drawn from every
    /// bucket (the target may fall anywhere relative to `local_id`).
    pub fn find_neighbors(&self, target: &NodeId, count: usize, exclude: Option<&NodeId>) -> Vec<Contact> {
        let mut all: Vec<&Entry> = Vec::new();
        for bucket in &self.buckets {
            for e in &bucket.entries {
                if Some(&e.contact.id) != exclude {
                    all.push(e);
                }
            }
        }
        all.sort_by(|a, b| {
            a.contact
                .id
                .distance(target)
                .cmp(&b.contact.id.distance(target))
                .then(a.seq.cmp(&b.seq))
        });
        all.into_iter()
            .take(count)
            .map(|e| e.contact.clone())
            .collect()
    }

    /// One random id per bucket that hasn't been touched within the
    /// refresh interval - the targets for periodic table refresh.
    pub fn get_refresh_ids(&self) -> Vec<NodeId> {
        let now = Instant::now();
        self.buckets
            .iter()
            .filter(|b| now.duration_since(b.last_updated) >= self.refresh_interval)
            .map(|b| {
                let index = b.lo + (b.hi - b.lo) / 2;
                self.local_id.random_in_bucket(index)
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.entries.is_empty())
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.entries.len()).sum()
    }

    #[cfg(test)]
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[cfg(test)]
    pub(crate) fn bucket_ranges(&self) -> Vec<(usize, usize)> {
        self.buckets.iter().map(|b| (b.lo, b.hi)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn table(k: usize) -> RoutingTable {
        RoutingTable::new(NodeId::random(), k, Duration::from_secs(3600))
    }

    #[test]
    fn bucket_ranges_partition_the_id_space() {
        // Force several splits by filling bucket 0 past k with ids that
        // all collide on bucket_index 0 relative to local_id.
        let local = NodeId::random();
        let mut t = RoutingTable::new(local, 2, Duration::from_secs(3600));
        for _ in 0..8 {
            let id = local.random_in_bucket(0);
            t.observe(Contact::new(id, addr(4000)));
        }
        let mut sorted = t.bucket_ranges();
        sorted.sort();
        for w in sorted.windows(2) {
            assert_eq!(w[0].1, w[1].0, "ranges must be contiguous: {:?}", sorted);
        }
        assert_eq!(sorted.first().unwrap().0, 0);
        assert_eq!(sorted.last().unwrap().1, ID_BITS);
    }

    #[test]
    fn bucket_never_exceeds_k() {
        let mut t = table(4);
        let local = *t_local(&t);
        for _ in 0..50 {
            let id = local.random_in_bucket(100); // far bucket, won't split
            t.observe(Contact::new(id, addr(4000)));
        }
        assert!(t.len() <= 4);
    }

    fn t_local(t: &RoutingTable) -> &NodeId {
        &t.local_id
    }

    #[test]
    fn observe_same_contact_twice_updates_not_inserts() {
        let mut t = table(4);
        let local = *t_local(&t);
        let id = local.random_in_bucket(50);
        let c = Contact::new(id, addr(5000));
        assert!(matches!(t.observe(c.clone()), Observation::Inserted));
        assert!(matches!(t.observe(c.clone()), Observation::Updated));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn full_unsplittable_bucket_reports_pending_eviction() {
        let mut t = table(2);
        let local = *t_local(&t);
        for _ in 0..2 {
            let id = local.random_in_bucket(100);
            t.observe(Contact::new(id, addr(6000)));
        }
        let extra = local.random_in_bucket(100);
        match t.observe(Contact::new(extra, addr(6001))) {
            Observation::PendingEviction { .. } => {}
            _ => panic!("expected PendingEviction once a far bucket is full"),
        }
    }

    #[test]
    fn complete_eviction_drops_new_contact_when_candidate_alive() {
        let mut t = table(1);
        let local = *t_local(&t);
        let first = local.random_in_bucket(100);
        t.observe(Contact::new(first, addr(7000)));
        let second = local.random_in_bucket(100);
        let obs = t.observe(Contact::new(second, addr(7001)));
        assert!(matches!(obs, Observation::PendingEviction { .. }));
        t.complete_eviction(Contact::new(second, addr(7001)), true);
        assert_eq!(t.len(), 1);
        assert!(t.find_neighbors(&first, 1, None)[0].id == first);
    }

    #[test]
    fn complete_eviction_admits_new_contact_when_candidate_dead() {
        let mut t = table(1);
        let local = *t_local(&t);
        let first = local.random_in_bucket(100);
        t.observe(Contact::new(first, addr(7000)));
        let second = local.random_in_bucket(100);
        t.observe(Contact::new(second, addr(7001)));
        t.complete_eviction(Contact::new(second, addr(7001)), false);
        assert_eq!(t.len(), 1);
        assert!(t.find_neighbors(&second, 1, None)[0].id == second);
    }

    #[test]
    fn find_neighbors_orders_by_xor_distance() {
        let local = NodeId::random();
        let mut t = RoutingTable::new(local, 20, Duration::from_secs(3600));
        let target = NodeId::random();
        let mut ids = Vec::new();
        for i in 0..10 {
            let id = NodeId::random();
            ids.push(id);
            t.observe(Contact::new(id, addr(8000 + i)));
        }
        let found = t.find_neighbors(&target, 5, None);
        let mut expected = ids.clone();
        expected.sort_by_key(|id| id.distance(&target));
        let expected_top5: Vec<_> = expected.into_iter().take(found.len()).collect();
        for (f, e) in found.iter().zip(expected_top5.iter()) {
            assert_eq!(&f.id, e);
        }
    }

    #[test]
    fn exclude_filters_out_one_id() {
        let local = NodeId::random();
        let mut t = RoutingTable::new(local, 20, Duration::from_secs(3600));
        let a = NodeId::random();
        let b = NodeId::random();
        t.observe(Contact::new(a, addr(9000)));
        t.observe(Contact::new(b, addr(9001)));
        let found = t.find_neighbors(&local, 10, Some(&a));
        assert!(found.iter().all(|c| c.id != a));
    }

    #[test]
    fn refresh_ids_land_in_their_own_bucket() {
        let local = NodeId::random();
        let t = RoutingTable::new(local, 4, Duration::from_secs(0));
        let ids = t.get_refresh_ids();
        assert_eq!(ids.len(), t.bucket_count());
    }
}
