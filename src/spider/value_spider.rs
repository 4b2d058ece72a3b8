//! `ValueSpider` - terminates early on a value hit and opportunistically
//! caches the value at the closest contacted node that missed it.

use super::Shortlist;
use crate::contact::Contact;
use crate::identity::NodeId;
use crate::protocol::message::Value;
use crate::protocol::transport::{FindValueOutcome, Transport};
use futures::future::join_all;

pub struct ValueSpider<'a> {
    transport: &'a Transport,
    key: NodeId,
    k: usize,
    alpha: usize,
}

impl<'a> ValueSpider<'a> {
    pub fn new(transport: &'a Transport, key: NodeId, k: usize, alpha: usize) -> Self {
        ValueSpider {
            transport,
            key,
            k,
            alpha,
        }
    }

    /// Run the lookup. Returns the value on the first hit; the closest
    /// contacted node that did *not* return it is opportunistically
    /// sent a `store` for caching (the single closest such miss).
    pub async fn find(&self, seeds: Vec<Contact>) -> Option<Value> {
        let mut shortlist = Shortlist::new(self.key, seeds);
        // The single closest contacted node seen so far that missed,
        // tracked by distance to the key so "closest" holds across rounds.
        let mut closest_miss: Option<Contact> = None;

        loop {
            let round = shortlist.select_round(self.k, self.alpha);
            if round.is_empty() {
                break;
            }

            let key = self.key;
            let calls = round.iter().cloned().map(|c| {
                let contact = c.clone();
                async move {
                    let result = self.transport.find_value(contact.clone(), key).await;
                    (contact, result)
                }
            });
            let results = join_all(calls).await;

            for (contact, result) in results {
                match result {
                    Some(FindValueOutcome::Value(value)) => {
                        shortlist.mark_live(contact.id);
                        if let Some(target) = closest_miss.clone() {
                            self.transport.store(target, self.key, value.clone()).await;
                        }
                        return Some(value);
                    }
                    Some(FindValueOutcome::Nodes(contacts)) => {
                        shortlist.mark_live(contact.id);
                        let closer = match &closest_miss {
                            None => true,
                            Some(prev) => self.key.distance(&contact.id) < self.key.distance(&prev.id),
                        };
                        if closer {
                            closest_miss = Some(contact.clone());
                        }
                        shortlist.merge(contacts);
                    }
                    None => shortlist.drop_dead(&contact.id),
                }
            }
        }

        None
    }
}
