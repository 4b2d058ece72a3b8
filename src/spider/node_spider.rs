//! `NodeSpider` - terminates with the k closest live nodes to a target.

use super::Shortlist;
use crate::contact::Contact;
use crate::identity::NodeId;
use crate::protocol::transport::Transport;
use futures::future::join_all;

pub struct NodeSpider<'a> {
    transport: &'a Transport,
    target: NodeId,
    k: usize,
    alpha: usize,
}

impl<'a> NodeSpider<'a> {
    pub fn new(transport: &'a Transport, target: NodeId, k: usize, alpha: usize) -> Self {
        NodeSpider {
            transport,
            target,
            k,
            alpha,
        }
    }

    /// Run the lookup to completion, seeded with `seeds` (typically the
    /// caller's own `find_neighbors(target)`).
    pub async fn find(&self, seeds: Vec<Contact>) -> Vec<Contact> {
        let mut shortlist = Shortlist::new(self.target, seeds);

        loop {
            let round = shortlist.select_round(self.k, self.alpha);
            if round.is_empty() {
                // No uncontacted candidate remains within the closest k:
                // the natural termination condition.
                break;
            }

            let target = self.target;
            let calls = round.iter().cloned().map(|c| {
                let contact = c.clone();
                async move {
                    let result = self.transport.find_node(contact.clone(), target).await;
                    (contact, result)
                }
            });
            let results = join_all(calls).await;

            for (contact, result) in results {
                match result {
                    Some(contacts) => {
                        shortlist.mark_live(contact.id);
                        shortlist.merge(contacts);
                    }
                    None => shortlist.drop_dead(&contact.id),
                }
            }
        }

        shortlist.closest_k_live(self.k)
    }
}
