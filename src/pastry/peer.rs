use super::types::PastryState;
use crate::error::{Error, Result};
use crate::ident::{IdSpace, Ident, hash_key};
use crate::index::LocalIndex;
use crate::network::protocol::{Request, Response};
use crate::network::{Endpoint, Network};

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

enum Hop {
    /// This node answers: the owner is a leaf-set member (or the node
    /// itself), or the cycle guard ended the route here.
    Resolved(Ident),
    Forward(Ident),
}

#[derive(Debug)]
pub struct PastryPeer {
    id: Ident,
    space: IdSpace,
    digit_bits: u32,
    network: Arc<Network>,
    state: Mutex<PastryState>,
    index: Mutex<LocalIndex>,
}

impl PastryPeer {
    pub fn new(
        id: Ident,
        space: IdSpace,
        digit_bits: u32,
        branching: usize,
        network: Arc<Network>,
    ) -> Arc<Self> {
        let rows = space.digit_count(digit_bits);
        let cols = 1usize << digit_bits;
        Arc::new(Self {
            id,
            space,
            digit_bits,
            network,
            state: Mutex::new(PastryState::empty(rows, cols)),
            index: Mutex::new(LocalIndex::new(branching)),
        })
    }

    pub fn id(&self) -> Ident {
        self.id
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut PastryState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn with_index<R>(&self, f: impl FnOnce(&mut LocalIndex) -> R) -> R {
        f(&mut self.index.lock())
    }

    /// The candidate circularly closest to `target`; ties go to the smaller
    /// id so every node ranks candidates identically.
    fn closest(&self, target: Ident, candidates: impl Iterator<Item = Ident>) -> Ident {
        candidates
            .min_by_key(|&id| (self.space.circular(id, target), id))
            .unwrap_or(self.id)
    }

    fn in_leaf_range(&self, state: &PastryState, target: Ident) -> bool {
        if state.covers_ring {
            return true;
        }
        match (state.leaf_lower.last(), state.leaf_upper.last()) {
            (Some(&low), Some(&high)) => self.space.in_closed(target, low, high),
            _ => true,
        }
    }

    /// One routing step toward the owner of `target`.
    fn route(&self, target: Ident, mut visited: HashSet<Ident>) -> Result<Ident> {
        if visited.contains(&self.id) {
            return Ok(self.id);
        }
        visited.insert(self.id);

        let hop = {
            let state = self.state.lock();

            if self.in_leaf_range(&state, target) {
                let owner = self.closest(
                    target,
                    state.leaves().chain(std::iter::once(self.id)),
                );
                Hop::Resolved(owner)
            } else {
                let row = self.space.shared_prefix(self.id, target, self.digit_bits);
                let col = self.space.digit(target, row, self.digit_bits) as usize;
                match state.routing.get(row).and_then(|cells| cells[col]) {
                    Some(next) if next != self.id && !visited.contains(&next) => {
                        Hop::Forward(next)
                    }
                    Some(_) => Hop::Resolved(self.id),
                    None => {
                        // Rare case: any known node with at least as long a
                        // shared prefix that is strictly closer to the key.
                        let own_distance = self.space.circular(self.id, target);
                        let fallback = state
                            .leaves()
                            .chain(state.matrix_nodes())
                            .filter(|node| *node != self.id && !visited.contains(node))
                            .filter(|node| {
                                self.space.shared_prefix(*node, target, self.digit_bits) >= row
                            })
                            .filter(|node| self.space.circular(*node, target) < own_distance)
                            .min_by_key(|&node| (self.space.circular(node, target), node));
                        match fallback {
                            Some(next) => Hop::Forward(next),
                            None => Hop::Resolved(self.id),
                        }
                    }
                }
            }
        };

        match hop {
            Hop::Resolved(owner) => Ok(owner),
            Hop::Forward(next) => self
                .network
                .send(self.id, next, Request::Route { target, visited })?
                .owner(),
        }
    }

    /// Whether a key id will belong to `candidate` rather than this node,
    /// under the closest-id ownership rule.
    fn yields_to(&self, key_id: Ident, candidate: Ident) -> bool {
        let to_candidate = (self.space.circular(key_id, candidate), candidate);
        let to_self = (self.space.circular(key_id, self.id), self.id);
        to_candidate < to_self
    }
}

impl Endpoint for PastryPeer {
    fn handle(&self, request: Request) -> Result<Response> {
        match request {
            Request::Route { target, visited } => {
                self.route(target, visited).map(Response::Owner)
            }
            Request::LeafSet => Ok(Response::Nodes(self.state.lock().leaves().collect())),
            Request::Lookup { key } => {
                let values = self.index.lock().lookup(&key).map(<[_]>::to_vec);
                Ok(Response::Values(values))
            }
            Request::Insert { key, value } => {
                self.index.lock().insert(&key, value);
                Ok(Response::Done)
            }
            Request::Delete { key } => {
                Ok(Response::Applied(self.index.lock().delete(&key)))
            }
            Request::Update { key, value } => {
                Ok(Response::Applied(self.index.lock().update(&key, value)))
            }
            Request::TransferCloser { candidate } => {
                let space = self.space;
                let items = self
                    .index
                    .lock()
                    .extract(|key| self.yields_to(hash_key(key, space), candidate));
                Ok(Response::Items(items))
            }
            Request::DrainAll => Ok(Response::Items(self.index.lock().drain())),
            Request::Absorb { items } => {
                self.index.lock().absorb(items);
                Ok(Response::Done)
            }
            Request::FindSuccessor { .. } | Request::Predecessor | Request::TransferRange { .. } => {
                Err(Error::Protocol("request not served by a pastry node"))
            }
        }
    }
}
