use super::types::ChordState;
use crate::error::{Error, Result};
use crate::ident::{IdSpace, Ident, hash_key};
use crate::index::LocalIndex;
use crate::network::protocol::{Request, Response};
use crate::network::{Endpoint, Network};

use parking_lot::Mutex;
use std::sync::Arc;

/// One ring member: routing state, local index and a handle back to the
/// fabric for forwarding. Routing never holds a lock across a forward.
#[derive(Debug)]
pub struct ChordPeer {
    id: Ident,
    space: IdSpace,
    network: Arc<Network>,
    state: Mutex<ChordState>,
    index: Mutex<LocalIndex>,
}

impl ChordPeer {
    pub fn new(id: Ident, space: IdSpace, branching: usize, network: Arc<Network>) -> Arc<Self> {
        Arc::new(Self {
            id,
            space,
            network,
            state: Mutex::new(ChordState::solo(id, space)),
            index: Mutex::new(LocalIndex::new(branching)),
        })
    }

    pub fn id(&self) -> Ident {
        self.id
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut ChordState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn with_index<R>(&self, f: impl FnOnce(&mut LocalIndex) -> R) -> R {
        f(&mut self.index.lock())
    }

    /// Resolves the successor of `target`, forwarding along the ring when
    /// this node cannot answer. Each forward is one counted hop.
    fn find_successor(&self, target: Ident) -> Result<Ident> {
        let next_hop = {
            let state = self.state.lock();
            let successor = state.successor();
            if self.space.in_open_closed(target, self.id, successor) {
                return Ok(successor);
            }
            // Walk fingers from the widest jump down; fall back to the
            // successor when none precedes the target.
            state
                .fingers
                .iter()
                .rev()
                .map(|finger| finger.node)
                .find(|node| self.space.in_open(*node, self.id, target))
                .unwrap_or(successor)
        };
        self.network
            .send(self.id, next_hop, Request::FindSuccessor { target })?
            .owner()
    }
}

impl Endpoint for ChordPeer {
    fn handle(&self, request: Request) -> Result<Response> {
        match request {
            Request::FindSuccessor { target } => {
                self.find_successor(target).map(Response::Owner)
            }
            Request::Predecessor => {
                Ok(Response::Owner(self.state.lock().predecessor))
            }
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
            Request::TransferRange { start, end } => {
                let space = self.space;
                let items = self
                    .index
                    .lock()
                    .extract(|key| space.in_open_closed(hash_key(key, space), start, end));
                Ok(Response::Items(items))
            }
            Request::DrainAll => Ok(Response::Items(self.index.lock().drain())),
            Request::Absorb { items } => {
                self.index.lock().absorb(items);
                Ok(Response::Done)
            }
            Request::Route { .. } | Request::LeafSet | Request::TransferCloser { .. } => {
                Err(Error::Protocol("request not served by a chord node"))
            }
        }
    }
}
