use super::peer::ChordPeer;
use super::types::FingerEntry;
use crate::error::{Error, Result};
use crate::ident::{IdSpace, Ident, hash_key};
use crate::network::protocol::Request;
use crate::network::Network;

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The Chord overlay: an arena of peers keyed by ring id plus the shared
/// delivery fabric. Data operations take `&self`; join and leave take
/// `&mut self`, so topology changes are exclusive by construction.
#[derive(Debug)]
pub struct Chord {
    space: IdSpace,
    branching: usize,
    successor_len: Option<usize>,
    network: Arc<Network>,
    peers: BTreeMap<Ident, Arc<ChordPeer>>,
}

impl Chord {
    /// Builds the ring over the given node ids. Ids are reduced into the
    /// space; a collision is refused rather than silently merged.
    pub fn new(
        space: IdSpace,
        branching: usize,
        successor_len: Option<usize>,
        node_ids: &[Ident],
    ) -> Result<Self> {
        if node_ids.is_empty() {
            return Err(Error::InvalidConfig("an overlay needs at least one node".into()));
        }

        let network = Network::new();
        let mut peers = BTreeMap::new();
        for &raw in node_ids {
            let id = space.wrap(raw);
            if peers.contains_key(&id) {
                return Err(Error::DuplicateId(id));
            }
            let peer = ChordPeer::new(id, space, branching, network.clone());
            network.register(id, peer.clone());
            peers.insert(id, peer);
        }

        let mut chord = Self {
            space,
            branching,
            successor_len,
            network,
            peers,
        };
        chord.rebuild_topology();
        tracing::info!(nodes = chord.peers.len(), bits = space.bits(), "chord ring built");
        Ok(chord)
    }

    pub fn space(&self) -> IdSpace {
        self.space
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn node_count(&self) -> usize {
        self.peers.len()
    }

    pub fn node_ids(&self) -> Vec<Ident> {
        self.peers.keys().copied().collect()
    }

    pub fn contains(&self, id: Ident) -> bool {
        self.peers.contains_key(&self.space.wrap(id))
    }

    /// Total distinct keys held across all local indices.
    pub fn item_count(&self) -> usize {
        self.peers
            .values()
            .map(|peer| peer.with_index(|index| index.len()))
            .sum()
    }

    /// The default routing entry point: the lowest live id.
    pub fn seed(&self) -> Ident {
        self.peers.keys().next().copied().unwrap_or_default()
    }

    /// Snapshot of one node's local index, for verification and debugging.
    pub fn items_of(&self, id: Ident) -> Option<Vec<(String, Vec<Value>)>> {
        self.peers.get(&self.space.wrap(id)).map(|peer| {
            peer.with_index(|index| {
                index
                    .scan()
                    .map(|(key, values)| (key.to_string(), values.to_vec()))
                    .collect()
            })
        })
    }

    fn entry_node(&self, source: Option<Ident>) -> Result<Ident> {
        match source {
            Some(id) => {
                let id = self.space.wrap(id);
                if self.peers.contains_key(&id) {
                    Ok(id)
                } else {
                    Err(Error::UnknownNode(id))
                }
            }
            None => Ok(self.seed()),
        }
    }

    /// Resolves the owner of `key_id` starting from `start`. The entry
    /// delivery and every forward count one hop each.
    pub fn find_owner(&self, start: Ident, key_id: Ident) -> Result<Ident> {
        self.network
            .send(start, start, Request::FindSuccessor { target: key_id })?
            .owner()
    }

    pub fn lookup(
        &self,
        key: &str,
        source: Option<Ident>,
    ) -> Result<(Option<Vec<Value>>, u32, Ident)> {
        let start = self.entry_node(source)?;
        let scope = self.network.begin_op();
        let owner = self.find_owner(start, hash_key(key, self.space))?;
        let values = self
            .network
            .deliver(start, owner, Request::Lookup { key: key.to_string() })?
            .values()?;
        Ok((values, scope.end(), owner))
    }

    pub fn insert(&self, key: &str, value: Value, source: Option<Ident>) -> Result<(u32, Ident)> {
        let start = self.entry_node(source)?;
        let scope = self.network.begin_op();
        let owner = self.find_owner(start, hash_key(key, self.space))?;
        self.network
            .deliver(start, owner, Request::Insert { key: key.to_string(), value })?;
        Ok((scope.end(), owner))
    }

    pub fn delete(&self, key: &str, source: Option<Ident>) -> Result<(bool, u32, Ident)> {
        let start = self.entry_node(source)?;
        let scope = self.network.begin_op();
        let owner = self.find_owner(start, hash_key(key, self.space))?;
        let removed = self
            .network
            .deliver(start, owner, Request::Delete { key: key.to_string() })?
            .applied()?;
        Ok((removed, scope.end(), owner))
    }

    pub fn update(
        &self,
        key: &str,
        value: Value,
        source: Option<Ident>,
    ) -> Result<(bool, u32, Ident)> {
        let start = self.entry_node(source)?;
        let scope = self.network.begin_op();
        let owner = self.find_owner(start, hash_key(key, self.space))?;
        let replaced = self
            .network
            .deliver(start, owner, Request::Update { key: key.to_string(), value })?
            .applied()?;
        Ok((replaced, scope.end(), owner))
    }

    /// Splices a node into the ring per the join protocol: locate its
    /// successor by routing, link it in, pull the `(predecessor, new]` key
    /// range over, then rebuild fingers from the live set.
    pub fn join(&mut self, new_id: Ident) -> Result<(u32, Ident)> {
        let new_id = self.space.wrap(new_id);
        if self.peers.contains_key(&new_id) {
            return Err(Error::DuplicateId(new_id));
        }

        let scope = self.network.begin_op();
        let seed = self.seed();
        let peer = ChordPeer::new(new_id, self.space, self.branching, self.network.clone());
        self.network.register(new_id, peer.clone());

        // Nothing references the new node yet, so a failed resolution can
        // still back out without a trace.
        let located = self.find_owner(seed, new_id).and_then(|successor| {
            let predecessor = self
                .network
                .deliver(new_id, successor, Request::Predecessor)?
                .owner()?;
            Ok((successor, predecessor))
        });
        let (successor, predecessor) = match located {
            Ok(found) => found,
            Err(e) => {
                self.network.unregister(new_id);
                return Err(e);
            }
        };

        self.peers.insert(new_id, peer);
        self.rebuild_topology();

        let items = self
            .network
            .deliver(new_id, successor, Request::TransferRange { start: predecessor, end: new_id })?
            .items()?;
        let moved = items.len();
        self.network.deliver(successor, new_id, Request::Absorb { items })?;

        tracing::info!(node = new_id, successor, moved, "node joined the ring");
        Ok((scope.end(), successor))
    }

    /// Removes a node, handing its whole index to its successor before the
    /// ring is relinked and fingers are rebuilt.
    pub fn leave(&mut self, id: Ident) -> Result<(u32, Ident)> {
        let id = self.space.wrap(id);
        let peer = self.peers.get(&id).cloned().ok_or(Error::UnknownNode(id))?;
        if self.peers.len() == 1 {
            return Err(Error::EmptyOverlayForbidden);
        }

        let scope = self.network.begin_op();
        let successor = peer.with_state(|state| state.successor());
        let items = peer.with_index(|index| index.drain());
        let moved = items.len();
        self.network.deliver(id, successor, Request::Absorb { items })?;

        self.network.unregister(id);
        self.peers.remove(&id);
        self.rebuild_topology();

        tracing::info!(node = id, successor, moved, "node left the ring");
        Ok((scope.end(), successor))
    }

    /// Recomputes successor lists, predecessors and fingers for every peer
    /// from the sorted live set.
    fn rebuild_topology(&mut self) {
        let ids: Vec<Ident> = self.peers.keys().copied().collect();
        let n = ids.len();
        // Default successor-list length: ceil(log2 N), at least one entry.
        let redundancy = self
            .successor_len
            .unwrap_or_else(|| (usize::BITS - (n.max(2) - 1).leading_zeros()) as usize)
            .max(1);

        for (rank, &id) in ids.iter().enumerate() {
            let successors = if n == 1 {
                vec![id]
            } else {
                (1..=redundancy.min(n - 1))
                    .map(|step| ids[(rank + step) % n])
                    .collect()
            };
            let predecessor = ids[(rank + n - 1) % n];
            let fingers: Vec<FingerEntry> = (0..self.space.bits())
                .map(|k| {
                    let start = self.space.wrap(id.wrapping_add(1u64 << k));
                    FingerEntry {
                        start,
                        node: Self::successor_of(start, &ids),
                    }
                })
                .collect();

            if let Some(peer) = self.peers.get(&id) {
                peer.with_state(|state| {
                    state.successors = successors;
                    state.predecessor = predecessor;
                    state.fingers = fingers;
                });
            }
        }
    }

    /// Successor by binary search over the sorted live list.
    fn successor_of(target: Ident, sorted_ids: &[Ident]) -> Ident {
        let slot = sorted_ids.partition_point(|&id| id < target);
        if slot == sorted_ids.len() {
            sorted_ids[0]
        } else {
            sorted_ids[slot]
        }
    }
}
