use super::peer::PastryPeer;
use crate::error::{Error, Result};
use crate::ident::{IdSpace, Ident, hash_key};
use crate::network::Network;
use crate::network::protocol::Request;

use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// The Pastry overlay: peers keyed by ring id plus the shared fabric.
/// Mirrors the Chord surface; join and leave take `&mut self` for
/// exclusive topology access.
#[derive(Debug)]
pub struct Pastry {
    space: IdSpace,
    digit_bits: u32,
    leaf_len: usize,
    branching: usize,
    network: Arc<Network>,
    peers: BTreeMap<Ident, Arc<PastryPeer>>,
}

impl Pastry {
    pub fn new(
        space: IdSpace,
        digit_bits: u32,
        leaf_len: usize,
        branching: usize,
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
            let peer = PastryPeer::new(id, space, digit_bits, branching, network.clone());
            network.register(id, peer.clone());
            peers.insert(id, peer);
        }

        let mut pastry = Self {
            space,
            digit_bits,
            leaf_len,
            branching,
            network,
            peers,
        };
        pastry.rebuild_topology();
        tracing::info!(
            nodes = pastry.peers.len(),
            bits = space.bits(),
            base = 1u32 << digit_bits,
            "pastry mesh built"
        );
        Ok(pastry)
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

    pub fn item_count(&self) -> usize {
        self.peers
            .values()
            .map(|peer| peer.with_index(|index| index.len()))
            .sum()
    }

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

    #[cfg(test)]
    pub(crate) fn peer(&self, id: Ident) -> Option<&Arc<PastryPeer>> {
        self.peers.get(&self.space.wrap(id))
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

    /// The live id circularly closest to `key_id`, ties to the smaller id.
    fn closest_live(&self, key_id: Ident) -> Ident {
        self.peers
            .keys()
            .copied()
            .min_by_key(|&id| (self.space.circular(id, key_id), id))
            .unwrap_or_default()
    }

    /// Resolves the owner of `key_id` starting from `start`; the entry
    /// delivery and every forward count one hop each.
    pub fn find_owner(&self, start: Ident, key_id: Ident) -> Result<Ident> {
        self.network
            .send(
                start,
                start,
                Request::Route { target: key_id, visited: HashSet::new() },
            )?
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

    /// Admits a node: route to its numerically closest neighbor (hops
    /// counted), rebuild routing state from the live set, then pull over
    /// exactly the keys that are now closer to the newcomer. Only the two
    /// id-adjacent neighbors can hold such keys.
    pub fn join(&mut self, new_id: Ident) -> Result<(u32, Ident)> {
        let new_id = self.space.wrap(new_id);
        if self.peers.contains_key(&new_id) {
            return Err(Error::DuplicateId(new_id));
        }

        let scope = self.network.begin_op();
        let seed = self.seed();
        let peer = PastryPeer::new(
            new_id,
            self.space,
            self.digit_bits,
            self.branching,
            self.network.clone(),
        );
        self.network.register(new_id, peer.clone());

        let closest = match self.find_owner(seed, new_id) {
            Ok(found) => found,
            Err(e) => {
                self.network.unregister(new_id);
                return Err(e);
            }
        };

        self.peers.insert(new_id, peer);
        self.rebuild_topology();

        let mut moved = 0usize;
        for neighbor in self.adjacent_neighbors(new_id) {
            let items = self
                .network
                .deliver(new_id, neighbor, Request::TransferCloser { candidate: new_id })?
                .items()?;
            moved += items.len();
            self.network.deliver(neighbor, new_id, Request::Absorb { items })?;
        }

        tracing::info!(node = new_id, closest, moved, "node joined the mesh");
        Ok((scope.end(), closest))
    }

    /// Removes a node and re-places every key it held on the live node now
    /// numerically closest to it.
    pub fn leave(&mut self, id: Ident) -> Result<(u32, Ident)> {
        let id = self.space.wrap(id);
        let peer = self.peers.get(&id).cloned().ok_or(Error::UnknownNode(id))?;
        if self.peers.len() == 1 {
            return Err(Error::EmptyOverlayForbidden);
        }

        let scope = self.network.begin_op();
        let orphaned = peer.with_index(|index| index.drain());
        let moved = orphaned.len();

        self.network.unregister(id);
        self.peers.remove(&id);
        self.rebuild_topology();

        // Group the orphaned entries per their new owner, then hand each
        // group over in one transfer.
        let mut regrouped: HashMap<Ident, Vec<(String, Vec<Value>)>> = HashMap::new();
        for (key, values) in orphaned {
            let owner = self.closest_live(hash_key(&key, self.space));
            regrouped.entry(owner).or_default().push((key, values));
        }
        let fallback = self.seed();
        for (owner, items) in regrouped {
            self.network.deliver(id, owner, Request::Absorb { items })?;
        }

        tracing::info!(node = id, moved, "node left the mesh");
        Ok((scope.end(), fallback))
    }

    /// The departing/joining node's neighbors in id order, deduplicated.
    fn adjacent_neighbors(&self, id: Ident) -> Vec<Ident> {
        let ids: Vec<Ident> = self.peers.keys().copied().collect();
        let n = ids.len();
        if n < 2 {
            return Vec::new();
        }
        let rank = ids.iter().position(|&node| node == id).unwrap_or(0);
        let below = ids[(rank + n - 1) % n];
        let above = ids[(rank + 1) % n];
        let mut neighbors = vec![below];
        if above != below && above != id {
            neighbors.push(above);
        }
        neighbors.retain(|&node| node != id);
        neighbors
    }

    /// Recomputes every peer's leaf set and routing matrix from the sorted
    /// live set.
    fn rebuild_topology(&mut self) {
        let ids: Vec<Ident> = self.peers.keys().copied().collect();
        let n = ids.len();
        let half = self.leaf_len / 2;
        let per_side = half.min(n.saturating_sub(1));
        let covers_ring = n.saturating_sub(1) <= self.leaf_len;
        let rows = self.space.digit_count(self.digit_bits);
        let cols = 1usize << self.digit_bits;

        for (rank, &id) in ids.iter().enumerate() {
            let leaf_lower: Vec<Ident> = (1..=per_side)
                .map(|step| ids[(rank + n - step) % n])
                .collect();
            let leaf_upper: Vec<Ident> = (1..=per_side)
                .map(|step| ids[(rank + step) % n])
                .collect();

            let mut routing = vec![vec![None::<Ident>; cols]; rows];
            for &other in &ids {
                if other == id {
                    continue;
                }
                let row = self.space.shared_prefix(id, other, self.digit_bits);
                if row >= rows {
                    continue;
                }
                let col = self.space.digit(other, row, self.digit_bits) as usize;
                let cell = &mut routing[row][col];
                let better = match *cell {
                    None => true,
                    Some(current) => {
                        let incoming = (self.space.circular(other, id), other);
                        let held = (self.space.circular(current, id), current);
                        incoming < held
                    }
                };
                if better {
                    *cell = Some(other);
                }
            }

            if let Some(peer) = self.peers.get(&id) {
                peer.with_state(|state| {
                    state.leaf_lower = leaf_lower;
                    state.leaf_upper = leaf_upper;
                    state.routing = routing;
                    state.covers_ring = covers_ring;
                });
            }
        }
    }
}
