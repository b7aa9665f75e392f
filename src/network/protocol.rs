//! Overlay Message Protocol
//!
//! Requests a node endpoint can serve and the responses it answers with.
//! Both overlays share one request vocabulary: routing queries
//! (`FindSuccessor` for Chord, `Route` for Pastry), data operations applied
//! at the owner, and the bulk transfers join/leave move keys with.

use crate::error::{Error, Result};
use crate::ident::Ident;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub enum Request {
    /// Chord: resolve the successor of `target`, recursing along fingers.
    FindSuccessor { target: Ident },
    /// Chord: the node's current predecessor.
    Predecessor,
    /// Pastry: route toward the node numerically closest to `target`.
    /// `visited` carries the hops already taken by this operation so
    /// degenerate routing state cannot loop.
    Route { target: Ident, visited: HashSet<Ident> },
    /// Pastry: the node's current leaf set.
    LeafSet,

    Lookup { key: String },
    Insert { key: String, value: Value },
    Delete { key: String },
    Update { key: String, value: Value },

    /// Yield every entry whose key id falls in the half-open ring interval
    /// `(start, end]`.
    TransferRange { start: Ident, end: Ident },
    /// Yield every entry whose key id is circularly closer to `candidate`
    /// than to the serving node.
    TransferCloser { candidate: Ident },
    /// Yield everything; used by a departing node.
    DrainAll,
    /// Accept transferred entries into the local index.
    Absorb { items: Vec<(String, Vec<Value>)> },
}

#[derive(Debug, Clone)]
pub enum Response {
    Owner(Ident),
    Nodes(Vec<Ident>),
    Values(Option<Vec<Value>>),
    Applied(bool),
    Items(Vec<(String, Vec<Value>)>),
    Done,
}

impl Response {
    pub fn owner(self) -> Result<Ident> {
        match self {
            Response::Owner(id) => Ok(id),
            _ => Err(Error::Protocol("expected an owner id")),
        }
    }

    pub fn nodes(self) -> Result<Vec<Ident>> {
        match self {
            Response::Nodes(ids) => Ok(ids),
            _ => Err(Error::Protocol("expected a node list")),
        }
    }

    pub fn values(self) -> Result<Option<Vec<Value>>> {
        match self {
            Response::Values(values) => Ok(values),
            _ => Err(Error::Protocol("expected a value list")),
        }
    }

    pub fn applied(self) -> Result<bool> {
        match self {
            Response::Applied(done) => Ok(done),
            _ => Err(Error::Protocol("expected an applied flag")),
        }
    }

    pub fn items(self) -> Result<Vec<(String, Vec<Value>)>> {
        match self {
            Response::Items(items) => Ok(items),
            _ => Err(Error::Protocol("expected transferred items")),
        }
    }
}
