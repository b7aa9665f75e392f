//! Network Fabric
//!
//! In-process delivery between overlay nodes with exact hop accounting.
//! Every node registers an endpoint under its ring identifier; `send`
//! resolves the target under a short registry lock, releases it, then
//! invokes the endpoint synchronously on the calling thread.
//!
//! ## Hop accounting
//! A hop is one counted `send` on behalf of a single operation. Operations
//! enter a scope with [`Network::begin_op`]; the counter is thread-local,
//! so independent lookups issued from worker threads account their hops
//! separately. `deliver` is the uncounted variant used for the final data
//! access at the owner and for control transfers.

pub mod protocol;

use crate::error::{Error, Result};
use crate::ident::Ident;
use dashmap::DashMap;
use protocol::{Request, Response};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

thread_local! {
    static ACTIVE_OP: Cell<Option<u32>> = const { Cell::new(None) };
}

/// A node-side message handler bound to a ring identifier.
pub trait Endpoint: Send + Sync {
    fn handle(&self, request: Request) -> Result<Response>;
}

/// Process-wide registry and delivery fabric.
pub struct Network {
    endpoints: DashMap<Ident, Arc<dyn Endpoint>>,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoints: DashMap::new(),
        })
    }

    pub fn register(&self, id: Ident, endpoint: Arc<dyn Endpoint>) {
        self.endpoints.insert(id, endpoint);
    }

    pub fn unregister(&self, id: Ident) {
        self.endpoints.remove(&id);
    }

    pub fn contains(&self, id: Ident) -> bool {
        self.endpoints.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Opens a per-operation hop counter on the calling thread. The scope
    /// restores whatever counter was active before it when dropped.
    pub fn begin_op(&self) -> HopScope {
        HopScope {
            previous: ACTIVE_OP.replace(Some(0)),
            _single_thread: PhantomData,
        }
    }

    /// Counted delivery: one hop on the active operation.
    pub fn send(&self, from: Ident, to: Ident, request: Request) -> Result<Response> {
        let endpoint = self.resolve(to)?;
        ACTIVE_OP.with(|counter| {
            if let Some(hops) = counter.get() {
                counter.set(Some(hops + 1));
            }
        });
        tracing::trace!(from, to, "hop");
        endpoint.handle(request)
    }

    /// Uncounted delivery: final data access and control transfers.
    pub fn deliver(&self, from: Ident, to: Ident, request: Request) -> Result<Response> {
        let endpoint = self.resolve(to)?;
        tracing::trace!(from, to, "deliver");
        endpoint.handle(request)
    }

    fn resolve(&self, to: Ident) -> Result<Arc<dyn Endpoint>> {
        // Clone the Arc out so the registry shard lock is released before
        // the endpoint runs.
        self.endpoints
            .get(&to)
            .map(|entry| entry.value().clone())
            .ok_or(Error::UnknownPeer(to))
    }
}

/// RAII handle over one operation's hop counter.
pub struct HopScope {
    previous: Option<u32>,
    _single_thread: PhantomData<*const ()>,
}

impl HopScope {
    /// Hops counted so far without closing the scope.
    pub fn hops(&self) -> u32 {
        ACTIVE_OP.get().unwrap_or(0)
    }

    /// Closes the scope and returns the hop count.
    pub fn end(self) -> u32 {
        ACTIVE_OP.get().unwrap_or(0)
    }
}

impl Drop for HopScope {
    fn drop(&mut self) {
        ACTIVE_OP.set(self.previous.take());
    }
}

#[cfg(test)]
mod tests;
