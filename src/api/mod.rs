//! Operation API
//!
//! The uniform surface the driver talks to: build, insert, lookup, delete,
//! update, join and leave, implemented over both overlays and dispatched
//! through a tagged variant. Every completed operation yields an
//! [`OpReport`] with its outcome, the exact hop count and the resolved
//! owner, and is announced to the installed [`OpObserver`].

use crate::chord::Chord;
use crate::error::{Error, Result};
use crate::ident::{IdSpace, Ident};
use crate::pastry::Pastry;

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Overlay construction parameters.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Identifier bit width `m`.
    pub bits: u32,
    /// Pastry digit width `b`.
    pub digit_bits: u32,
    /// Pastry leaf-set size `L` (half below, half above).
    pub leaf_len: usize,
    /// Chord successor-list length `r`; `None` picks `ceil(log2 N)` at
    /// build time.
    pub successor_len: Option<usize>,
    /// B+ tree branching factor `t` of every local index.
    pub branching: usize,
    /// Seed for any tie-break randomness a driver wants to derive.
    pub seed: u64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            bits: 16,
            digit_bits: 4,
            leaf_len: 8,
            successor_len: None,
            branching: 4,
            seed: 42,
        }
    }
}

impl OverlayConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8..=64).contains(&self.bits) {
            return Err(Error::InvalidConfig(format!(
                "identifier width m={} outside 8..=64",
                self.bits
            )));
        }
        if !(1..=8).contains(&self.digit_bits) {
            return Err(Error::InvalidConfig(format!(
                "digit width b={} outside 1..=8",
                self.digit_bits
            )));
        }
        if self.leaf_len < 4 || self.leaf_len % 2 != 0 {
            return Err(Error::InvalidConfig(format!(
                "leaf set size L={} must be even and at least 4",
                self.leaf_len
            )));
        }
        if self.successor_len == Some(0) {
            return Err(Error::InvalidConfig(
                "successor list length r must be at least 1".into(),
            ));
        }
        if self.branching < 3 {
            return Err(Error::InvalidConfig(format!(
                "branching factor t={} must be at least 3",
                self.branching
            )));
        }
        Ok(())
    }

    pub fn space(&self) -> IdSpace {
        IdSpace::new(self.bits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Chord,
    Pastry,
}

impl Protocol {
    pub fn tag(&self) -> &'static str {
        match self {
            Protocol::Chord => "chord",
            Protocol::Pastry => "pastry",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpKind {
    Lookup,
    Insert,
    Delete,
    Update,
    Join,
    Leave,
}

impl OpKind {
    pub const ALL: [OpKind; 6] = [
        OpKind::Lookup,
        OpKind::Insert,
        OpKind::Delete,
        OpKind::Update,
        OpKind::Join,
        OpKind::Leave,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            OpKind::Lookup => "lookup",
            OpKind::Insert => "insert",
            OpKind::Delete => "delete",
            OpKind::Update => "update",
            OpKind::Join => "join",
            OpKind::Leave => "leave",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What a completed operation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutcome {
    /// Lookup: the value list, or `None` for an absent key.
    Values(Option<Vec<Value>>),
    /// Delete/update: whether the key existed.
    Applied(bool),
    /// Insert, join, leave.
    Done,
}

/// Per-operation result: outcome, exact hop count, and the owner (for
/// membership changes, the contact node) resolved for it.
#[derive(Debug, Clone, PartialEq)]
pub struct OpReport {
    pub outcome: OpOutcome,
    pub hops: u32,
    pub owner: Ident,
}

/// Aggregation hook invoked once per completed operation.
pub trait OpObserver: Send + Sync {
    fn record(&self, protocol: Protocol, op: OpKind, hops: u32, nodes: usize, items: usize);
}

/// Protocol dispatch: a tagged variant, not a trait hierarchy.
pub enum OverlayKind {
    Chord(Chord),
    Pastry(Pastry),
}

/// A running overlay with the uniform operation surface.
pub struct Overlay {
    kind: OverlayKind,
    observer: Option<Arc<dyn OpObserver>>,
}

impl Overlay {
    pub fn chord(config: &OverlayConfig, node_ids: &[Ident]) -> Result<Self> {
        config.validate()?;
        let chord = Chord::new(
            config.space(),
            config.branching,
            config.successor_len,
            node_ids,
        )?;
        Ok(Self {
            kind: OverlayKind::Chord(chord),
            observer: None,
        })
    }

    pub fn pastry(config: &OverlayConfig, node_ids: &[Ident]) -> Result<Self> {
        config.validate()?;
        let pastry = Pastry::new(
            config.space(),
            config.digit_bits,
            config.leaf_len,
            config.branching,
            node_ids,
        )?;
        Ok(Self {
            kind: OverlayKind::Pastry(pastry),
            observer: None,
        })
    }

    /// Creates the overlay and loads the initial records, routing every
    /// insert from the overlay seed.
    pub fn build(
        protocol: Protocol,
        config: &OverlayConfig,
        node_ids: &[Ident],
        records: &[(String, Value)],
    ) -> Result<Self> {
        let overlay = match protocol {
            Protocol::Chord => Self::chord(config, node_ids)?,
            Protocol::Pastry => Self::pastry(config, node_ids)?,
        };
        for (key, value) in records {
            overlay.insert(key, value.clone(), None)?;
        }
        tracing::info!(
            protocol = %protocol,
            nodes = overlay.node_count(),
            items = overlay.item_count(),
            "overlay loaded"
        );
        Ok(overlay)
    }

    pub fn set_observer(&mut self, observer: Arc<dyn OpObserver>) {
        self.observer = Some(observer);
    }

    pub fn protocol(&self) -> Protocol {
        match &self.kind {
            OverlayKind::Chord(_) => Protocol::Chord,
            OverlayKind::Pastry(_) => Protocol::Pastry,
        }
    }

    pub fn space(&self) -> IdSpace {
        match &self.kind {
            OverlayKind::Chord(chord) => chord.space(),
            OverlayKind::Pastry(pastry) => pastry.space(),
        }
    }

    pub fn node_count(&self) -> usize {
        match &self.kind {
            OverlayKind::Chord(chord) => chord.node_count(),
            OverlayKind::Pastry(pastry) => pastry.node_count(),
        }
    }

    pub fn node_ids(&self) -> Vec<Ident> {
        match &self.kind {
            OverlayKind::Chord(chord) => chord.node_ids(),
            OverlayKind::Pastry(pastry) => pastry.node_ids(),
        }
    }

    pub fn contains(&self, id: Ident) -> bool {
        match &self.kind {
            OverlayKind::Chord(chord) => chord.contains(id),
            OverlayKind::Pastry(pastry) => pastry.contains(id),
        }
    }

    pub fn item_count(&self) -> usize {
        match &self.kind {
            OverlayKind::Chord(chord) => chord.item_count(),
            OverlayKind::Pastry(pastry) => pastry.item_count(),
        }
    }

    pub fn items_of(&self, id: Ident) -> Option<Vec<(String, Vec<Value>)>> {
        match &self.kind {
            OverlayKind::Chord(chord) => chord.items_of(id),
            OverlayKind::Pastry(pastry) => pastry.items_of(id),
        }
    }

    pub fn find_owner(&self, start: Ident, key_id: Ident) -> Result<Ident> {
        match &self.kind {
            OverlayKind::Chord(chord) => chord.find_owner(start, key_id),
            OverlayKind::Pastry(pastry) => pastry.find_owner(start, key_id),
        }
    }

    pub fn lookup(&self, key: &str, source: Option<Ident>) -> Result<OpReport> {
        let (values, hops, owner) = match &self.kind {
            OverlayKind::Chord(chord) => chord.lookup(key, source)?,
            OverlayKind::Pastry(pastry) => pastry.lookup(key, source)?,
        };
        self.notify(OpKind::Lookup, hops);
        Ok(OpReport {
            outcome: OpOutcome::Values(values),
            hops,
            owner,
        })
    }

    pub fn insert(&self, key: &str, value: Value, source: Option<Ident>) -> Result<OpReport> {
        let (hops, owner) = match &self.kind {
            OverlayKind::Chord(chord) => chord.insert(key, value, source)?,
            OverlayKind::Pastry(pastry) => pastry.insert(key, value, source)?,
        };
        self.notify(OpKind::Insert, hops);
        Ok(OpReport {
            outcome: OpOutcome::Done,
            hops,
            owner,
        })
    }

    pub fn delete(&self, key: &str, source: Option<Ident>) -> Result<OpReport> {
        let (removed, hops, owner) = match &self.kind {
            OverlayKind::Chord(chord) => chord.delete(key, source)?,
            OverlayKind::Pastry(pastry) => pastry.delete(key, source)?,
        };
        self.notify(OpKind::Delete, hops);
        Ok(OpReport {
            outcome: OpOutcome::Applied(removed),
            hops,
            owner,
        })
    }

    pub fn update(&self, key: &str, value: Value, source: Option<Ident>) -> Result<OpReport> {
        let (replaced, hops, owner) = match &self.kind {
            OverlayKind::Chord(chord) => chord.update(key, value, source)?,
            OverlayKind::Pastry(pastry) => pastry.update(key, value, source)?,
        };
        self.notify(OpKind::Update, hops);
        Ok(OpReport {
            outcome: OpOutcome::Applied(replaced),
            hops,
            owner,
        })
    }

    pub fn join(&mut self, new_id: Ident) -> Result<OpReport> {
        let (hops, contact) = match &mut self.kind {
            OverlayKind::Chord(chord) => chord.join(new_id)?,
            OverlayKind::Pastry(pastry) => pastry.join(new_id)?,
        };
        self.notify(OpKind::Join, hops);
        Ok(OpReport {
            outcome: OpOutcome::Done,
            hops,
            owner: contact,
        })
    }

    pub fn leave(&mut self, id: Ident) -> Result<OpReport> {
        let (hops, contact) = match &mut self.kind {
            OverlayKind::Chord(chord) => chord.leave(id)?,
            OverlayKind::Pastry(pastry) => pastry.leave(id)?,
        };
        self.notify(OpKind::Leave, hops);
        Ok(OpReport {
            outcome: OpOutcome::Done,
            hops,
            owner: contact,
        })
    }

    fn notify(&self, op: OpKind, hops: u32) {
        if let Some(observer) = &self.observer {
            observer.record(
                self.protocol(),
                op,
                hops,
                self.node_count(),
                self.item_count(),
            );
        }
    }
}

#[cfg(test)]
mod tests;
