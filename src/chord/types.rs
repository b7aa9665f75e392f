use crate::ident::{IdSpace, Ident};

/// One finger table row.
/// `start` is fixed at `(self + 2^k) mod 2^m`; `node` is the current
/// successor of `start` and is rewritten on every topology rebuild.
#[derive(Debug, Clone, Copy)]
pub struct FingerEntry {
    pub start: Ident,
    pub node: Ident,
}

/// Routing state of one ring member.
#[derive(Debug, Clone)]
pub struct ChordState {
    /// The next ring members clockwise; `successors[0]` is the operative
    /// successor, the tail is redundancy refreshed on rebuild.
    pub successors: Vec<Ident>,
    pub predecessor: Ident,
    /// `m` fingers, entry `k` targeting `(self + 2^k) mod 2^m`.
    pub fingers: Vec<FingerEntry>,
}

impl ChordState {
    /// Fresh state for a node that only knows itself.
    pub fn solo(id: Ident, space: IdSpace) -> Self {
        let fingers = (0..space.bits())
            .map(|k| FingerEntry {
                start: space.wrap(id.wrapping_add(1u64 << k)),
                node: id,
            })
            .collect();
        Self {
            successors: vec![id],
            predecessor: id,
            fingers,
        }
    }

    pub fn successor(&self) -> Ident {
        *self.successors.first().unwrap_or(&self.predecessor)
    }
}
