use crate::ident::Ident;

/// Routing state of one Pastry node.
#[derive(Debug, Clone)]
pub struct PastryState {
    /// Nearest live ids strictly below, nearest first (wrapping).
    pub leaf_lower: Vec<Ident>,
    /// Nearest live ids strictly above, nearest first (wrapping).
    pub leaf_upper: Vec<Ident>,
    /// `R[row][col]`: a live node sharing the first `row` digits with this
    /// node and carrying digit `col` at position `row`.
    pub routing: Vec<Vec<Option<Ident>>>,
    /// Set when the leaf set spans every other live node, which makes the
    /// leaf-range test trivially true.
    pub covers_ring: bool,
}

impl PastryState {
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            leaf_lower: Vec::new(),
            leaf_upper: Vec::new(),
            routing: vec![vec![None; cols]; rows],
            covers_ring: true,
        }
    }

    /// Both leaf halves, lower first.
    pub fn leaves(&self) -> impl Iterator<Item = Ident> + '_ {
        self.leaf_lower
            .iter()
            .chain(self.leaf_upper.iter())
            .copied()
    }

    /// Every populated routing matrix cell.
    pub fn matrix_nodes(&self) -> impl Iterator<Item = Ident> + '_ {
        self.routing
            .iter()
            .flat_map(|row| row.iter().flatten())
            .copied()
    }
}
