//! Workload Generator
//!
//! Produces the operation sequences the experiments replay against both
//! overlays. Generation is fully determined by the seed: the mix table is
//! ordered, so the same seed yields the same workload on every run.

use crate::api::OpKind;
use crate::ident::Ident;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};
use std::collections::HashSet;

/// One scripted operation. Data operations carry a key (and value);
/// `Join` carries the id to admit; `Leave` leaves the victim to the runner,
/// which draws a live node at execution time.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OpKind,
    pub key: Option<String>,
    pub value: Option<Value>,
    pub node_id: Option<Ident>,
}

impl Operation {
    fn keyed(kind: OpKind, key: String) -> Self {
        Self { kind, key: Some(key), value: None, node_id: None }
    }

    fn with_value(kind: OpKind, key: String, value: Value) -> Self {
        Self { kind, key: Some(key), value: Some(value), node_id: None }
    }

    fn membership(kind: OpKind, node_id: Option<Ident>) -> Self {
        Self { kind, key: None, value: None, node_id }
    }
}

/// Default operation mix: read-heavy with a churn tail.
pub const DEFAULT_MIX: [(OpKind, f64); 6] = [
    (OpKind::Lookup, 0.4),
    (OpKind::Insert, 0.2),
    (OpKind::Delete, 0.1),
    (OpKind::Update, 0.1),
    (OpKind::Join, 0.1),
    (OpKind::Leave, 0.1),
];

pub struct WorkloadGenerator {
    rng: StdRng,
    next_join_id: Ident,
}

impl WorkloadGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            next_join_id: 10_000,
        }
    }

    /// A mixed workload over the given key pool. Weights are normalized;
    /// delete prefers keys the workload itself inserted.
    pub fn mixed(
        &mut self,
        count: usize,
        keys: &[String],
        mix: &[(OpKind, f64)],
    ) -> Vec<Operation> {
        if keys.is_empty() || mix.is_empty() {
            return Vec::new();
        }
        let total: f64 = mix.iter().map(|(_, weight)| weight).sum();
        let mut inserted: HashSet<String> = HashSet::new();
        let mut operations = Vec::with_capacity(count);

        for _ in 0..count {
            let draw: f64 = self.rng.gen_range(0.0..total);
            let mut cumulative = 0.0;
            let mut kind = mix[0].0;
            for (candidate, weight) in mix {
                cumulative += weight;
                if draw <= cumulative {
                    kind = *candidate;
                    break;
                }
            }

            let operation = match kind {
                OpKind::Lookup => Operation::keyed(kind, self.pick(keys)),
                OpKind::Insert => {
                    let key = self.pick(keys);
                    inserted.insert(key.clone());
                    let value = json!({ "value": self.rng.gen_range(1..=10_000) });
                    Operation::with_value(kind, key, value)
                }
                OpKind::Delete => {
                    let key = if inserted.is_empty() {
                        self.pick(keys)
                    } else {
                        let mut pool: Vec<&String> = inserted.iter().collect();
                        pool.sort_unstable();
                        let picked = pool[self.rng.gen_range(0..pool.len())].clone();
                        inserted.remove(&picked);
                        picked
                    };
                    Operation::keyed(kind, key)
                }
                OpKind::Update => {
                    let key = self.pick(keys);
                    let value = json!({ "value": self.rng.gen_range(1..=10_000) });
                    Operation::with_value(kind, key, value)
                }
                OpKind::Join => {
                    let id = self.next_join_id;
                    self.next_join_id += 1;
                    Operation::membership(kind, Some(id))
                }
                OpKind::Leave => Operation::membership(kind, None),
            };
            operations.push(operation);
        }
        operations
    }

    /// Lookup-only workload.
    pub fn lookups(&mut self, count: usize, keys: &[String]) -> Vec<Operation> {
        if keys.is_empty() {
            return Vec::new();
        }
        (0..count)
            .map(|_| Operation::keyed(OpKind::Lookup, self.pick(keys)))
            .collect()
    }

    /// Insert workload covering every record once.
    pub fn inserts(records: &[(String, Value)]) -> Vec<Operation> {
        records
            .iter()
            .map(|(key, value)| Operation::with_value(OpKind::Insert, key.clone(), value.clone()))
            .collect()
    }

    /// Interleaved membership churn: joins use fresh ids past the existing
    /// maximum, leaves pick random current members.
    pub fn churn(&mut self, joins: usize, leaves: usize, existing: &[Ident]) -> Vec<Operation> {
        let mut members: Vec<Ident> = existing.to_vec();
        let mut next_id = members.iter().copied().max().map_or(1_000, |id| id + 1);
        let mut operations = Vec::new();

        for round in 0..joins.max(leaves) {
            if round < joins {
                operations.push(Operation::membership(OpKind::Join, Some(next_id)));
                members.push(next_id);
                next_id += 1;
            }
            if round < leaves && !members.is_empty() {
                let victim = members.swap_remove(self.rng.gen_range(0..members.len()));
                operations.push(Operation::membership(OpKind::Leave, Some(victim)));
            }
        }
        operations
    }

    fn pick(&mut self, keys: &[String]) -> String {
        keys[self.rng.gen_range(0..keys.len())].clone()
    }
}
