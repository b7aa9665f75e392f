//! Experiment Runner
//!
//! Drives the Chord vs. Pastry comparison: builds both overlays over the
//! same node set and dataset, replays the same seeded workload against
//! each, and folds the observer stream into per-operation hop statistics.
//! Result serialization and plotting live outside the core.

use crate::api::{OpKind, OpObserver, Overlay, OverlayConfig, Protocol};
use crate::dataset::{popularity_of, sample_dataset};
use crate::error::Error;
use crate::experiments::workload::{DEFAULT_MIX, Operation, WorkloadGenerator};
use crate::ident::derived_node_ids;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Running hop statistics for one operation kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct HopStats {
    pub ops: u64,
    pub total_hops: u64,
    pub min_hops: u32,
    pub max_hops: u32,
}

impl HopStats {
    pub(crate) fn fold(&mut self, hops: u32) {
        if self.ops == 0 {
            self.min_hops = hops;
            self.max_hops = hops;
        } else {
            self.min_hops = self.min_hops.min(hops);
            self.max_hops = self.max_hops.max(hops);
        }
        self.ops += 1;
        self.total_hops += u64::from(hops);
    }

    pub fn mean_hops(&self) -> f64 {
        if self.ops == 0 {
            0.0
        } else {
            self.total_hops as f64 / self.ops as f64
        }
    }
}

/// Observer folding every completed operation into per-kind statistics.
#[derive(Default)]
pub struct HopAggregator {
    cells: Mutex<BTreeMap<OpKind, HopStats>>,
}

impl HopAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> BTreeMap<OpKind, HopStats> {
        self.cells.lock().clone()
    }
}

impl OpObserver for HopAggregator {
    fn record(&self, _protocol: Protocol, op: OpKind, hops: u32, _nodes: usize, _items: usize) {
        self.cells.lock().entry(op).or_default().fold(hops);
    }
}

/// One aggregated comparison cell.
#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub protocol: Protocol,
    pub operation: OpKind,
    pub nodes: usize,
    pub items: usize,
    pub stats: HopStats,
}

pub struct ExperimentConfig {
    pub overlay: OverlayConfig,
    pub node_counts: Vec<usize>,
    pub num_items: usize,
    pub num_operations: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            overlay: OverlayConfig::default(),
            node_counts: vec![50, 100, 200],
            num_items: 1000,
            num_operations: 500,
        }
    }
}

pub struct ExperimentRunner {
    config: ExperimentConfig,
}

impl ExperimentRunner {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    /// Runs the full comparison: one shared dataset and workload, both
    /// protocols at every node count.
    pub fn run(&self) -> anyhow::Result<Vec<SummaryRow>> {
        let seed = self.config.overlay.seed;
        let records = sample_dataset(self.config.num_items, &mut StdRng::seed_from_u64(seed));
        let keys: Vec<String> = records.iter().map(|(key, _)| key.clone()).collect();
        let operations =
            WorkloadGenerator::new(seed).mixed(self.config.num_operations, &keys, &DEFAULT_MIX);

        let mut rows = Vec::new();
        for &nodes in &self.config.node_counts {
            tracing::info!(nodes, "running comparison");
            for protocol in [Protocol::Chord, Protocol::Pastry] {
                rows.extend(self.run_single(protocol, nodes, &records, &operations)?);
            }
        }
        Ok(rows)
    }

    /// One protocol at one node count, replaying the shared workload.
    pub fn run_single(
        &self,
        protocol: Protocol,
        nodes: usize,
        records: &[(String, Value)],
        operations: &[Operation],
    ) -> anyhow::Result<Vec<SummaryRow>> {
        let node_ids = derived_node_ids(nodes, self.config.overlay.space());
        let mut overlay = Overlay::build(protocol, &self.config.overlay, &node_ids, records)?;

        let aggregator = Arc::new(HopAggregator::new());
        overlay.set_observer(aggregator.clone());

        // Reseeded per protocol run so both replays make the same draws.
        let mut draw_rng = StdRng::seed_from_u64(self.config.overlay.seed);
        let mut skipped = 0usize;
        for operation in operations {
            if let Err(e) = self.execute(&mut overlay, operation, &mut draw_rng) {
                match e {
                    Error::DuplicateId(_) | Error::UnknownNode(_) | Error::EmptyOverlayForbidden => {
                        skipped += 1;
                        tracing::debug!(op = %operation.kind, "skipped: {e}");
                    }
                    other => return Err(other.into()),
                }
            }
        }
        if skipped > 0 {
            tracing::info!(protocol = %protocol, skipped, "operations skipped");
        }

        let items = overlay.item_count();
        let rows = aggregator
            .stats()
            .into_iter()
            .map(|(operation, stats)| SummaryRow {
                protocol,
                operation,
                nodes,
                items,
                stats,
            })
            .collect();
        Ok(rows)
    }

    fn execute(
        &self,
        overlay: &mut Overlay,
        operation: &Operation,
        draw_rng: &mut StdRng,
    ) -> crate::error::Result<()> {
        let key = operation.key.as_deref().unwrap_or_default();
        match operation.kind {
            OpKind::Lookup => {
                overlay.lookup(key, None)?;
            }
            OpKind::Insert => {
                let value = operation.value.clone().unwrap_or(Value::Null);
                overlay.insert(key, value, None)?;
            }
            OpKind::Delete => {
                overlay.delete(key, None)?;
            }
            OpKind::Update => {
                let value = operation.value.clone().unwrap_or(Value::Null);
                overlay.update(key, value, None)?;
            }
            OpKind::Join => {
                let id = operation.node_id.unwrap_or_default();
                overlay.join(id)?;
            }
            OpKind::Leave => {
                let victim = match operation.node_id {
                    Some(id) => id,
                    None => {
                        let live = overlay.node_ids();
                        live[draw_rng.gen_range(0..live.len())]
                    }
                };
                overlay.leave(victim)?;
            }
        }
        Ok(())
    }
}

/// Prints the per-operation comparison table.
pub fn print_summary(rows: &[SummaryRow]) {
    let mut cells: BTreeMap<(OpKind, usize), BTreeMap<Protocol, &SummaryRow>> = BTreeMap::new();
    for row in rows {
        cells
            .entry((row.operation, row.nodes))
            .or_default()
            .insert(row.protocol, row);
    }

    println!("{:-<72}", "");
    println!(
        "{:<10} {:>6}  {:>18}  {:>18}  {:>8}",
        "operation", "nodes", "chord avg (min/max)", "pastry avg (min/max)", "ratio"
    );
    println!("{:-<72}", "");
    for ((operation, nodes), protocols) in &cells {
        let (Some(chord), Some(pastry)) =
            (protocols.get(&Protocol::Chord), protocols.get(&Protocol::Pastry))
        else {
            continue;
        };
        let ratio = if pastry.stats.mean_hops() > 0.0 {
            chord.stats.mean_hops() / pastry.stats.mean_hops()
        } else {
            0.0
        };
        println!(
            "{:<10} {:>6}  {:>9.2} ({:>2}/{:<2})  {:>9.2} ({:>2}/{:<2})  {:>8.2}",
            operation.tag(),
            nodes,
            chord.stats.mean_hops(),
            chord.stats.min_hops,
            chord.stats.max_hops,
            pastry.stats.mean_hops(),
            pastry.stats.min_hops,
            pastry.stats.max_hops,
            ratio
        );
    }
    println!("{:-<72}", "");
}

/// Looks the popularity of `titles` up concurrently, one overlay lookup
/// per title across a small worker pool. Hop scopes are thread-local, so
/// each worker accounts its own lookups; the return carries the summed
/// hops next to the per-title popularity.
pub fn lookup_popularity_concurrent(
    overlay: &Overlay,
    titles: &[String],
) -> crate::error::Result<(HashMap<String, f64>, u64)> {
    let workers = titles.len().clamp(1, 8);
    let chunk = titles.len().div_ceil(workers).max(1);

    let outcomes = std::thread::scope(|scope| {
        let handles: Vec<_> = titles
            .chunks(chunk)
            .map(|batch| {
                scope.spawn(move || -> crate::error::Result<(Vec<(String, f64)>, u64)> {
                    let mut found = Vec::with_capacity(batch.len());
                    let mut hops = 0u64;
                    for title in batch {
                        let report = overlay.lookup(title, None)?;
                        let popularity = match &report.outcome {
                            crate::api::OpOutcome::Values(Some(values)) => values
                                .iter()
                                .map(popularity_of)
                                .fold(0.0f64, f64::max),
                            _ => 0.0,
                        };
                        found.push((title.clone(), popularity));
                        hops += u64::from(report.hops);
                    }
                    Ok((found, hops))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(Err(Error::Protocol("worker panicked"))))
            .collect::<Vec<_>>()
    });

    let mut popularity = HashMap::new();
    let mut total_hops = 0u64;
    for outcome in outcomes {
        let (found, hops) = outcome?;
        popularity.extend(found);
        total_hops += hops;
    }
    Ok((popularity, total_hops))
}
