use anyhow::Result;
use dht_compare::api::{Overlay, OverlayConfig, Protocol};
use dht_compare::dataset::{popular_titles, sample_dataset};
use dht_compare::experiments::runner::{
    ExperimentConfig, ExperimentRunner, lookup_popularity_concurrent, print_summary,
};
use dht_compare::ident::derived_node_ids;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut node_counts: Vec<usize> = vec![50, 100, 200];
    let mut num_items = 1000usize;
    let mut num_operations = 500usize;
    let mut bits = 16u32;
    let mut seed = 42u64;
    let mut k_popular = 10usize;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--nodes" => {
                node_counts = args[i + 1]
                    .split(',')
                    .filter_map(|part| part.trim().parse().ok())
                    .collect();
                i += 2;
            }
            "--items" => {
                num_items = args[i + 1].parse()?;
                i += 2;
            }
            "--ops" => {
                num_operations = args[i + 1].parse()?;
                i += 2;
            }
            "--bits" => {
                bits = args[i + 1].parse()?;
                i += 2;
            }
            "--seed" => {
                seed = args[i + 1].parse()?;
                i += 2;
            }
            "--top" => {
                k_popular = args[i + 1].parse()?;
                i += 2;
            }
            "--help" | "-h" => {
                eprintln!(
                    "Usage: {} [--nodes 50,100,200] [--items 1000] [--ops 500] [--bits 16] [--seed 42] [--top 10]",
                    args[0]
                );
                return Ok(());
            }
            _ => {
                i += 1;
            }
        }
    }

    if node_counts.is_empty() {
        anyhow::bail!("--nodes needs at least one node count");
    }

    let overlay_config = OverlayConfig {
        bits,
        seed,
        ..OverlayConfig::default()
    };
    overlay_config.validate()?;

    tracing::info!(?node_counts, num_items, num_operations, bits, seed, "starting comparison");

    let runner = ExperimentRunner::new(ExperimentConfig {
        overlay: overlay_config.clone(),
        node_counts,
        num_items,
        num_operations,
    });
    let rows = runner.run()?;

    println!("\nCHORD vs PASTRY");
    print_summary(&rows);

    // The K-concurrent-popularity workload on a fresh mid-size overlay.
    let records = sample_dataset(num_items, &mut StdRng::seed_from_u64(seed));
    let top = popular_titles(&records, k_popular);
    let node_ids = derived_node_ids(50, overlay_config.space());

    println!("\nTop {k_popular} popularity lookups ({} titles, 50 nodes):", top.len());
    for protocol in [Protocol::Chord, Protocol::Pastry] {
        let overlay = Overlay::build(protocol, &overlay_config, &node_ids, &records)?;
        let (popularity, hops) = lookup_popularity_concurrent(&overlay, &top)?;
        let mut ranked: Vec<(&String, f64)> =
            popularity.iter().map(|(title, pop)| (title, *pop)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        println!("  {protocol}: {hops} hops total");
        for (title, pop) in ranked {
            println!("    {pop:>6.2}  {title}");
        }
    }

    Ok(())
}
