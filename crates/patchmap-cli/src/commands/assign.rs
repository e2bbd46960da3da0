use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use patchmap_cluster::LocalGroup;
use patchmap_core::{DistributionConfig, ItemSpec, Rank, Strategy, WorkItem, index_items};
use patchmap_distribution::{DistributionManager, DistributionMapping, PlacementReport};

use super::run_ranks;

pub struct AssignOptions {
    pub items: PathBuf,
    pub workers: usize,
    pub ranks: Option<usize>,
    pub config: Option<PathBuf>,
    pub strategy: Option<String>,
    pub topology: Option<PathBuf>,
}

/// What one simulated rank computed.
struct RankOutcome {
    rank: Rank,
    mapping: DistributionMapping,
    report: Option<PlacementReport>,
}

#[derive(Serialize)]
struct AssignOutput<'a> {
    strategy: Strategy,
    ranks: usize,
    fingerprint: String,
    owners: &'a [Rank],
    loads: Vec<u64>,
    report: Option<&'a PlacementReport>,
}

pub fn read_items(path: &Path) -> anyhow::Result<Vec<WorkItem>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let specs: Vec<ItemSpec> =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(index_items(&specs))
}

/// Load the configuration file, then apply command-line overrides.
pub fn resolve_config(opts: &AssignOptions) -> anyhow::Result<DistributionConfig> {
    let mut config = match &opts.config {
        Some(path) => DistributionConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => DistributionConfig::default(),
    };
    if let Some(name) = &opts.strategy {
        let strategy: Strategy = name.parse()?;
        config = config.with_strategy(strategy);
    }
    if let Some(path) = &opts.topology {
        config.proximity.topology_file = Some(path.clone());
    }
    Ok(config)
}

pub async fn assign(opts: AssignOptions, format: &str) -> anyhow::Result<()> {
    anyhow::ensure!(opts.workers > 0, "--workers must be at least 1");
    let items = Arc::new(read_items(&opts.items)?);
    let config = resolve_config(&opts)?;
    let strategy = config.strategy();
    let ranks = opts.ranks.unwrap_or(opts.workers).max(1);
    let workers = opts.workers;

    info!(items = items.len(), workers, ranks, %strategy, "simulating assignment");

    let shared_items = Arc::clone(&items);
    let outcomes = run_ranks(LocalGroup::new(ranks), move |comm| {
        let mut manager = DistributionManager::new(config.clone(), comm);
        let rank = manager.rank();
        let mapping = manager.define(&shared_items, workers)?;
        Ok(RankOutcome {
            rank,
            mapping,
            report: manager.last_report().cloned(),
        })
    })
    .await?;

    let first = outcomes.first().context("no ranks ran")?;
    for outcome in &outcomes {
        anyhow::ensure!(
            outcome.mapping.sentinel() == outcome.rank,
            "rank {} holds a map stamped for rank {}",
            outcome.rank,
            outcome.mapping.sentinel()
        );
        anyhow::ensure!(
            outcome.mapping.fingerprint() == first.mapping.fingerprint(),
            "rank {} disagrees with rank {} on the assignment",
            outcome.rank,
            first.rank
        );
    }

    let weights: Vec<u64> = items.iter().map(|it| it.weight).collect();
    let output = AssignOutput {
        strategy,
        ranks,
        fingerprint: first.mapping.fingerprint(),
        owners: first.mapping.owners(),
        loads: first.mapping.worker_loads(&weights, workers),
        report: first.report.as_ref(),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&output)?),
        _ => print_text(&output, &first.mapping),
    }
    Ok(())
}

fn print_text(output: &AssignOutput<'_>, mapping: &DistributionMapping) {
    print!("{mapping}");
    println!();
    match output.report {
        Some(report) => println!(
            "strategy: {} (ran {}), efficiency {:.4}",
            report.requested, report.strategy, report.efficiency
        ),
        None => println!("strategy: {} (single worker)", output.strategy),
    }
    for (worker, load) in output.loads.iter().enumerate() {
        println!("worker {worker}: {load}");
    }
    println!("{} ranks agree, fingerprint {}", output.ranks, output.fingerprint);
}
