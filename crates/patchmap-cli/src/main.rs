use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "patchmap",
    about = "patchmap: distribute grid patches over an SPMD process group",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign work items to workers across simulated ranks.
    ///
    /// Every rank runs its own distribution manager on the same input; the
    /// command fails if any two ranks disagree.
    Assign {
        /// JSON array of { "weight": u64, "anchor": [x, y, z] }
        #[arg(short, long)]
        items: PathBuf,
        /// Number of workers to distribute over
        #[arg(short, long)]
        workers: usize,
        /// Simulated ranks (default: one per worker)
        #[arg(short, long)]
        ranks: Option<usize>,
        /// TOML file with a [distribution] table
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the configured strategy (ROUNDROBIN, KNAPSACK, SFC, PFC)
        #[arg(short, long)]
        strategy: Option<String>,
        /// Override the configured topology description
        #[arg(short, long)]
        topology: Option<PathBuf>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Build the topology directory and print every rank's placement.
    Topology {
        /// Topology description (JSON)
        #[arg(short, long)]
        grid: PathBuf,
        /// Simulated ranks
        #[arg(short, long)]
        ranks: usize,
        /// Node id of each rank, comma separated (default: rank number)
        #[arg(short, long, value_delimiter = ',')]
        nodes: Vec<i64>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "patchmap=info".parse().unwrap_or_default()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Assign {
            items,
            workers,
            ranks,
            config,
            strategy,
            topology,
            format,
        } => {
            let opts = commands::assign::AssignOptions {
                items,
                workers,
                ranks,
                config,
                strategy,
                topology,
            };
            commands::assign::assign(opts, &format).await
        }
        Commands::Topology {
            grid,
            ranks,
            nodes,
            format,
        } => commands::topology::topology(&grid, ranks, &nodes, &format).await,
    }
}
