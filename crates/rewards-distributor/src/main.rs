//! Liquidity mining reward distributor
//!
//! Fetches a campaign's starting state and events, replays them and writes
//! the per-user rewards.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rewards_distributor::{Distributor, DistributorConfig, HttpTransport};

#[derive(Parser, Debug)]
#[command(name = "rewards-distributor")]
#[command(about = "Replay a liquidity mining campaign and compute user rewards")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "distributor.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    /// Dry run mode (validate config and exit)
    #[arg(long)]
    dry_run: bool,

    /// Override the output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DistributorConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if let Some(log_level) = cli.log_level {
        config.logging.log_level = log_level;
    }
    if let Some(output_dir) = cli.output_dir {
        config.paths.output_dir = output_dir;
    }

    init_logging(&config);

    info!("Starting rewards distributor");
    info!(
        "Campaign: blocks {}..={}, {} rewards, pool {}",
        config.campaign.start_block,
        config.campaign.end_block,
        config.campaign.reward_amount,
        config.campaign.pool_address
    );
    info!("Output directory: {}", config.paths.output_dir.display());

    if cli.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        return Ok(());
    }

    if config.paths.exclusion_list.is_none() {
        warn!("No exclusion list configured, every account is eligible");
    }

    let transport = Arc::new(HttpTransport::new()?);
    let distributor = Distributor::new(config, transport);

    let report = distributor.run().await?;

    info!(
        "Distributed {} of {} to {} users over {} events",
        report.summary.distributed, report.summary.total_budget, report.users, report.events
    );
    Ok(())
}

fn init_logging(config: &DistributorConfig) {
    let log_level = config
        .logging
        .log_level
        .parse()
        .unwrap_or(tracing::Level::INFO);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("rewards_distributor={log_level},rewards_core={log_level}").into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
