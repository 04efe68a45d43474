use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use feedwall::config::{Config, FetchStrategy};
use feedwall::{build, feed, output};

#[derive(Parser, Debug)]
#[command(name = "feedwall", version, about = "Aggregate RSS/Atom feeds into paginated JSON")]
struct Args {
    /// Configuration file with the feed list and build settings
    #[arg(short, long, value_name = "FILE", default_value = "feedwall.toml")]
    config: PathBuf,

    /// Output directory (overrides `output_dir`)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Items per page (overrides `items_per_page`)
    #[arg(long, value_name = "N")]
    items_per_page: Option<usize>,

    /// Fetch feeds one at a time with a delay between requests
    #[arg(long)]
    serial: bool,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(args).await {
        tracing::error!(error = %format!("{e:#}"), "Build failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?;

    if let Some(dir) = args.output {
        config.output_dir = dir;
    }
    if let Some(n) = args.items_per_page {
        config.items_per_page = n;
    }
    if args.serial {
        config.fetch_strategy = FetchStrategy::Serialized;
    }
    config.validate().context("Invalid command-line override")?;

    if config.feeds.is_empty() {
        tracing::warn!(path = %args.config.display(), "No feeds configured, writing an empty site");
    }

    let client = feed::build_client(&config).context("Failed to create HTTP client")?;
    let result = build::run(&config, &client).await;

    let summary = output::write_artifacts(&result, &config.output_dir, config.per_feed_pages)
        .context("Failed to write artifacts")?;

    let metadata = &result.metadata;
    println!(
        "Built {} pages from {} items ({}/{} feeds ok) into {}",
        summary.pages_written,
        metadata.total_items,
        metadata.successful_feeds,
        metadata.total_feeds,
        config.output_dir.display()
    );
    Ok(())
}
