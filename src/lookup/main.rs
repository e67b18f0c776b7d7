//! Boundary lookup for a single point.
//!
//! Loads the requested jurisdiction scopes from a source catalog, then
//! reports every boundary containing the point as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use precinct_lookup::config::Config;
use precinct_lookup::load::{LayerOrigin, LayerStatus, Loader};
use precinct_lookup::models::JurisdictionScope;
use precinct_lookup::registry::SourceRegistry;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "lookup")]
#[command(about = "Resolve a point to the administrative boundaries containing it")]
struct Args {
    /// Longitude (WGS84)
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,

    /// Latitude (WGS84)
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,

    /// Source catalog TOML (defaults to the built-in Washington catalog)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Runtime configuration TOML
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scope to load: state, county:<name> or city:<name> (repeatable)
    #[arg(long = "scope", default_value = "state")]
    scopes: Vec<JurisdictionScope>,

    /// Only report these boundary types (repeatable)
    #[arg(long = "type")]
    types: Vec<String>,

    /// Ignore cached layers
    #[arg(long)]
    refresh: bool,

    /// Fail if any layer fails to load
    #[arg(long)]
    strict: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let registry = match &args.catalog {
        Some(path) => SourceRegistry::load_from_file(path)
            .with_context(|| format!("Failed to load catalog from {}", path.display()))?,
        None => SourceRegistry::washington().context("Built-in catalog is invalid")?,
    };

    info!(
        "Catalog {}: {} sources, loading {}",
        registry.state(),
        registry.descriptors().len(),
        args.scopes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let loader = Loader::new(&config)
        .context("Failed to set up loader")?
        .with_refresh(args.refresh);

    // Ctrl-C stops issuing new requests
    let cancel = loader.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; aborting load");
            cancel.cancel();
        }
    });

    let outcome = loader.load(&registry, &args.scopes).await;

    for layer in &outcome.report.layers {
        match &layer.status {
            LayerStatus::Loaded { boundaries, origin } => {
                let origin = match origin {
                    LayerOrigin::Fetched => "fetched",
                    LayerOrigin::Cache => "cache",
                };
                info!("{}: {} boundaries ({})", layer.key, boundaries, origin);
            }
            LayerStatus::Failed(e) => warn!("{}: FAILED: {}", layer.key, e),
        }
    }

    let catalog = if args.strict {
        outcome.into_strict().context("Catalog load incomplete")?
    } else {
        outcome.catalog
    };

    let result = if args.types.is_empty() {
        catalog.lookup(args.lon, args.lat)
    } else {
        let types: Vec<&str> = args.types.iter().map(String::as_str).collect();
        catalog.lookup_scoped(args.lon, args.lat, &types)
    }
    .with_context(|| format!("Lookup at ({}, {}) failed", args.lon, args.lat))?;

    for boundary_type in result.unavailable() {
        warn!(
            "{} coverage is incomplete; an empty match may be a failed layer",
            boundary_type
        );
    }
    for boundary_type in result.overlapping_types() {
        warn!(
            "{} boundaries overlap at this point ({} matches)",
            boundary_type,
            result.get(boundary_type).len()
        );
    }

    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
