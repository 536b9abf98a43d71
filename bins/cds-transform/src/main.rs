//! # cds-transform
//!
//! Pipeline A: reads a mapping document and a table-loader document, then for each resource
//! mapping loads its tables, joins them, walks the mapping template over every row, and
//! publishes the constructed resources to the sink (HTTP upsert and/or NDJSON append).
//!
//! State machine: `Init -> LoadConfig -> (LoadTables -> Join -> Map -> Sink)* -> Done`, with
//! `LoadTables...Sink` scoped to one resource mapping. A fatal error terminates the owning
//! mapping only; the run continues with the next one.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use cds_core::config::MappingConfig;
use cds_io::{LoaderRegistry, ResourceSink};
use cds_tx::{DefaultResourceConstructor, MappingEngine, PluginHost};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for the mapping-engine pipeline runner.
#[derive(Parser, Debug)]
#[command(name = "cds-transform")]
#[command(about = "Joins warehouse tables, applies the mapping engine, publishes resources")]
struct Args {
    /// Mapping document describing resource mappings (resourceType/usedTables/joinOn/fields).
    #[arg(long)]
    config_path: PathBuf,

    /// Table-loader document (per-table file name, CSV options, load strategy).
    #[arg(long)]
    table_loaders_path: PathBuf,

    /// Root directory containing the source CSV files.
    #[arg(long)]
    data_folder_path: PathBuf,

    /// Root directory for NDJSON output; disables NDJSON output when omitted.
    #[arg(long)]
    output_data_folder: Option<PathBuf>,

    /// Directories to scan for plugin dynamic libraries (processors/conditions/modifiers).
    #[arg(long = "processor-paths")]
    processor_paths: Vec<PathBuf>,

    /// Base URL of the resource sink; omit to skip HTTP upserts entirely.
    #[arg(long)]
    fhir_server_url: Option<String>,

    /// Forces HTTP upserts off even when `--fhir-server-url` is set.
    #[arg(long, default_value_t = false)]
    no_fhir_server: bool,

    /// Number of retries for a failing connection before giving up on one resource.
    #[arg(long, default_value_t = 2)]
    retry_count: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let cancel = CancellationToken::new();

    let run = run_pipeline(args, cancel.clone());
    tokio::select! {
        result = run => result,
        _ = signal::ctrl_c() => {
            info!("received Ctrl-C, cancelling pipeline");
            cancel.cancel();
            Ok(())
        }
    }
}

async fn run_pipeline(args: Args, cancel: CancellationToken) -> anyhow::Result<()> {
    let config = MappingConfig::load(&args.config_path, &args.table_loaders_path)?;
    info!(mappings = config.mappings().len(), "loaded mapping configuration");

    let mut plugin_host = PluginHost::new();
    for dir in &args.processor_paths {
        unsafe {
            if let Err(e) = plugin_host.load_dir(dir) {
                warn!(dir = %dir.display(), error = %e, "failed to load plugin directory");
            }
        }
    }

    let loader_registry = LoaderRegistry::new(args.data_folder_path.clone());
    let constructor = DefaultResourceConstructor;
    let sink = Arc::new(ResourceSink::new(
        args.fhir_server_url.clone(),
        args.no_fhir_server,
        args.retry_count,
        args.output_data_folder.clone(),
        cancel.clone(),
    ));

    for mapping in config.mappings() {
        if cancel.is_cancelled() {
            break;
        }
        if let Err(e) = run_mapping(mapping, &loader_registry, &config, &plugin_host, &constructor, &sink, &cancel).await {
            error!(resource_type = %mapping.resource_type, error = %e, "resource mapping failed, continuing with the next one");
        }
    }

    info!("pipeline run complete");
    Ok(())
}

async fn run_mapping(
    mapping: &cds_core::config::ResourceMapping,
    loader_registry: &LoaderRegistry,
    config: &MappingConfig,
    plugin_host: &PluginHost,
    constructor: &DefaultResourceConstructor,
    sink: &Arc<ResourceSink>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let tables = loader_registry.load_tables(&mapping.used_tables, config.table_loaders())?;
    let joined = cds_tx::plan_joins(&tables, &mapping.used_tables, &mapping.join_on)?;
    info!(resource_type = %mapping.resource_type, rows = joined.rows.len(), "joined tables");

    let engine = MappingEngine::new(plugin_host, constructor);

    for (row_index, row) in joined.rows.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        match engine.apply(&mapping.resource_type, &mapping.fields, row, row_index) {
            Ok(resource) => {
                let outcome = sink.publish(&mapping.resource_type, &resource.into_value()).await;
                if !outcome.http_sent && !outcome.ndjson_written {
                    warn!(resource_type = %mapping.resource_type, row_index, "resource was neither sent nor written");
                }
            }
            // Unknown processor references are fatal for the whole mapping; every other
            // row-scope error is logged and only that row is skipped.
            Err(e @ cds_core::CdsError::UnknownProcessor(_)) => return Err(e.into()),
            Err(e) => {
                warn!(resource_type = %mapping.resource_type, row_index, error = %e, "skipping row");
            }
        }
    }

    Ok(())
}
