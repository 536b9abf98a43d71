//! # cds-extract-cli
//!
//! Pipeline B: reads an extraction configuration and a corpus of resources already retrieved by
//! the external bulk-fetch client (one NDJSON file per resource type, Pipeline A's own sink
//! output shape), flattens each resource to a row, runs the three-scan extraction engine, and
//! writes the resulting OCEL artifact to disk.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use cds_core::extraction_config::ExtractionConfig;
use cds_core::model::Table;
use cds_extract::{flatten_resources, ExtractionEngine};
use cds_tx::PluginHost;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for the extraction-engine runner.
#[derive(Parser, Debug)]
#[command(name = "cds-extract-cli")]
#[command(about = "Flattens a resource corpus and extracts an object-centric event log")]
struct Args {
    /// Extraction configuration JSON (`defined_objects`/`defined_events`/`defined_o2o_relations`/`fhir_query`).
    #[arg(long)]
    extraction_config: PathBuf,

    /// Directory containing one `{Type}.ndjson` file per resource type.
    #[arg(long)]
    resources_path: PathBuf,

    /// Output path for the OCEL JSON artifact.
    #[arg(long)]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ExtractionConfig::load(&args.extraction_config)?;
    info!(
        objects = config.defined_objects.len(),
        events = config.defined_events.len(),
        "loaded extraction configuration"
    );

    let resource_types = resource_types_in(&config);
    let mut tables: HashMap<String, Table> = HashMap::new();
    for resource_type in resource_types {
        let path = args.resources_path.join(format!("{resource_type}.ndjson"));
        let resources = match read_ndjson(&path) {
            Ok(resources) => resources,
            Err(e) => {
                warn!(resource_type, error = %e, "no resource corpus found for this type, skipping");
                continue;
            }
        };
        info!(resource_type, count = resources.len(), "flattening resources");
        let table = flatten_resources(&resource_type, resources, None).await;
        tables.insert(resource_type, table);
    }

    let registry = PluginHost::new();
    let engine = ExtractionEngine::new(&config, &registry);
    let log = engine.run(&tables);
    info!(
        objects = log.objects.len(),
        events = log.events.len(),
        event_object_relations = log.event_object_relations.len(),
        object_object_relations = log.object_object_relations.len(),
        "extraction complete"
    );

    log.write_json(&args.output)?;
    Ok(())
}

fn resource_types_in(config: &ExtractionConfig) -> Vec<String> {
    let mut types: Vec<String> = config
        .defined_objects
        .keys()
        .chain(config.defined_events.keys())
        .chain(config.defined_o2o_relations.keys())
        .cloned()
        .collect();
    types.sort();
    types.dedup();
    types
}

fn read_ndjson(path: &PathBuf) -> anyhow::Result<Vec<serde_json::Value>> {
    let raw = std::fs::read_to_string(path)?;
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(anyhow::Error::from))
        .collect()
}
