//! Ingest command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use floralog_core::{
    BatchEntry, GeoSensor, HttpIdentifier, HttpIdentifierConfig, IdentifyOptions, IngestOutcome,
    IngestPipeline, IpLookup, MemoryBlobStore, MockIdentifier, PipelineConfig, PositionRequest,
    SensorError, SensorReading, SpeciesIdentifier, StoreGateway,
};

use crate::utils::{format_bytes, open_state};

/// Rolling-cache key the memoized external IP lives under.
const EXTERNAL_IP_CACHE_KEY: &str = "external-ip";

/// Geolocation stand-in for headless operation. A terminal has no
/// position sensor, so EXIF tags are the only location evidence.
struct NoGeoSensor;

#[async_trait]
impl GeoSensor for NoGeoSensor {
    async fn current_position(
        &self,
        _request: &PositionRequest,
    ) -> std::result::Result<SensorReading, SensorError> {
        Err(SensorError::Unavailable)
    }
}

/// Execute the ingest command.
pub async fn execute(
    files: Vec<PathBuf>,
    server: String,
    project: String,
    organs: String,
    offline: bool,
    quiet: bool,
) -> Result<()> {
    // Read every input up front so a bad path fails fast, before any
    // network traffic.
    let mut batch = Vec::with_capacity(files.len());
    for file in &files {
        let bytes = std::fs::read(file)
            .with_context(|| format!("Failed to read file: {}", file.display()))?;
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("observation")
            .to_string();
        debug!(file = %name, bytes = bytes.len(), "read input file");
        batch.push((name, bytes));
    }

    let mut state = open_state()?;
    let submitter_id = state.submitter_id().context("Failed to write state")?;

    let server = server.trim_end_matches('/').to_string();

    let identifier: Arc<dyn SpeciesIdentifier> = if offline {
        Arc::new(MockIdentifier::empty())
    } else {
        Arc::new(HttpIdentifier::with_config(HttpIdentifierConfig {
            endpoint: format!("{}/identify", server),
            timeout: Duration::from_secs(30),
        })?)
    };

    // The local gateway dedupes within this run; the server's own probe
    // stays authoritative for anything ingested before.
    let gateway = StoreGateway::new(Arc::new(MemoryBlobStore::new()));

    let config = PipelineConfig {
        identify: IdentifyOptions {
            organs,
            project,
            ..Default::default()
        },
        ..Default::default()
    };

    let mut pipeline = IngestPipeline::new(
        identifier,
        Arc::new(NoGeoSensor),
        gateway,
        submitter_id,
        config,
    );
    // The external IP rarely changes within a cache bucket, so one
    // lookup per bucket is enough for the whole batch.
    let cached_ip = state.cached(EXTERNAL_IP_CACHE_KEY).map(str::to_string);
    if !offline {
        match &cached_ip {
            Some(ip) => {
                debug!(ip = %ip, "using cached external IP");
                pipeline = pipeline.with_known_ip(ip.clone());
            }
            None => match IpLookup::new() {
                Ok(lookup) => pipeline = pipeline.with_ip_lookup(lookup),
                Err(e) => warn!(error = %e, "IP lookup disabled"),
            },
        }
    }

    if !quiet {
        let mode = if offline { "offline" } else { server.as_str() };
        println!(
            "Ingesting {} file(s) ({})",
            batch.len().to_string().bold(),
            mode
        );
        println!();
    }

    let entries = pipeline.ingest_batch(&batch).await;

    // Memoize the IP the pipeline resolved for subsequent invocations.
    if !offline && cached_ip.is_none() {
        let resolved = entries
            .iter()
            .filter_map(|entry| entry.result.as_ref().ok())
            .find_map(|outcome| outcome.observation.submitter_ip.clone());
        if let Some(ip) = resolved {
            if let Err(e) = state.cache_put(EXTERNAL_IP_CACHE_KEY, ip) {
                warn!(error = %e, "cannot cache external IP");
            }
        }
    }

    let client = reqwest::Client::new();
    let mut stored = 0usize;
    let mut duplicates = 0usize;
    let mut errors = 0usize;

    for entry in &entries {
        match &entry.result {
            Ok(outcome) => {
                let duplicate = if offline {
                    Ok(outcome.duplicate)
                } else {
                    submit(&client, &server, outcome).await
                };
                match duplicate {
                    Ok(true) => {
                        duplicates += 1;
                        println!(
                            "  {:<24} {}  {}",
                            entry.name,
                            "duplicate".yellow(),
                            outcome.observation.image_hash
                        );
                    }
                    Ok(false) => {
                        stored += 1;
                        print_stored(entry, outcome);
                    }
                    // Submission failures stay per-file, like pipeline ones.
                    Err(e) => {
                        errors += 1;
                        println!("  {:<24} {}  {:#}", entry.name, "error    ".red(), e);
                    }
                }
            }
            Err(e) => {
                errors += 1;
                println!("  {:<24} {}  {}", entry.name, "error    ".red(), e);
            }
        }
    }

    info!(stored, duplicates, errors, "batch complete");
    if !quiet {
        println!();
        println!("{} stored, {} duplicate(s), {} error(s)", stored, duplicates, errors);
    }

    if errors > 0 {
        return Err(anyhow!("{} of {} file(s) failed", errors, entries.len()));
    }
    Ok(())
}

fn print_stored(entry: &BatchEntry, outcome: &IngestOutcome) {
    let size = outcome
        .observation
        .image_data
        .as_bytes()
        .map(|b| b.len())
        .unwrap_or(0);
    let species = outcome
        .observation
        .predictions
        .first()
        .and_then(|p| p.species.clone())
        .unwrap_or_else(|| "unidentified".to_string());

    println!(
        "  {:<24} {}  {}  {}  ({})",
        entry.name,
        "stored   ".green(),
        outcome.observation.image_hash,
        species,
        format_bytes(size)
    );
}

/// Submit one built observation to the server.
///
/// Returns whether the server already held this content. The 409
/// duplicate answer is a normal outcome, not a failure.
async fn submit(client: &reqwest::Client, server: &str, outcome: &IngestOutcome) -> Result<bool> {
    let body = outcome
        .observation
        .to_json()
        .context("Failed to serialize observation")?;

    let response = client
        .post(format!("{}/observations", server))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .with_context(|| format!("Failed to reach server at {}", server))?;

    match response.status() {
        StatusCode::CREATED => Ok(false),
        StatusCode::CONFLICT => Ok(true),
        status => {
            let body = response.text().await.unwrap_or_default();
            bail!("server rejected observation ({}): {}", status, body);
        }
    }
}
