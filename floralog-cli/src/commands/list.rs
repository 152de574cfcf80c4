//! List command implementation.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::debug;

use floralog_core::Observation;

use crate::utils::{format_timestamp, open_state};

/// Execute the list command.
pub async fn execute(server: String, mine: bool, quiet: bool) -> Result<()> {
    let server = server.trim_end_matches('/').to_string();
    let mut url = format!("{}/photos", server);
    if mine {
        let mut state = open_state()?;
        let id = state.submitter_id().context("Failed to write state")?;
        url = format!("{}?submitter={}", url, id);
    }

    debug!(%url, "fetching gallery");
    let response = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach server at {}", server))?;

    if !response.status().is_success() {
        bail!("server answered {} for {}", response.status(), url);
    }

    let body: serde_json::Value = response
        .json()
        .await
        .context("Failed to parse server response")?;
    let photos: Vec<Observation> = serde_json::from_value(body["photos"].clone())
        .context("Failed to parse server response")?;

    if photos.is_empty() {
        if !quiet {
            println!("No observations stored yet.");
        }
        return Ok(());
    }

    if !quiet {
        println!(
            "{:<18} {:<22} {:<28} {:>5}  {}",
            "HASH".bold(),
            "CAPTURED".bold(),
            "TOP SPECIES".bold(),
            "CONF".bold(),
            "LOCATION".bold()
        );
    }

    for photo in &photos {
        let (species, confidence) = match photo.predictions.first() {
            Some(p) => (
                p.species
                    .clone()
                    .unwrap_or_else(|| "unidentified".to_string()),
                format!("{:.2}", p.confidence),
            ),
            None => ("unidentified".to_string(), "-".to_string()),
        };
        let location = photo
            .location
            .as_ref()
            .map(|l| l.source.to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<18} {:<22} {:<28} {:>5}  {}",
            photo.image_hash,
            format_timestamp(photo.captured_at),
            species,
            confidence,
            location
        );
    }

    if !quiet {
        println!();
        println!("{} observation(s)", photos.len());
    }

    Ok(())
}
