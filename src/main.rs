// src/main.rs

//! # Trust Chain Resolver - Command Line Entry Point
//!
//! Resolves the trust chain of one entity against a set of trust anchors and
//! prints it as a JSON array of compact JWTs.
//!
//! ```text
//! federation-trust <entity-id> <trust-anchor>...
//! ```
//!
//! ## Environment Variables
//! - `FEDERATION_CONFIG_FILE`: (Optional) configuration file to load
//! - `FEDERATION_*`: overrides for individual settings, e.g.
//!   `FEDERATION_MAX_DEPTH=3`
//! - `RUST_LOG`: log filter, e.g. `federation_trust=debug`

use anyhow::{bail, Context, Result};
use dotenv::dotenv;
use federation_trust::{FederationClient, FederationConfig};
use log::info;
use std::collections::HashSet;

const USAGE: &str = "usage: federation-trust <entity-id> <trust-anchor>...";

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let entity = match args.next() {
        Some(entity) => entity,
        None => bail!(USAGE),
    };
    let trust_anchors: HashSet<String> = args.collect();
    if trust_anchors.is_empty() {
        bail!(USAGE);
    }

    let config_file = std::env::var("FEDERATION_CONFIG_FILE").ok();
    let config = FederationConfig::load_from(config_file.as_deref())
        .context("failed to load configuration")?;
    info!("Loaded configuration: {:?}", config);

    let client = FederationClient::new(config)?;
    let chain = client
        .resolve_trust_chain(&entity, &trust_anchors)
        .await
        .with_context(|| format!("no trust chain for {}", entity))?;

    println!("{}", serde_json::to_string_pretty(&chain)?);
    Ok(())
}
