// src/config.rs
//! Runtime configuration for federation resolution.
//!
//! Every field is optional. Values come, in increasing priority, from the
//! built-in defaults, an optional configuration file, and `FEDERATION_*`
//! environment variables (e.g. `FEDERATION_HTTP_TIMEOUT_MS=5000`).

use crate::error::Result;
use crate::storage::statement_cache::CacheStrategy;
use serde::Deserialize;
use std::time::Duration;

/// Prefix of environment variables read by [`FederationConfig::load`].
pub const ENV_PREFIX: &str = "FEDERATION";

/// Tunables for fetching, caching and chain resolution.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Cache fetched statements at all
    pub enable_http_caching: bool,

    /// Store `ETag`/`Last-Modified` and revalidate conditionally
    pub enable_etag_support: bool,

    /// Per-attempt timeout of a single fetch
    pub http_timeout_ms: u64,

    /// Additional attempts after a transient failure
    pub http_retries: u32,

    /// Delay before retry `n` is `n * retry_backoff_ms`
    pub retry_backoff_ms: u64,

    pub cache_max_size: usize,

    /// Freshness lifetime of cached statements; 0 keeps them until evicted
    pub cache_ttl_secs: u64,

    pub cache_strategy: CacheStrategy,

    /// Maximum number of subordinate statements between leaf and anchor
    pub max_depth: usize,

    /// Tolerance applied to `iat`/`exp` checks
    pub clock_skew_secs: i64,

    /// Extension claims this deployment knows how to process when marked `crit`
    pub understood_critical_claims: Vec<String>,
}

impl Default for FederationConfig {
    fn default() -> Self {
        FederationConfig {
            enable_http_caching: true,
            enable_etag_support: true,
            http_timeout_ms: 30_000,
            http_retries: 3,
            retry_backoff_ms: 100,
            cache_max_size: 1_000,
            cache_ttl_secs: 3_600,
            cache_strategy: CacheStrategy::CacheFirst,
            max_depth: 5,
            clock_skew_secs: 0,
            understood_critical_claims: Vec::new(),
        }
    }
}

impl FederationConfig {
    /// Loads configuration from `FEDERATION_*` environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from an optional file (any format the `config`
    /// crate recognises by extension) overlaid with the environment.
    pub fn load_from(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("understood_critical_claims"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
