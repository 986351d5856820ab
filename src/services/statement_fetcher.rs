// src/services/statement_fetcher.rs
//! Cached, retrying fetch of raw statement documents.
//!
//! Sits between the resolvers and a [`FetchGateway`]: each attempt is bounded
//! by the configured timeout, transient failures are retried with linear
//! backoff, and successful bodies are kept in the shared [`StatementCache`]
//! keyed by URL. Only raw JWT text is cached; verification always runs on
//! the caller's side, so a cache hit never skips a signature check.

use crate::config::FederationConfig;
use crate::error::{FederationError, Result};
use crate::services::fetch_gateway::{FetchGateway, FetchResponse};
use crate::storage::statement_cache::{
    CacheOptions, CacheStrategy, CacheValidators, Revalidation, StatementCache,
};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Cache of raw documents keyed by URL.
pub type DocumentCache = StatementCache<String, String>;

pub struct StatementFetcher {
    gateway: Arc<dyn FetchGateway>,
    cache: Arc<DocumentCache>,
    http_caching: bool,
    etag_support: bool,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
    strategy: CacheStrategy,
}

impl StatementFetcher {
    pub fn new(
        gateway: Arc<dyn FetchGateway>,
        cache: Arc<DocumentCache>,
        config: &FederationConfig,
    ) -> Self {
        StatementFetcher {
            gateway,
            cache,
            http_caching: config.enable_http_caching,
            etag_support: config.enable_etag_support,
            timeout: config.http_timeout(),
            retries: config.http_retries,
            backoff: config.retry_backoff(),
            strategy: config.cache_strategy,
        }
    }

    pub fn cache(&self) -> &Arc<DocumentCache> {
        &self.cache
    }

    /// Fetches `url` with the configured cache strategy.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        self.fetch_with(url, self.strategy).await
    }

    /// Fetches `url` with an explicit cache strategy.
    ///
    /// # Errors
    /// `NotCached` when `CacheOnly` finds nothing; otherwise the last
    /// transport error once retries are exhausted.
    pub async fn fetch_with(&self, url: &str, strategy: CacheStrategy) -> Result<String> {
        if !self.http_caching {
            return match self.fetch_with_retry(url, None).await? {
                FetchResponse::Fetched { body, .. } => Ok(body),
                FetchResponse::NotModified => Err(unexpected_not_modified(url)),
            };
        }

        let cached = self
            .cache
            .get_or_revalidate(
                url.to_string(),
                move |validators| self.revalidate(url, validators),
                CacheOptions::new(strategy),
            )
            .await?;

        cached.ok_or_else(|| {
            debug!("{} not available from cache ({:?})", url, strategy);
            FederationError::NotCached(url.to_string())
        })
    }

    /// Drops the cached copy of `url`, so a rejected document is fetched
    /// again on the next request.
    pub fn invalidate(&self, url: &str) {
        if self.cache.remove(&url.to_string()).is_some() {
            debug!("Dropped cached copy of {}", url);
        }
    }

    async fn revalidate(
        &self,
        url: &str,
        validators: Option<CacheValidators>,
    ) -> Result<Revalidation<String>> {
        let validators = validators.filter(|_| self.etag_support);
        match self.fetch_with_retry(url, validators.as_ref()).await? {
            FetchResponse::Fetched { body, validators } => Ok(Revalidation::Modified {
                value: body,
                validators: if self.etag_support {
                    validators
                } else {
                    CacheValidators::default()
                },
            }),
            FetchResponse::NotModified if validators.is_some() => Ok(Revalidation::NotModified),
            FetchResponse::NotModified => Err(unexpected_not_modified(url)),
        }
    }

    async fn fetch_with_retry(
        &self,
        url: &str,
        validators: Option<&CacheValidators>,
    ) -> Result<FetchResponse> {
        let mut attempt: u32 = 0;
        loop {
            let attempt_future = self.gateway.fetch(url, validators);
            let outcome = match tokio::time::timeout(self.timeout, attempt_future).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FederationError::TransientFetch {
                    url: url.to_string(),
                    reason: format!("timed out after {:?}", self.timeout),
                }),
            };
            match outcome {
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "Fetching {} failed ({}); retry {}/{}",
                        url, err, attempt, self.retries
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                other => return other,
            }
        }
    }
}

fn unexpected_not_modified(url: &str) -> FederationError {
    FederationError::TransientFetch {
        url: url.to_string(),
        reason: "'not modified' answer to an unconditional request".to_string(),
    }
}
