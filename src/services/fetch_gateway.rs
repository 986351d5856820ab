// src/services/fetch_gateway.rs
//! Transport boundary for fetching federation documents.
//!
//! Provides the [`FetchGateway`] trait and two implementations:
//! - [`HttpFetchGateway`]: production HTTPS fetching over `reqwest`
//! - [`InMemoryFetchGateway`]: documents served from memory, for tests and
//!   offline fixtures
//!
//! A gateway performs exactly one attempt per call. Timeouts, retries and
//! caching are layered on top by `StatementFetcher`.

use crate::error::{FederationError, Result};
use crate::models::entity_statement::ENTITY_STATEMENT_TYP;
use crate::storage::statement_cache::CacheValidators;
use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, ACCEPT, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

/// Result of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResponse {
    /// The document body (trimmed) and the validators it was served with
    Fetched {
        body: String,
        validators: CacheValidators,
    },
    /// The conditional request matched; the caller's copy is current
    NotModified,
}

/// Narrow transport contract the resolvers depend on.
#[async_trait]
pub trait FetchGateway: Send + Sync {
    /// Fetches `url`, sending `validators` as conditional headers when given.
    ///
    /// # Errors
    /// `TransientFetch` for failures worth retrying (network errors,
    /// timeouts, 5xx, 429); `FetchFailed` for any other non-success status.
    async fn fetch(&self, url: &str, validators: Option<&CacheValidators>) -> Result<FetchResponse>;
}

/// HTTPS gateway over a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpFetchGateway {
    client: reqwest::Client,
}

impl HttpFetchGateway {
    /// Creates a gateway whose client enforces `timeout` per request.
    ///
    /// # Errors
    /// Returns `Config` if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FederationError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        HttpFetchGateway { client }
    }

    fn header(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

#[async_trait]
impl FetchGateway for HttpFetchGateway {
    async fn fetch(&self, url: &str, validators: Option<&CacheValidators>) -> Result<FetchResponse> {
        let mut request = self.client.get(url).header(
            ACCEPT,
            format!("application/{}, application/json", ENTITY_STATEMENT_TYP),
        );
        if let Some(validators) = validators {
            if let Some(etag) = &validators.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &validators.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let transient = |e: reqwest::Error| FederationError::TransientFetch {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let response = request.send().await.map_err(transient)?;
        let status = response.status();
        debug!("GET {} -> {}", url, status);

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchResponse::NotModified);
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FederationError::TransientFetch {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }
        if !status.is_success() {
            return Err(FederationError::FetchFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let validators = CacheValidators {
            etag: Self::header(response.headers(), ETAG),
            last_modified: Self::header(response.headers(), LAST_MODIFIED),
        };
        let body = response.text().await.map_err(transient)?;
        Ok(FetchResponse::Fetched {
            body: body.trim().to_string(),
            validators,
        })
    }
}

#[derive(Debug, Clone)]
struct Document {
    body: String,
    etag: Option<String>,
}

/// A gateway serving documents from memory.
///
/// Counts calls per URL and can be told to fail the next few calls for a
/// URL with a transient error. An `ETag` given at insertion is honoured for
/// conditional requests.
#[derive(Debug, Default)]
pub struct InMemoryFetchGateway {
    documents: RwLock<HashMap<String, Document>>,
    calls: Mutex<HashMap<String, usize>>,
    pending_failures: Mutex<HashMap<String, usize>>,
}

impl InMemoryFetchGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` at `url`, replacing any previous document.
    pub fn insert(&self, url: &str, body: &str) {
        self.store(url, body, None);
    }

    /// Serves `body` at `url` with an `ETag`.
    pub fn insert_with_etag(&self, url: &str, body: &str, etag: &str) {
        self.store(url, body, Some(etag.to_string()));
    }

    pub fn remove(&self, url: &str) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
    }

    /// Makes the next `count` fetches of `url` fail transiently.
    pub fn fail_next(&self, url: &str, count: usize) {
        self.pending_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), count);
    }

    /// Number of fetch calls made for `url`.
    pub fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    fn store(&self, url: &str, body: &str, etag: Option<String>) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                url.to_string(),
                Document {
                    body: body.to_string(),
                    etag,
                },
            );
    }

    fn take_failure(&self, url: &str) -> bool {
        let mut pending = self
            .pending_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match pending.get_mut(url) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl FetchGateway for InMemoryFetchGateway {
    async fn fetch(&self, url: &str, validators: Option<&CacheValidators>) -> Result<FetchResponse> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_insert(0) += 1;

        if self.take_failure(url) {
            return Err(FederationError::TransientFetch {
                url: url.to_string(),
                reason: "simulated outage".to_string(),
            });
        }

        let document = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
            .ok_or_else(|| FederationError::FetchFailed {
                url: url.to_string(),
                status: 404,
            })?;

        let requested = validators.and_then(|validators| validators.etag.as_ref());
        if requested.is_some() && requested == document.etag.as_ref() {
            return Ok(FetchResponse::NotModified);
        }
        Ok(FetchResponse::Fetched {
            body: document.body,
            validators: CacheValidators {
                etag: document.etag,
                last_modified: None,
            },
        })
    }
}
