// src/services/federation_client.rs
//! One-stop entry point wiring the fetcher, verifier and resolvers together.

use crate::config::FederationConfig;
use crate::error::Result;
use crate::models::entity_statement::VerifiedStatement;
use crate::models::trust_chain::TrustChain;
use crate::services::entity_statement::EntityStatementResolver;
use crate::services::fetch_gateway::{FetchGateway, HttpFetchGateway};
use crate::services::statement_fetcher::{DocumentCache, StatementFetcher};
use crate::services::statement_verifier::StatementVerifier;
use crate::services::subordinate_statement::SubordinateStatementResolver;
use crate::services::trust_chain::TrustChainResolver;
use crate::storage::statement_cache::StatementCache;
use crate::utils::crypto::{CryptoVerifier, JwsVerifier};
use std::collections::HashSet;
use std::sync::Arc;

/// Federation client sharing one statement cache across all operations.
///
/// # Examples
/// ```no_run
/// use federation_trust::{FederationClient, FederationConfig};
/// use std::collections::HashSet;
///
/// # async fn run() -> federation_trust::Result<()> {
/// let client = FederationClient::new(FederationConfig::default())?;
/// let anchors: HashSet<String> = ["https://ta.example.com".to_string()].into_iter().collect();
/// let chain = client.resolve_trust_chain("https://op.example.com", &anchors).await?;
/// println!("{} statements, valid until {}", chain.len(), chain.expires_at());
/// # Ok(())
/// # }
/// ```
pub struct FederationClient {
    config: FederationConfig,
    cache: Arc<DocumentCache>,
    entity_resolver: Arc<EntityStatementResolver>,
    subordinate_resolver: Arc<SubordinateStatementResolver>,
    trust_chain_resolver: TrustChainResolver,
}

impl FederationClient {
    /// Creates a client fetching over HTTPS.
    pub fn new(config: FederationConfig) -> Result<Self> {
        let gateway = Arc::new(HttpFetchGateway::new(config.http_timeout())?);
        Ok(Self::with_components(config, gateway, Arc::new(JwsVerifier)))
    }

    /// Creates a client over a custom transport with the default verifier.
    pub fn with_gateway(config: FederationConfig, gateway: Arc<dyn FetchGateway>) -> Self {
        Self::with_components(config, gateway, Arc::new(JwsVerifier))
    }

    pub fn with_components(
        config: FederationConfig,
        gateway: Arc<dyn FetchGateway>,
        crypto: Arc<dyn CryptoVerifier>,
    ) -> Self {
        let cache = Arc::new(StatementCache::with_ttl(
            config.cache_max_size,
            config.cache_ttl(),
        ));
        let fetcher = Arc::new(StatementFetcher::new(gateway, cache.clone(), &config));
        let verifier = Arc::new(StatementVerifier::new(crypto, &config));
        let entity_resolver = Arc::new(EntityStatementResolver::new(
            fetcher.clone(),
            verifier.clone(),
        ));
        let subordinate_resolver = Arc::new(SubordinateStatementResolver::new(
            entity_resolver.clone(),
            fetcher,
            verifier,
        ));
        let trust_chain_resolver = TrustChainResolver::new(
            entity_resolver.clone(),
            subordinate_resolver.clone(),
            config.max_depth,
        );

        FederationClient {
            config,
            cache,
            entity_resolver,
            subordinate_resolver,
            trust_chain_resolver,
        }
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// The raw-document cache, shared by every operation of this client.
    pub fn cache(&self) -> &Arc<DocumentCache> {
        &self.cache
    }

    /// Fetches and verifies the Entity Configuration of an entity.
    ///
    /// # Arguments
    /// * `entity_identifier` - The entity's HTTPS identifier
    ///
    /// # Returns
    /// The self-signed configuration, checked against its own `jwks`
    pub async fn entity_configuration(&self, entity_identifier: &str) -> Result<VerifiedStatement> {
        self.entity_resolver
            .get_entity_configuration(entity_identifier)
            .await
    }

    /// Fetches what `authority` asserts about `subject`.
    ///
    /// # Arguments
    /// * `authority` - The superior issuing the statement
    /// * `subject` - The subordinate the statement is about
    pub async fn subordinate_statement(
        &self,
        authority: &str,
        subject: &str,
    ) -> Result<VerifiedStatement> {
        self.subordinate_resolver
            .get_subordinate_statement(authority, subject)
            .await
    }

    pub async fn list_subordinates(&self, authority: &str) -> Result<Vec<String>> {
        self.subordinate_resolver.list_subordinates(authority).await
    }

    /// Resolves a trust chain from `entity_identifier` to any of
    /// `trust_anchors` within the configured depth.
    pub async fn resolve_trust_chain(
        &self,
        entity_identifier: &str,
        trust_anchors: &HashSet<String>,
    ) -> Result<TrustChain> {
        self.trust_chain_resolver
            .resolve_trust_chain(entity_identifier, trust_anchors)
            .await
    }

    pub async fn resolve_trust_chain_with_depth(
        &self,
        entity_identifier: &str,
        trust_anchors: &HashSet<String>,
        max_depth: usize,
    ) -> Result<TrustChain> {
        self.trust_chain_resolver
            .resolve_trust_chain_with_depth(entity_identifier, trust_anchors, max_depth)
            .await
    }
}
