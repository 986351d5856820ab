// src/services/subordinate_statement.rs
//! Subordinate Statement resolution and subordinate listing.

use crate::error::{FederationError, Result};
use crate::models::entity_statement::VerifiedStatement;
use crate::services::entity_statement::EntityStatementResolver;
use crate::services::statement_fetcher::StatementFetcher;
use crate::services::statement_verifier::StatementVerifier;
use log::debug;
use reqwest::Url;
use std::sync::Arc;

/// Builds the fetch-endpoint URL asking `issuer` about `subject`.
///
/// Existing query parameters of the endpoint are kept; `iss` and `sub` are
/// appended URL-encoded.
pub fn subordinate_fetch_url(endpoint: &str, issuer: &str, subject: &str) -> Result<String> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| FederationError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
    url.query_pairs_mut()
        .append_pair("iss", issuer)
        .append_pair("sub", subject);
    Ok(url.to_string())
}

pub struct SubordinateStatementResolver {
    entity_resolver: Arc<EntityStatementResolver>,
    fetcher: Arc<StatementFetcher>,
    verifier: Arc<StatementVerifier>,
}

impl SubordinateStatementResolver {
    pub fn new(
        entity_resolver: Arc<EntityStatementResolver>,
        fetcher: Arc<StatementFetcher>,
        verifier: Arc<StatementVerifier>,
    ) -> Self {
        SubordinateStatementResolver {
            entity_resolver,
            fetcher,
            verifier,
        }
    }

    /// Fetches what `authority` asserts about `subject`, verified with the
    /// authority's keys.
    ///
    /// # Arguments
    /// * `authority` - The issuing superior's entity identifier
    /// * `subject` - The entity the statement is about
    pub async fn get_subordinate_statement(
        &self,
        authority: &str,
        subject: &str,
    ) -> Result<VerifiedStatement> {
        let configuration = self.entity_resolver.get_entity_configuration(authority).await?;
        self.get_subordinate_statement_from(&configuration, subject)
            .await
    }

    /// Same as [`get_subordinate_statement`](Self::get_subordinate_statement)
    /// for an authority whose configuration is already verified.
    pub async fn get_subordinate_statement_from(
        &self,
        authority_configuration: &VerifiedStatement,
        subject: &str,
    ) -> Result<VerifiedStatement> {
        let authority = authority_configuration.statement.sub.as_str();
        let endpoint = authority_configuration
            .statement
            .federation_fetch_endpoint()
            .ok_or_else(|| FederationError::NoFetchEndpoint(authority.to_string()))?;
        let url = subordinate_fetch_url(&endpoint, authority, subject)?;
        debug!("Fetching statement about {} from {}", subject, url);

        let jwt = self.fetcher.fetch(&url).await?;
        self.verify_subordinate_statement(authority_configuration, subject, jwt)
            .map_err(|err| {
                self.fetcher.invalidate(&url);
                err
            })
    }

    fn verify_subordinate_statement(
        &self,
        authority_configuration: &VerifiedStatement,
        subject: &str,
        jwt: String,
    ) -> Result<VerifiedStatement> {
        let authority = authority_configuration.statement.sub.as_str();
        let (header, statement) = self.verifier.decode(&jwt)?;

        if statement.iss != authority {
            return Err(FederationError::InvalidIssuer {
                expected: authority.to_string(),
                actual: statement.iss,
            });
        }
        if statement.sub != subject {
            return Err(FederationError::InvalidSubject {
                expected: subject.to_string(),
                actual: statement.sub,
            });
        }

        self.verifier.verify_signature(
            &jwt,
            &header,
            authority_configuration.statement.jwks.as_ref(),
            authority,
        )?;
        self.verifier.check_validity(&statement)?;

        Ok(VerifiedStatement {
            jwt,
            header,
            statement,
        })
    }

    /// Checks that `statement` vouches for the key that signed its subject's
    /// Entity Configuration.
    ///
    /// # Arguments
    /// * `subject_configuration` - The subject's verified Entity Configuration
    /// * `statement` - A verified Subordinate Statement about that subject
    ///
    /// # Returns
    /// `KeyNotFound` when the statement's `jwks` lacks the signing `kid`, or
    /// `SignatureVerificationFailed` when the key under that `kid` differs.
    pub fn verify_subject_keys(
        &self,
        subject_configuration: &VerifiedStatement,
        statement: &VerifiedStatement,
    ) -> Result<()> {
        self.verifier.verify_signature(
            &subject_configuration.jwt,
            &subject_configuration.header,
            statement.statement.jwks.as_ref(),
            &statement.statement.sub,
        )
    }

    /// Lists the immediate subordinates `authority` publishes.
    ///
    /// # Errors
    /// `NoFetchEndpoint` when the authority advertises no
    /// `federation_list_endpoint`; `InvalidStatement` when the listing is not
    /// a JSON array of strings.
    pub async fn list_subordinates(&self, authority: &str) -> Result<Vec<String>> {
        let configuration = self.entity_resolver.get_entity_configuration(authority).await?;
        let endpoint = configuration
            .statement
            .federation_list_endpoint()
            .ok_or_else(|| FederationError::NoFetchEndpoint(authority.to_string()))?;
        let url = Url::parse(&endpoint)
            .map_err(|e| FederationError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

        let body = self.fetcher.fetch(url.as_str()).await?;
        serde_json::from_str(&body).map_err(|e| {
            FederationError::InvalidStatement(format!(
                "subordinate listing of '{}': {}",
                authority, e
            ))
        })
    }
}
