// src/services/entity_statement.rs
//! Entity Configuration resolution.

use crate::error::{FederationError, Result};
use crate::models::entity_statement::VerifiedStatement;
use crate::services::statement_fetcher::StatementFetcher;
use crate::services::statement_verifier::StatementVerifier;
use log::debug;
use std::sync::Arc;

/// Path under which every entity publishes its Entity Configuration.
pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-federation";

/// Builds the Entity Configuration URL of an entity identifier.
///
/// One trailing `/` is stripped before the well-known path is appended.
///
/// # Examples
/// ```
/// use federation_trust::services::entity_statement::entity_configuration_url;
///
/// assert_eq!(
///     entity_configuration_url("https://op.example.com/"),
///     "https://op.example.com/.well-known/openid-federation"
/// );
/// ```
pub fn entity_configuration_url(entity_identifier: &str) -> String {
    let base = entity_identifier
        .strip_suffix('/')
        .unwrap_or(entity_identifier);
    format!("{}{}", base, WELL_KNOWN_PATH)
}

/// Fetches and verifies self-signed Entity Configurations.
pub struct EntityStatementResolver {
    fetcher: Arc<StatementFetcher>,
    verifier: Arc<StatementVerifier>,
}

impl EntityStatementResolver {
    pub fn new(fetcher: Arc<StatementFetcher>, verifier: Arc<StatementVerifier>) -> Self {
        EntityStatementResolver { fetcher, verifier }
    }

    /// Fetches the Entity Configuration of `entity_identifier` and verifies it.
    ///
    /// # Arguments
    /// * `entity_identifier` - The entity's HTTPS identifier
    ///
    /// # Returns
    /// The verified configuration, or the first check that failed:
    /// fetch, decode, `iss == sub == entity_identifier`, self-signature
    /// against its own `jwks`, then the validity window.
    pub async fn get_entity_configuration(
        &self,
        entity_identifier: &str,
    ) -> Result<VerifiedStatement> {
        let url = entity_configuration_url(entity_identifier);
        debug!("Fetching entity configuration of {} from {}", entity_identifier, url);
        let jwt = self.fetcher.fetch(&url).await?;
        self.verify_entity_configuration(entity_identifier, jwt)
            .map_err(|err| {
                self.fetcher.invalidate(&url);
                err
            })
    }

    /// Verifies an Entity Configuration that was obtained out of band.
    pub fn verify_entity_configuration(
        &self,
        entity_identifier: &str,
        jwt: String,
    ) -> Result<VerifiedStatement> {
        let (header, statement) = self.verifier.decode(&jwt)?;

        for claimed in [&statement.iss, &statement.sub] {
            if claimed != entity_identifier {
                return Err(FederationError::InvalidIssuer {
                    expected: entity_identifier.to_string(),
                    actual: claimed.clone(),
                });
            }
        }

        self.verifier
            .verify_signature(&jwt, &header, statement.jwks.as_ref(), entity_identifier)?;
        self.verifier.check_validity(&statement)?;

        Ok(VerifiedStatement {
            jwt,
            header,
            statement,
        })
    }
}
