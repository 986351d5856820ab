// src/services/statement_verifier.rs
//! Checks shared by every entity statement, whatever its kind.
//!
//! The resolvers run these in a fixed order:
//! 1. [`StatementVerifier::decode`]: codec, `typ`, payload shape, `crit`
//! 2. issuer/subject binding (resolver specific)
//! 3. [`StatementVerifier::verify_signature`]: `kid` lookup and signature
//! 4. [`StatementVerifier::check_validity`]: `iat`/`exp` window

use crate::config::FederationConfig;
use crate::error::{FederationError, Result};
use crate::models::entity_statement::{EntityStatement, ENTITY_STATEMENT_TYP};
use crate::models::jwk::Jwks;
use crate::utils::crypto::CryptoVerifier;
use crate::utils::jwt::{self, JwsHeader};
use crate::utils::time::now_epoch_seconds;
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

pub struct StatementVerifier {
    crypto: Arc<dyn CryptoVerifier>,
    understood_critical_claims: HashSet<String>,
    clock_skew_secs: i64,
}

impl StatementVerifier {
    pub fn new(crypto: Arc<dyn CryptoVerifier>, config: &FederationConfig) -> Self {
        StatementVerifier {
            crypto,
            understood_critical_claims: config.understood_critical_claims.iter().cloned().collect(),
            clock_skew_secs: config.clock_skew_secs.max(0),
        }
    }

    /// Decodes a compact JWT into its header and statement payload.
    ///
    /// # Errors
    /// - `MalformedJwt` if the codec rejects it or `typ` is not
    ///   `entity-statement+jwt`
    /// - `InvalidStatement` if the payload is not a well-formed statement
    /// - `UnsupportedCriticalClaim` if a `crit` entry is not understood
    pub fn decode(&self, compact_jwt: &str) -> Result<(JwsHeader, EntityStatement)> {
        let decoded = jwt::decode(compact_jwt)?;
        if let Some(typ) = decoded.header.typ.as_deref() {
            if !typ.eq_ignore_ascii_case(ENTITY_STATEMENT_TYP) {
                return Err(FederationError::MalformedJwt(format!(
                    "unexpected typ '{}'",
                    typ
                )));
            }
        }
        let statement = EntityStatement::from_payload(decoded.payload)?;
        self.check_critical(&decoded.header, &statement)?;
        Ok((decoded.header, statement))
    }

    /// Verifies the signature with the key named by the header `kid`.
    ///
    /// `signer` is the entity whose `jwks` is passed, used in errors.
    pub fn verify_signature(
        &self,
        compact_jwt: &str,
        header: &JwsHeader,
        jwks: Option<&Jwks>,
        signer: &str,
    ) -> Result<()> {
        let key_not_found = |kid: &str| FederationError::KeyNotFound {
            kid: kid.to_string(),
            entity: signer.to_string(),
        };
        let kid = header.kid.as_deref().ok_or_else(|| key_not_found("<none>"))?;
        let key = jwks
            .and_then(|jwks| jwks.find(kid))
            .ok_or_else(|| key_not_found(kid))?;

        if !self.crypto.verify(compact_jwt, key) {
            return Err(FederationError::SignatureVerificationFailed {
                issuer: signer.to_string(),
            });
        }
        debug!("Signature by {} (kid {}) verified", signer, kid);
        Ok(())
    }

    /// Checks `iat <= now <= exp`, widened by the configured clock skew.
    pub fn check_validity(&self, statement: &EntityStatement) -> Result<()> {
        self.check_validity_at(statement, now_epoch_seconds())
    }

    pub fn check_validity_at(&self, statement: &EntityStatement, now: i64) -> Result<()> {
        if statement.iat > now.saturating_add(self.clock_skew_secs) {
            return Err(FederationError::NotYetValid {
                issuer: statement.iss.clone(),
                iat: statement.iat,
            });
        }
        if now.saturating_sub(self.clock_skew_secs) > statement.exp {
            return Err(FederationError::ExpiredStatement {
                issuer: statement.iss.clone(),
                exp: statement.exp,
            });
        }
        Ok(())
    }

    // Header `crit` names header parameters, payload `crit` names claims; both
    // must be understood, and claims marked critical must actually be present.
    fn check_critical(&self, header: &JwsHeader, statement: &EntityStatement) -> Result<()> {
        for name in header.crit.iter().flatten() {
            if !self.understood_critical_claims.contains(name) {
                return Err(FederationError::UnsupportedCriticalClaim(name.clone()));
            }
        }
        for name in statement.crit.iter().flatten() {
            if !self.understood_critical_claims.contains(name) {
                return Err(FederationError::UnsupportedCriticalClaim(name.clone()));
            }
            if !statement.other.contains_key(name) {
                return Err(FederationError::InvalidStatement(format!(
                    "critical claim '{}' is missing",
                    name
                )));
            }
        }
        Ok(())
    }
}
