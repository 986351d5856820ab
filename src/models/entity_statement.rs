// src/models/entity_statement.rs
//! Entity statement data model (OpenID Federation).
//!
//! A single payload shape covers both statement kinds:
//! - **Entity Configuration**: self-issued (`iss == sub`), carries the entity's
//!   own `jwks` and optionally its `authority_hints`
//! - **Subordinate Statement**: issued by a superior about a subject
//!   (`iss != sub`), never carries `authority_hints`

use crate::error::{FederationError, Result};
use crate::models::jwk::Jwks;
use crate::utils::jwt::JwsHeader;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Media type (and JWS `typ`) of entity statements.
pub const ENTITY_STATEMENT_TYP: &str = "entity-statement+jwt";

/// Metadata key under which federation endpoints are published.
pub const FEDERATION_ENTITY: &str = "federation_entity";

/// Decoded payload of an entity statement.
///
/// Unknown claims are preserved in `other` so that `crit` checks can see them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EntityStatement {
    /// Issuer entity identifier
    pub iss: String,

    /// Subject entity identifier
    pub sub: String,

    /// Issued-at, epoch seconds
    pub iat: i64,

    /// Expiry, epoch seconds
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<Jwks>,

    /// Superior entities, in the publisher's preference order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_hints: Option<Vec<String>>,

    /// Role-keyed metadata (opaque apart from `federation_entity`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_policy: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_endpoint: Option<String>,

    /// Claims the verifier must understand to accept the statement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crit: Option<Vec<String>>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// The `federation_entity` metadata members this crate consumes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FederationEntityMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_fetch_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_list_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
}

impl EntityStatement {
    /// Parses a JSON payload into a statement and enforces the shape rules.
    pub fn from_payload(payload: Value) -> Result<Self> {
        let statement: EntityStatement = serde_json::from_value(payload)
            .map_err(|e| FederationError::InvalidStatement(e.to_string()))?;
        statement.check_shape()?;
        Ok(statement)
    }

    pub fn is_self_issued(&self) -> bool {
        self.iss == self.sub
    }

    /// Authority hints in listed order; empty when absent.
    pub fn authority_hints(&self) -> &[String] {
        self.authority_hints.as_deref().unwrap_or(&[])
    }

    /// The `federation_entity` metadata block, if published and well-formed.
    pub fn federation_entity(&self) -> Option<FederationEntityMetadata> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get(FEDERATION_ENTITY))
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn federation_fetch_endpoint(&self) -> Option<String> {
        self.federation_entity()
            .and_then(|entity| entity.federation_fetch_endpoint)
    }

    pub fn federation_list_endpoint(&self) -> Option<String> {
        self.federation_entity()
            .and_then(|entity| entity.federation_list_endpoint)
    }

    /// Self-issued statements must carry keys; subordinate statements must not
    /// carry authority hints.
    fn check_shape(&self) -> Result<()> {
        if self.iss.is_empty() || self.sub.is_empty() {
            return Err(FederationError::InvalidStatement(
                "iss and sub must be non-empty".to_string(),
            ));
        }
        if self.is_self_issued() {
            let has_keys = self.jwks.as_ref().map_or(false, |jwks| !jwks.keys.is_empty());
            if !has_keys {
                return Err(FederationError::InvalidStatement(format!(
                    "entity configuration of '{}' carries no jwks",
                    self.iss
                )));
            }
        } else if self.authority_hints.is_some() {
            return Err(FederationError::InvalidStatement(format!(
                "subordinate statement from '{}' about '{}' carries authority_hints",
                self.iss, self.sub
            )));
        }
        Ok(())
    }
}

/// A statement whose signature, issuer/subject binding and validity window
/// have all been checked, together with the exact compact JWT it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedStatement {
    /// The compact JWT as served
    pub jwt: String,
    pub header: JwsHeader,
    pub statement: EntityStatement,
}
