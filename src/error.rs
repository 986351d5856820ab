// src/error.rs
//! Error types for federation trust resolution.
//!
//! Every failure is typed so callers can tell a structural problem with a
//! statement from a cryptographic rejection, a temporal one, a missing piece of
//! key material, a transport hiccup, or a traversal that ran out of routes.

use thiserror::Error;

/// Result type alias using [`FederationError`].
pub type Result<T> = std::result::Result<T, FederationError>;

/// Errors that can occur while fetching, verifying or chaining statements.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FederationError {
    /// The compact JWT could not be split, base64url-decoded or parsed as JSON.
    #[error("Malformed JWT: {0}")]
    MalformedJwt(String),

    /// No key in the relevant JWKS produced a valid signature.
    #[error("Signature verification failed for statement issued by '{issuer}'")]
    SignatureVerificationFailed { issuer: String },

    /// `exp` lies in the past.
    #[error("Statement from '{issuer}' expired at {exp}")]
    ExpiredStatement { issuer: String, exp: i64 },

    /// `iat` lies in the future.
    #[error("Statement from '{issuer}' not valid before {iat}")]
    NotYetValid { issuer: String, iat: i64 },

    /// `iss` does not name the entity we asked about.
    #[error("Invalid issuer: expected '{expected}', got '{actual}'")]
    InvalidIssuer { expected: String, actual: String },

    /// `sub` does not name the entity we asked about.
    #[error("Invalid subject: expected '{expected}', got '{actual}'")]
    InvalidSubject { expected: String, actual: String },

    /// The header `kid` is missing or not in the issuer's JWKS.
    #[error("Key '{kid}' not found in JWKS of '{entity}'")]
    KeyNotFound { kid: String, entity: String },

    /// The authority publishes no `federation_fetch_endpoint` (or list endpoint).
    #[error("Entity '{0}' publishes no federation endpoint for this request")]
    NoFetchEndpoint(String),

    /// The depth budget ran out, or the only remaining routes looped back on themselves.
    #[error("Trust chain for '{entity}' exceeds maximum depth {max_depth}")]
    DepthExceeded { entity: String, max_depth: usize },

    /// Every authority hint was explored and none reached a trust anchor.
    #[error("No path from '{0}' to any configured trust anchor")]
    NoPathToTrustAnchor(String),

    /// Network failure, timeout or a server-side error status; eligible for retry.
    #[error("Transient fetch failure for {url}: {reason}")]
    TransientFetch { url: String, reason: String },

    /// A definitive, non-retryable HTTP status.
    #[error("Fetch of {url} failed with HTTP status {status}")]
    FetchFailed { url: String, status: u16 },

    /// CACHE_ONLY lookup found nothing for a fetch the caller needed.
    #[error("No cached statement for {0}")]
    NotCached(String),

    /// The statement decoded but breaks the entity statement shape rules.
    #[error("Invalid entity statement: {0}")]
    InvalidStatement(String),

    /// A `crit` entry names a claim this verifier does not understand.
    #[error("Unsupported critical claim '{0}'")]
    UnsupportedCriticalClaim(String),

    /// An endpoint published in metadata is not a usable URL.
    #[error("Invalid endpoint URL '{0}'")]
    InvalidEndpoint(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FederationError {
    /// Whether a fetch that failed this way may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, FederationError::TransientFetch { .. })
    }

    /// Failures that are surfaced in preference to "no path" when a traversal
    /// exhausts its routes: the statement material itself was rejected.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            FederationError::MalformedJwt(_)
                | FederationError::SignatureVerificationFailed { .. }
                | FederationError::ExpiredStatement { .. }
                | FederationError::NotYetValid { .. }
                | FederationError::InvalidIssuer { .. }
                | FederationError::InvalidSubject { .. }
                | FederationError::KeyNotFound { .. }
                | FederationError::NoFetchEndpoint(_)
                | FederationError::InvalidStatement(_)
                | FederationError::UnsupportedCriticalClaim(_)
        )
    }
}

impl From<serde_json::Error> for FederationError {
    fn from(err: serde_json::Error) -> Self {
        FederationError::MalformedJwt(err.to_string())
    }
}

impl From<config::ConfigError> for FederationError {
    fn from(err: config::ConfigError) -> Self {
        FederationError::Config(err.to_string())
    }
}
