// src/models/jwk.rs
//! JSON Web Key data model.
//!
//! Keys are parsed once from a statement's `jwks` claim and never mutated
//! afterwards. Only public key members are modelled; private members in a
//! published JWKS are ignored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single public JSON Web Key (RFC 7517).
///
/// # Key Types
/// - `RSA`: modulus `n` and exponent `e`
/// - `EC`: curve `crv` and coordinates `x`, `y`
/// - `oct`: shared secret `k`
///
/// All binary members are base64url without padding, as published.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Jwk {
    /// Key family: "RSA", "EC" or "oct"
    pub kty: String,

    /// Key identifier matched against the JWS header `kid`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Algorithm the key is intended for, when the publisher pins one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
}

impl Jwk {
    fn empty(kty: &str) -> Self {
        Jwk {
            kty: kty.to_string(),
            kid: None,
            alg: None,
            key_use: None,
            crv: None,
            x: None,
            y: None,
            n: None,
            e: None,
            k: None,
        }
    }

    /// Builds an elliptic-curve public key from base64url coordinates.
    pub fn ec(crv: &str, x: &str, y: &str) -> Self {
        Jwk {
            crv: Some(crv.to_string()),
            x: Some(x.to_string()),
            y: Some(y.to_string()),
            ..Jwk::empty("EC")
        }
    }

    /// Builds an RSA public key from base64url modulus and exponent.
    pub fn rsa(n: &str, e: &str) -> Self {
        Jwk {
            n: Some(n.to_string()),
            e: Some(e.to_string()),
            ..Jwk::empty("RSA")
        }
    }

    /// Builds a symmetric key from a base64url secret.
    pub fn oct(k: &str) -> Self {
        Jwk {
            k: Some(k.to_string()),
            ..Jwk::empty("oct")
        }
    }

    pub fn with_kid(self, kid: &str) -> Self {
        Jwk {
            kid: Some(kid.to_string()),
            ..self
        }
    }

    pub fn with_alg(self, alg: &str) -> Self {
        Jwk {
            alg: Some(alg.to_string()),
            ..self
        }
    }
}

/// A JSON Web Key Set as carried in the `jwks` claim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    pub fn new(keys: Vec<Jwk>) -> Self {
        Jwks { keys }
    }

    /// Finds the key whose `kid` matches exactly.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid.as_deref() == Some(kid))
    }
}

/// JWS signature algorithms accepted for entity statements.
///
/// `none` is deliberately absent: parsing it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JwsAlgorithm {
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
    ES256,
    ES384,
    ES512,
    ES256K,
    HS256,
    HS384,
    HS512,
}

impl JwsAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            JwsAlgorithm::RS256 => "RS256",
            JwsAlgorithm::RS384 => "RS384",
            JwsAlgorithm::RS512 => "RS512",
            JwsAlgorithm::PS256 => "PS256",
            JwsAlgorithm::PS384 => "PS384",
            JwsAlgorithm::PS512 => "PS512",
            JwsAlgorithm::ES256 => "ES256",
            JwsAlgorithm::ES384 => "ES384",
            JwsAlgorithm::ES512 => "ES512",
            JwsAlgorithm::ES256K => "ES256K",
            JwsAlgorithm::HS256 => "HS256",
            JwsAlgorithm::HS384 => "HS384",
            JwsAlgorithm::HS512 => "HS512",
        }
    }

    /// The `kty` a key must have to be used with this algorithm.
    pub fn key_type(&self) -> &'static str {
        match self {
            JwsAlgorithm::RS256
            | JwsAlgorithm::RS384
            | JwsAlgorithm::RS512
            | JwsAlgorithm::PS256
            | JwsAlgorithm::PS384
            | JwsAlgorithm::PS512 => "RSA",
            JwsAlgorithm::ES256
            | JwsAlgorithm::ES384
            | JwsAlgorithm::ES512
            | JwsAlgorithm::ES256K => "EC",
            JwsAlgorithm::HS256 | JwsAlgorithm::HS384 | JwsAlgorithm::HS512 => "oct",
        }
    }

    /// The only curve an ECDSA algorithm may be paired with.
    pub fn curve(&self) -> Option<&'static str> {
        match self {
            JwsAlgorithm::ES256 => Some("P-256"),
            JwsAlgorithm::ES384 => Some("P-384"),
            JwsAlgorithm::ES512 => Some("P-521"),
            JwsAlgorithm::ES256K => Some("secp256k1"),
            _ => None,
        }
    }
}

impl FromStr for JwsAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(JwsAlgorithm::RS256),
            "RS384" => Ok(JwsAlgorithm::RS384),
            "RS512" => Ok(JwsAlgorithm::RS512),
            "PS256" => Ok(JwsAlgorithm::PS256),
            "PS384" => Ok(JwsAlgorithm::PS384),
            "PS512" => Ok(JwsAlgorithm::PS512),
            "ES256" => Ok(JwsAlgorithm::ES256),
            "ES384" => Ok(JwsAlgorithm::ES384),
            "ES512" => Ok(JwsAlgorithm::ES512),
            "ES256K" => Ok(JwsAlgorithm::ES256K),
            "HS256" => Ok(JwsAlgorithm::HS256),
            "HS384" => Ok(JwsAlgorithm::HS384),
            "HS512" => Ok(JwsAlgorithm::HS512),
            other => Err(format!("unsupported JWS algorithm '{}'", other)),
        }
    }
}

impl fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
