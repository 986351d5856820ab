// src/utils/crypto.rs
//! JWS signature verification against JWK key material.
//!
//! Verification dispatches on the header `alg`, and the key must belong to the
//! family that algorithm implies:
//! - RSA keys: RS256/384/512 and PS256/384/512 (via `jsonwebtoken`)
//! - EC keys: ES256 (P-256), ES384 (P-384) via `jsonwebtoken`, ES512 (P-521)
//!   via `p521`, ES256K (secp256k1) via `k256`
//! - oct keys: HS256/384/512 (via `jsonwebtoken`)
//!
//! Any curve outside that allow-list, any `kty`/`alg`/`crv` mismatch and any
//! parse error yields `false`: verification never fails loudly on untrusted
//! input.

use crate::models::jwk::{Jwk, JwsAlgorithm};
use crate::utils::jwt;
use crate::utils::serialization::base64url_decode;
use jsonwebtoken::{Algorithm, DecodingKey};
use k256::ecdsa::signature::Verifier as _;
use log::debug;

/// Verifies a compact JWS against a candidate key.
///
/// Implementations must be total: every `(jwt, key)` pair maps to a bool.
pub trait CryptoVerifier: Send + Sync {
    fn verify(&self, compact_jwt: &str, key: &Jwk) -> bool;
}

/// Default [`CryptoVerifier`] backed by the RustCrypto and `jsonwebtoken` stacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwsVerifier;

impl CryptoVerifier for JwsVerifier {
    fn verify(&self, compact_jwt: &str, key: &Jwk) -> bool {
        match verify_jws(compact_jwt, key) {
            Ok(valid) => valid,
            Err(reason) => {
                debug!(
                    "JWS rejected for key {:?}: {}",
                    key.kid.as_deref().unwrap_or("-"),
                    reason
                );
                false
            }
        }
    }
}

fn verify_jws(compact_jwt: &str, key: &Jwk) -> Result<bool, String> {
    let decoded = jwt::decode(compact_jwt).map_err(|e| e.to_string())?;
    let alg: JwsAlgorithm = decoded.header.alg.parse()?;

    // The key, not the token, decides which algorithm family is acceptable.
    if key.kty != alg.key_type() {
        return Err(format!("{} cannot be verified with a {} key", alg, key.kty));
    }
    if let Some(pinned) = key.alg.as_deref() {
        if pinned != alg.as_str() {
            return Err(format!("key is pinned to {}, token uses {}", pinned, alg));
        }
    }
    if let Some(key_use) = key.key_use.as_deref() {
        if key_use != "sig" {
            return Err(format!("key use '{}' is not 'sig'", key_use));
        }
    }
    if let Some(curve) = alg.curve() {
        let crv = key.crv.as_deref().unwrap_or_default();
        if crv != curve {
            return Err(format!("{} requires curve {}, key has '{}'", alg, curve, crv));
        }
    }

    let [_, _, signature_b64] = jwt::split(compact_jwt).map_err(|e| e.to_string())?;
    let message = jwt::signing_input(compact_jwt)
        .map_err(|e| e.to_string())?
        .as_bytes();

    match alg {
        JwsAlgorithm::ES256K => verify_secp256k1(key, message, &decoded.signature),
        JwsAlgorithm::ES512 => verify_p521(key, message, &decoded.signature),
        _ => {
            let decoding_key = decoding_key(key)?;
            jsonwebtoken::crypto::verify(signature_b64, message, &decoding_key, algorithm(alg)?)
                .map_err(|e| e.to_string())
        }
    }
}

fn algorithm(alg: JwsAlgorithm) -> Result<Algorithm, String> {
    match alg {
        JwsAlgorithm::RS256 => Ok(Algorithm::RS256),
        JwsAlgorithm::RS384 => Ok(Algorithm::RS384),
        JwsAlgorithm::RS512 => Ok(Algorithm::RS512),
        JwsAlgorithm::PS256 => Ok(Algorithm::PS256),
        JwsAlgorithm::PS384 => Ok(Algorithm::PS384),
        JwsAlgorithm::PS512 => Ok(Algorithm::PS512),
        JwsAlgorithm::ES256 => Ok(Algorithm::ES256),
        JwsAlgorithm::ES384 => Ok(Algorithm::ES384),
        JwsAlgorithm::HS256 => Ok(Algorithm::HS256),
        JwsAlgorithm::HS384 => Ok(Algorithm::HS384),
        JwsAlgorithm::HS512 => Ok(Algorithm::HS512),
        other => Err(format!("{} is not handled by jsonwebtoken", other)),
    }
}

fn decoding_key(key: &Jwk) -> Result<DecodingKey, String> {
    match key.kty.as_str() {
        "RSA" => {
            let n = required(&key.n, "n")?;
            let e = required(&key.e, "e")?;
            DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())
        }
        "EC" => {
            let size = coordinate_size(key.crv.as_deref())?;
            // rebuilding the point checks both coordinates are well-formed
            uncompressed_point(key, size)?;
            let x = required(&key.x, "x")?;
            let y = required(&key.y, "y")?;
            DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string())
        }
        "oct" => {
            let secret = base64url_decode(required(&key.k, "k")?)?;
            if secret.is_empty() {
                return Err("empty HMAC secret".to_string());
            }
            Ok(DecodingKey::from_secret(&secret))
        }
        other => Err(format!("unsupported key type '{}'", other)),
    }
}

fn verify_secp256k1(key: &Jwk, message: &[u8], signature: &[u8]) -> Result<bool, String> {
    let point = uncompressed_point(key, 32)?;
    let verifying_key =
        k256::ecdsa::VerifyingKey::from_sec1_bytes(&point).map_err(|e| e.to_string())?;
    let signature = k256::ecdsa::Signature::from_slice(signature).map_err(|e| e.to_string())?;
    Ok(verifying_key.verify(message, &signature).is_ok())
}

fn verify_p521(key: &Jwk, message: &[u8], signature: &[u8]) -> Result<bool, String> {
    use p521::ecdsa::signature::Verifier;

    let point = uncompressed_point(key, 66)?;
    let verifying_key =
        p521::ecdsa::VerifyingKey::from_sec1_bytes(&point).map_err(|e| e.to_string())?;
    let signature = p521::ecdsa::Signature::from_slice(signature).map_err(|e| e.to_string())?;
    Ok(verifying_key.verify(message, &signature).is_ok())
}

/// Coordinate length in bytes for each allow-listed curve.
fn coordinate_size(crv: Option<&str>) -> Result<usize, String> {
    match crv {
        Some("P-256") | Some("secp256k1") => Ok(32),
        Some("P-384") => Ok(48),
        Some("P-521") => Ok(66),
        other => Err(format!("curve {:?} is not allowed", other)),
    }
}

/// SEC1 uncompressed encoding `0x04 || x || y` of an EC JWK.
fn uncompressed_point(key: &Jwk, size: usize) -> Result<Vec<u8>, String> {
    let x = base64url_decode(required(&key.x, "x")?)?;
    let y = base64url_decode(required(&key.y, "y")?)?;
    if x.len() != size || y.len() != size {
        return Err(format!(
            "EC coordinates must be {} bytes, got {} and {}",
            size,
            x.len(),
            y.len()
        ));
    }
    let mut point = Vec::with_capacity(1 + 2 * size);
    point.push(0x04);
    point.extend_from_slice(&x);
    point.extend_from_slice(&y);
    Ok(point)
}

fn required<'a>(member: &'a Option<String>, name: &str) -> Result<&'a str, String> {
    member
        .as_deref()
        .ok_or_else(|| format!("JWK is missing '{}'", name))
}
