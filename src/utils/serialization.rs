// src/utils/serialization.rs
//! Serialization utilities for compact JWS handling.
//!
//! Provides:
//! - base64url (unpadded) encoding and decoding, as used by JWS segments
//! - compact JSON serialization
//! - JSON-to-segment encoding

use serde::Serialize;
use serde_json::Value;

/// Serializes a value to a JSON string.
pub fn serialize<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

/// Encodes bytes as unpadded base64url.
pub fn base64url_encode<T: AsRef<[u8]>>(data: T) -> String {
    base64::encode_config(data, base64::URL_SAFE_NO_PAD)
}

/// Decodes unpadded base64url.
///
/// # Errors
/// Returns `Err` with a description if the input contains padding or any
/// character outside the URL-safe alphabet.
pub fn base64url_decode(data: &str) -> Result<Vec<u8>, String> {
    if data.contains('=') {
        return Err("base64url segment must not be padded".to_string());
    }
    base64::decode_config(data, base64::URL_SAFE_NO_PAD)
        .map_err(|e| format!("Base64 decoding failed: {}", e))
}

/// Encodes a JSON value as a JWS segment (compact JSON, then base64url).
pub fn encode_json_segment(value: &Value) -> Result<String, serde_json::Error> {
    Ok(base64url_encode(serialize(value)?))
}
