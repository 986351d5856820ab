// src/utils/jwt.rs
//! Compact JWT codec.
//!
//! Splits a compact JWS (`header.payload.signature`) into its parts,
//! base64url-decodes each and parses the header and payload as JSON objects.
//! Pure functions: no I/O and no cryptography happen here.

use crate::error::{FederationError, Result};
use crate::utils::serialization::{base64url_decode, encode_json_segment};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protected header of a JWS.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JwsHeader {
    pub alg: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crit: Option<Vec<String>>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// The three decoded parts of a compact JWT.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedJwt {
    pub header: JwsHeader,
    /// Payload as a JSON object
    pub payload: Value,
    /// Raw signature bytes
    pub signature: Vec<u8>,
}

/// Splits a compact JWT into exactly three non-empty segments.
pub fn split(compact: &str) -> Result<[&str; 3]> {
    let mut parts = compact.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
        {
            Ok([header, payload, signature])
        }
        _ => Err(FederationError::MalformedJwt(
            "expected three non-empty '.'-separated segments".to_string(),
        )),
    }
}

/// Returns the JWS signing input (`header.payload`) of a compact JWT.
pub fn signing_input(compact: &str) -> Result<&str> {
    let [header, payload, _] = split(compact)?;
    Ok(&compact[..header.len() + 1 + payload.len()])
}

/// Decodes a compact JWT into header, payload and signature.
///
/// # Errors
/// `MalformedJwt` when the string does not split into three non-empty
/// base64url segments, when the header or payload is not a JSON object, or
/// when the header lacks `alg`.
pub fn decode(compact: &str) -> Result<DecodedJwt> {
    let [header_b64, payload_b64, signature_b64] = split(compact)?;

    let header_json = decode_json_object(header_b64, "header")?;
    let payload = decode_json_object(payload_b64, "payload")?;
    let signature = base64url_decode(signature_b64)
        .map_err(|e| FederationError::MalformedJwt(format!("signature: {}", e)))?;

    let header: JwsHeader = serde_json::from_value(header_json)
        .map_err(|e| FederationError::MalformedJwt(format!("header: {}", e)))?;

    Ok(DecodedJwt {
        header,
        payload,
        signature,
    })
}

/// Builds the signing input for a header and payload.
pub fn encode_signing_input(header: &Value, payload: &Value) -> Result<String> {
    Ok(format!(
        "{}.{}",
        encode_json_segment(header)?,
        encode_json_segment(payload)?
    ))
}

fn decode_json_object(segment: &str, part: &str) -> Result<Value> {
    let bytes = base64url_decode(segment)
        .map_err(|e| FederationError::MalformedJwt(format!("{}: {}", part, e)))?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| FederationError::MalformedJwt(format!("{}: {}", part, e)))?;
    if !value.is_object() {
        return Err(FederationError::MalformedJwt(format!(
            "{} is not a JSON object",
            part
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::serialization::base64url_encode;
    use serde_json::json;

    fn compact(header: &Value, payload: &Value, signature: &[u8]) -> String {
        format!(
            "{}.{}",
            encode_signing_input(header, payload).unwrap(),
            base64url_encode(signature)
        )
    }

    #[test]
    fn test_decode_round_trip_is_semantically_equal() {
        let header = json!({"alg": "ES256", "kid": "k1", "typ": "entity-statement+jwt", "x5u": "https://x"});
        let payload = json!({
            "iss": "https://op.example.com",
            "sub": "https://op.example.com",
            "metadata": {"federation_entity": {"organization_name": "OP"}},
            "authority_hints": ["https://ta.example.com"]
        });
        let token = compact(&header, &payload, b"sig");

        let decoded = decode(&token).expect("decodes");
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.signature, b"sig".to_vec());
        assert_eq!(decoded.header.kid.as_deref(), Some("k1"));

        // re-encoding and decoding again yields the same JSON, key order aside
        let reencoded = compact(
            &serde_json::to_value(&decoded.header).unwrap(),
            &decoded.payload,
            &decoded.signature,
        );
        let again = decode(&reencoded).expect("decodes");
        assert_eq!(serde_json::to_value(&again.header).unwrap(), header);
        assert_eq!(again.payload, payload);
    }

    #[test]
    fn test_rejects_wrong_segment_count() {
        for token in ["", "a.b", "a.b.c.d", "a..c", ".b.c", "a.b."] {
            assert!(
                matches!(decode(token), Err(FederationError::MalformedJwt(_))),
                "{:?} should be malformed",
                token
            );
        }
    }

    #[test]
    fn test_rejects_non_json_segments() {
        let header = base64url_encode(r#"{"alg":"ES256"}"#);
        let not_json = base64url_encode("not json");
        let token = format!("{}.{}.c2ln", header, not_json);
        assert!(matches!(decode(&token), Err(FederationError::MalformedJwt(_))));

        let array = base64url_encode("[1,2]");
        let token = format!("{}.{}.c2ln", header, array);
        assert!(matches!(decode(&token), Err(FederationError::MalformedJwt(_))));
    }

    #[test]
    fn test_rejects_invalid_base64url() {
        let header = base64url_encode(r#"{"alg":"ES256"}"#);
        let payload = base64url_encode("{}");
        let token = format!("{}.{}.not+valid/", header, payload);
        assert!(matches!(decode(&token), Err(FederationError::MalformedJwt(_))));
    }

    #[test]
    fn test_header_without_alg_is_malformed() {
        let token = compact(&json!({"kid": "k1"}), &json!({}), b"sig");
        assert!(matches!(decode(&token), Err(FederationError::MalformedJwt(_))));
    }

    #[test]
    fn test_signing_input_excludes_signature() {
        let token = compact(&json!({"alg": "HS256"}), &json!({"a": 1}), b"sig");
        let input = signing_input(&token).unwrap();
        assert_eq!(format!("{}.{}", input, base64url_encode(b"sig")), token);
    }
}
