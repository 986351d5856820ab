// tests/common/mod.rs
//! A small in-memory federation: every entity gets a fresh P-256 key, and its
//! statements are signed and served from an `InMemoryFetchGateway`.
#![allow(dead_code)]

use federation_trust::services::entity_statement::entity_configuration_url;
use federation_trust::services::subordinate_statement::subordinate_fetch_url;
use federation_trust::utils::jwt;
use federation_trust::utils::serialization::{base64url_decode, base64url_encode};
use federation_trust::{FederationClient, FederationConfig, InMemoryFetchGateway, Jwk};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const LEAF: &str = "https://leaf.example.com";
pub const INTERMEDIATE: &str = "https://intermediate.example.com";
pub const ANCHOR: &str = "https://anchor.example.com";

pub struct TestEntity {
    pub id: String,
    pub jwk: Jwk,
    pair: EcdsaKeyPair,
}

impl TestEntity {
    pub fn new(id: &str) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng).unwrap();
        let pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .unwrap();
        let public = pair.public_key().as_ref();
        let kid = format!("{}#sig", id.trim_start_matches("https://"));
        let jwk = Jwk::ec(
            "P-256",
            &base64url_encode(&public[1..33]),
            &base64url_encode(&public[33..]),
        )
        .with_kid(&kid)
        .with_alg("ES256");
        TestEntity {
            id: id.to_string(),
            jwk,
            pair,
        }
    }

    pub fn kid(&self) -> String {
        self.jwk.kid.clone().unwrap()
    }

    pub fn jwks(&self) -> Value {
        json!({ "keys": [self.jwk] })
    }

    pub fn fetch_endpoint(&self) -> String {
        format!("{}/fetch", self.id)
    }

    pub fn list_endpoint(&self) -> String {
        format!("{}/list", self.id)
    }

    /// Signs `claims` with this entity's key under the given header.
    pub fn sign_with_header(&self, header: Value, claims: &Value) -> String {
        let input = jwt::encode_signing_input(&header, claims).unwrap();
        let signature = self
            .pair
            .sign(&SystemRandom::new(), input.as_bytes())
            .unwrap();
        format!("{}.{}", input, base64url_encode(signature.as_ref()))
    }

    pub fn sign(&self, claims: &Value) -> String {
        let header = json!({"alg": "ES256", "kid": self.kid(), "typ": "entity-statement+jwt"});
        self.sign_with_header(header, claims)
    }
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub struct Federation {
    pub gateway: Arc<InMemoryFetchGateway>,
    entities: HashMap<String, TestEntity>,
}

impl Federation {
    pub fn new() -> Self {
        Federation {
            gateway: Arc::new(InMemoryFetchGateway::new()),
            entities: HashMap::new(),
        }
    }

    pub fn entity(&mut self, id: &str) -> &TestEntity {
        self.entities
            .entry(id.to_string())
            .or_insert_with(|| TestEntity::new(id))
    }

    /// Claims of a valid Entity Configuration publishing both endpoints.
    pub fn configuration_claims(&mut self, id: &str, authority_hints: &[&str]) -> Value {
        let entity = self.entity(id);
        let mut claims = json!({
            "iss": id,
            "sub": id,
            "iat": now() - 60,
            "exp": now() + 3_600,
            "jwks": entity.jwks(),
            "metadata": {
                "federation_entity": {
                    "federation_fetch_endpoint": entity.fetch_endpoint(),
                    "federation_list_endpoint": entity.list_endpoint(),
                    "organization_name": id
                }
            }
        });
        if !authority_hints.is_empty() {
            claims["authority_hints"] = json!(authority_hints);
        }
        claims
    }

    /// Claims of a valid Subordinate Statement by `issuer` about `subject`.
    pub fn subordinate_claims(&mut self, issuer: &str, subject: &str) -> Value {
        let subject_jwks = self.entity(subject).jwks();
        json!({
            "iss": issuer,
            "sub": subject,
            "iat": now() - 60,
            "exp": now() + 3_600,
            "jwks": subject_jwks
        })
    }

    pub fn sign_as(&mut self, signer: &str, claims: &Value) -> String {
        self.entity(signer).sign(claims)
    }

    pub fn serve_configuration(&self, id: &str, jwt: &str) {
        self.gateway.insert(&configuration_url(id), jwt);
    }

    pub fn serve_subordinate(&self, issuer: &str, subject: &str, jwt: &str) {
        self.gateway.insert(&subordinate_url(issuer, subject), jwt);
    }

    /// Publishes a valid, self-signed Entity Configuration and returns it.
    pub fn publish_configuration(&mut self, id: &str, authority_hints: &[&str]) -> String {
        let claims = self.configuration_claims(id, authority_hints);
        let jwt = self.sign_as(id, &claims);
        self.serve_configuration(id, &jwt);
        jwt
    }

    /// Publishes a valid Subordinate Statement and returns it.
    pub fn publish_subordinate(&mut self, issuer: &str, subject: &str) -> String {
        let claims = self.subordinate_claims(issuer, subject);
        let jwt = self.sign_as(issuer, &claims);
        self.serve_subordinate(issuer, subject, &jwt);
        jwt
    }

    pub fn client(&self) -> FederationClient {
        self.client_with(FederationConfig {
            retry_backoff_ms: 1,
            ..FederationConfig::default()
        })
    }

    pub fn client_with(&self, config: FederationConfig) -> FederationClient {
        FederationClient::with_gateway(config, self.gateway.clone())
    }
}

pub fn configuration_url(id: &str) -> String {
    entity_configuration_url(id)
}

pub fn subordinate_url(issuer: &str, subject: &str) -> String {
    subordinate_fetch_url(&format!("{}/fetch", issuer), issuer, subject).unwrap()
}

pub fn anchors(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// Flips one bit in the first byte of the signature segment.
pub fn tamper_signature(token: &str) -> String {
    let [header, payload, signature] = jwt::split(token).unwrap();
    let mut bytes = base64url_decode(signature).unwrap();
    bytes[0] ^= 0x01;
    format!("{}.{}.{}", header, payload, base64url_encode(bytes))
}

/// Leaf -> intermediate -> anchor, everything valid.
pub fn three_level_federation() -> (Federation, [String; 5]) {
    let mut federation = Federation::new();
    let leaf = federation.publish_configuration(LEAF, &[INTERMEDIATE]);
    let intermediate = federation.publish_configuration(INTERMEDIATE, &[ANCHOR]);
    let anchor = federation.publish_configuration(ANCHOR, &[]);
    let about_leaf = federation.publish_subordinate(INTERMEDIATE, LEAF);
    let about_intermediate = federation.publish_subordinate(ANCHOR, INTERMEDIATE);
    (
        federation,
        [leaf, about_leaf, about_intermediate, anchor, intermediate],
    )
}
