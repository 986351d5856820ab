// src/services/mod.rs
//! Fetching, verification and resolution.

pub mod entity_statement;
pub mod federation_client;
pub mod fetch_gateway;
pub mod statement_fetcher;
pub mod statement_verifier;
pub mod subordinate_statement;
pub mod trust_chain;
