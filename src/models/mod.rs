// src/models/mod.rs
//! Federation data structures.

pub mod entity_statement;
pub mod jwk;
pub mod trust_chain;
