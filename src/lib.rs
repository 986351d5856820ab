// src/lib.rs

//! # OpenID Federation Trust Chain Resolution
//!
//! Resolves and verifies trust chains from a leaf entity up to one of a set
//! of configured trust anchors.
//!
//! ## Architecture Overview
//! 1. **Models**: entity statements, JWKs and the resolved [`TrustChain`]
//! 2. **Utils**: compact JWT codec and JWS signature verification
//! 3. **Storage**: the bounded LRU [`StatementCache`](storage::statement_cache::StatementCache)
//! 4. **Services**: HTTP fetching with retries, statement resolvers and the
//!    depth-first trust chain search
//!
//! Most callers only need [`FederationClient`].

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use crate::config::FederationConfig;
pub use crate::error::{FederationError, Result};
pub use crate::models::entity_statement::{EntityStatement, VerifiedStatement};
pub use crate::models::jwk::{Jwk, Jwks};
pub use crate::models::trust_chain::TrustChain;
pub use crate::services::federation_client::FederationClient;
pub use crate::services::fetch_gateway::{FetchGateway, HttpFetchGateway, InMemoryFetchGateway};
pub use crate::storage::statement_cache::CacheStrategy;
