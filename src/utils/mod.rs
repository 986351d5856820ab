// src/utils/mod.rs
//! Helper functions: JWT codec, signature verification, encodings, clock.

pub mod crypto;
pub mod jwt;
pub mod serialization;
pub mod time;
