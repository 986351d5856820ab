// src/storage/mod.rs
pub mod statement_cache;
