//! Shared security primitives for the FluxQuery reactor and agent.
//!
//! This crate provides functionality used across all other crates:
//! - HMAC-SHA256 request signing and verification
//! - Read-only query validation and email shape checks
//! - API key generation and hashing
//! - Password hashing with Argon2id

pub mod keys;
pub mod password;
pub mod query_guard;
pub mod signature;
