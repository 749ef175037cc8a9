//! HTTP and WebSocket route handlers.

pub mod auth;
pub mod export;
pub mod planes;
