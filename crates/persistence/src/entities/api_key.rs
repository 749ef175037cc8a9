//! API key entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database row mapping for the `api_keys` table.
///
/// `key_hash` never leaves the persistence layer except for in-process
/// verification; it must not be serialized into API responses.
#[derive(Debug, Clone, FromRow)]
pub struct ApiKeyEntity {
    pub id: i64,
    pub user_id: i64,
    pub key_hash: String,
    pub key_prefix: String,
    pub key_type: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKeyEntity {
    /// True for sandbox ("test") keys, which select the sandbox dispatch
    /// policy on the control plane.
    pub fn is_sandbox(&self) -> bool {
        self.key_type == "test"
    }
}
