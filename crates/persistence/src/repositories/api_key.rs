//! Repository for API key database operations.

use sqlx::MySqlPool;

use crate::entities::ApiKeyEntity;

/// Repository for API key operations.
#[derive(Clone)]
pub struct ApiKeyRepository {
    pool: MySqlPool,
}

impl ApiKeyRepository {
    /// Creates a new API key repository.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Inserts a new key row. Only the hash and public prefix are stored.
    pub async fn insert(
        &self,
        user_id: i64,
        key_hash: &str,
        key_prefix: &str,
        key_type: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO api_keys (user_id, key_hash, key_prefix, type) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(key_hash)
        .bind(key_prefix)
        .bind(key_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetches all keys sharing a public prefix, for candidate verification.
    pub async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKeyEntity>, sqlx::Error> {
        sqlx::query_as::<_, ApiKeyEntity>(
            r#"
            SELECT id, user_id, key_hash, key_prefix, type AS key_type,
                   created_at, last_used_at
            FROM api_keys
            WHERE key_prefix = ?
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
    }

    /// Lists a user's keys, newest first.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<ApiKeyEntity>, sqlx::Error> {
        sqlx::query_as::<_, ApiKeyEntity>(
            r#"
            SELECT id, user_id, key_hash, key_prefix, type AS key_type,
                   created_at, last_used_at
            FROM api_keys
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Updates `last_used_at` after successful authentication.
    ///
    /// Callers should spawn this so the request path is never blocked on the
    /// bookkeeping write; failures are logged and otherwise ignored.
    pub async fn touch_last_used(&self, key_id: i64) {
        let result = sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = ?")
            .bind(key_id)
            .execute(&self.pool)
            .await;
        if let Err(e) = result {
            tracing::warn!(key_id, error = %e, "failed to update api key last_used_at");
        }
    }
}
