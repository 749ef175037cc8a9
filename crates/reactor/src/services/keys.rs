//! API key issuing and verification.

use persistence::entities::ApiKeyEntity;
use persistence::repositories::ApiKeyRepository;
use sqlx::MySqlPool;

use crate::error::ApiError;

/// Service wrapping key generation, hashing, and candidate verification.
#[derive(Clone)]
pub struct KeyService {
    repo: ApiKeyRepository,
}

impl KeyService {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            repo: ApiKeyRepository::new(pool),
        }
    }

    /// Issues a new raw key for a user. The raw key is returned exactly once;
    /// only its hash and public prefix are stored.
    pub async fn create_key(&self, user_id: i64, key_type: &str) -> Result<String, ApiError> {
        if key_type != "live" && key_type != "test" {
            return Err(ApiError::BadRequest(
                "key type must be 'live' or 'test'".to_string(),
            ));
        }

        let raw_key = shared::keys::generate_key(key_type);
        let hash = shared::keys::hash_key(&raw_key)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        self.repo
            .insert(user_id, &hash, shared::keys::key_prefix(&raw_key), key_type)
            .await?;
        Ok(raw_key)
    }

    /// Verifies a raw key against all stored candidates sharing its prefix.
    ///
    /// On success, `last_used_at` is touched on a detached task so the
    /// request path never waits on the bookkeeping write.
    pub async fn verify_key(&self, raw_key: &str) -> Result<Option<ApiKeyEntity>, sqlx::Error> {
        let prefix = shared::keys::key_prefix(raw_key);
        let candidates = self.repo.find_by_prefix(prefix).await?;

        for key in candidates {
            if shared::keys::verify_key(raw_key, &key.key_hash) {
                let repo = self.repo.clone();
                let key_id = key.id;
                tokio::spawn(async move {
                    repo.touch_last_used(key_id).await;
                });
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    pub fn repository(&self) -> &ApiKeyRepository {
        &self.repo
    }
}
