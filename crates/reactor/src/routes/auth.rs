//! User and API key endpoints.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::password;
use tracing::warn;

use crate::app::AppState;
use crate::error::ApiError;
use persistence::repositories::UserRepository;

/// Request body for register/verify.
#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub email: String,
    pub password: String,
}

/// Public user representation.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Creates a new user account.
///
/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<AuthRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    shared::query_guard::validate_email(&request.email)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let hash =
        password::hash_password(&request.password).map_err(|e| ApiError::Internal(e.to_string()))?;

    let repo = UserRepository::new(state.pool.clone());
    repo.create(&request.email, &hash).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": "User created" })),
    ))
}

/// Checks a user's credentials.
///
/// POST /auth/verify
pub async fn verify(
    State(state): State<AppState>,
    Json(request): Json<AuthRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let repo = UserRepository::new(state.pool.clone());
    let user = repo
        .find_by_email(&request.email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid credentials".to_string()))?;

    let valid = password::verify_password(&request.password, &user.password_hash)
        .unwrap_or_else(|e| {
            warn!(error = %e, "stored password hash unreadable");
            false
        });
    if !valid {
        return Err(ApiError::Unauthorized("invalid credentials".to_string()));
    }

    Ok(Json(UserResponse {
        id: user.id,
        email: user.email,
        created_at: user.created_at,
    }))
}

/// Request body for key creation.
#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub user_id: i64,
    #[serde(rename = "type")]
    pub key_type: String,
}

/// Response for key creation. The raw key appears here once and is never
/// retrievable again.
#[derive(Debug, Serialize)]
pub struct CreateKeyResponse {
    pub key: String,
    #[serde(rename = "type")]
    pub key_type: String,
}

/// Issues a new API key.
///
/// POST /auth/keys/create
pub async fn create_key(
    State(state): State<AppState>,
    Json(request): Json<CreateKeyRequest>,
) -> Result<Json<CreateKeyResponse>, ApiError> {
    let key = state
        .keys
        .create_key(request.user_id, &request.key_type)
        .await?;
    Ok(Json(CreateKeyResponse {
        key,
        key_type: request.key_type,
    }))
}

/// Query string for key listing.
#[derive(Debug, Deserialize)]
pub struct ListKeysQuery {
    pub user_id: i64,
}

/// Key metadata for listings. The hash never leaves storage.
#[derive(Debug, Serialize)]
pub struct KeySummary {
    pub id: i64,
    pub user_id: i64,
    pub key_prefix: String,
    #[serde(rename = "type")]
    pub key_type: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Lists a user's API keys.
///
/// GET /auth/keys/list?user_id=…
pub async fn list_keys(
    State(state): State<AppState>,
    Query(query): Query<ListKeysQuery>,
) -> Result<Json<Vec<KeySummary>>, ApiError> {
    let keys = state.keys.repository().list_for_user(query.user_id).await?;
    let summaries = keys
        .into_iter()
        .map(|key| KeySummary {
            id: key.id,
            user_id: key.user_id,
            key_prefix: key.key_prefix,
            key_type: key.key_type,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
        })
        .collect();
    Ok(Json(summaries))
}
