use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use exporter::pool::WorkerPool;
use sqlx::MySqlPool;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::hub::Hub;
use crate::routes::{auth, export, planes};
use crate::services::keys::KeyService;

#[derive(Clone)]
pub struct AppState {
    pub pool: MySqlPool,
    pub config: Arc<Config>,
    pub hub: Arc<Hub>,
    pub workers: Arc<WorkerPool>,
    pub keys: KeyService,
}

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/export", post(export::submit_export))
        .route("/auth/register", post(auth::register))
        .route("/auth/verify", post(auth::verify))
        .route("/auth/keys/create", post(auth::create_key))
        .route("/auth/keys/list", get(auth::list_keys))
        .route("/agent/control", get(planes::agent_control))
        .route("/agent/data", get(planes::agent_data))
        .route("/dashboard/stream", get(planes::dashboard_stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins = config.allowed_origins();
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let parsed: Vec<axum::http::HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(Any)
        .allow_headers(Any)
}
