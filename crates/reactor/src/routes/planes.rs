//! Agent control/data planes and the dashboard stream.
//!
//! The control plane is a long-lived, key-authenticated socket on which the
//! reactor pushes `JobCommand`s as JSON text frames; the agent side is
//! read-only (reads only detect disconnects). The data plane is dialed by
//! the agent once per job and carries the typed binary row stream.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use domain::{wire, DashboardUpdate, JobCommand};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::error::ApiError;

/// Broadcast a progress event every this many decoded rows.
const PROGRESS_EVERY: u64 = 10;

/// GET /agent/control
pub async fn agent_control(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(raw_key) = headers
        .get("X-Agent-Key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
    else {
        return ApiError::Unauthorized("missing agent key".to_string()).into_response();
    };

    let key = match state.keys.verify_key(&raw_key).await {
        Ok(Some(key)) => key,
        Ok(None) => {
            warn!("invalid agent key");
            return ApiError::Unauthorized("invalid agent key".to_string()).into_response();
        }
        Err(e) => {
            error!(error = %e, "agent key verification failed");
            return ApiError::Internal(e.to_string()).into_response();
        }
    };

    info!(key_id = key.id, key_type = %key.key_type, "agent connected (control)");
    ws.on_upgrade(move |socket| control_loop(state, socket, key.key_type))
}

async fn control_loop(state: AppState, socket: WebSocket, key_type: String) {
    state.hub.update_agent_count(1);

    let sandbox = key_type == "test";
    let (mut sender, mut receiver) = socket.split();

    // Scheduling policy is an open question; dispatch one demo job shortly
    // after connect, faster and against sandbox data for test keys.
    let dispatch_hub = state.hub.clone();
    let dispatch = tokio::spawn(async move {
        let delay = if sandbox { 2 } else { 5 };
        tokio::time::sleep(Duration::from_secs(delay)).await;

        let command = JobCommand {
            id: format!("job_{}_{}", key_type, Utc::now().format("%H%M%S")),
            query: if sandbox {
                "SELECT * FROM users_test_data LIMIT 10".to_string()
            } else {
                "SELECT * FROM users LIMIT 100".to_string()
            },
        };

        let payload = match serde_json::to_string(&command) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "failed to serialize job command");
                return;
            }
        };
        if let Err(e) = sender.send(Message::Text(payload)).await {
            error!(error = %e, "failed to send job command");
            return;
        }
        info!(job_id = %command.id, sandbox, "dispatched job");
        dispatch_hub.broadcast(&DashboardUpdate::job_start(command.id, "dispatched"));
    });

    // Reads only detect disconnects.
    while let Some(frame) = receiver.next().await {
        if frame.is_err() {
            break;
        }
    }

    info!("agent disconnected (control)");
    dispatch.abort();
    state.hub.update_agent_count(-1);
}

/// Query string for the data plane.
#[derive(Debug, Deserialize)]
pub struct DataQuery {
    pub job_id: String,
}

/// GET /agent/data?job_id=…
pub async fn agent_data(
    State(state): State<AppState>,
    Query(query): Query<DataQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    info!(job_id = %query.job_id, "agent connected (data stream)");
    ws.on_upgrade(move |socket| data_loop(state, socket, query.job_id))
}

async fn data_loop(state: AppState, mut socket: WebSocket, job_id: String) {
    let mut columns: Option<Vec<String>> = None;
    let mut rows: u64 = 0;

    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Binary(frame) => {
                if columns.is_none() {
                    match wire::decode_columns(&frame) {
                        Ok(schema) => {
                            info!(job_id = %job_id, columns = ?schema, "received schema");
                            columns = Some(schema);
                        }
                        Err(e) => {
                            error!(job_id = %job_id, error = %e, "failed to decode columns");
                            break;
                        }
                    }
                    continue;
                }
                match wire::decode_row(&frame) {
                    Ok(_row) => {
                        rows += 1;
                        if rows % PROGRESS_EVERY == 0 {
                            state
                                .hub
                                .broadcast(&DashboardUpdate::progress(job_id.clone(), rows));
                        }
                    }
                    Err(e) => {
                        warn!(job_id = %job_id, error = %e, "stream ended");
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => continue,
        }
    }

    info!(job_id = %job_id, total_rows = rows, "data stream complete");
    state
        .hub
        .broadcast(&DashboardUpdate::job_complete(job_id, rows));
}

/// GET /dashboard/stream
pub async fn dashboard_stream(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| dashboard_loop(state, socket))
}

async fn dashboard_loop(state: AppState, socket: WebSocket) {
    let (id, mut events) = state.hub.register();
    let (mut sender, mut receiver) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(payload) = events.recv().await {
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    // Read and discard frames until the peer closes.
    while let Some(frame) = receiver.next().await {
        if frame.is_err() {
            break;
        }
    }

    state.hub.unregister(id);
    writer.abort();
}
