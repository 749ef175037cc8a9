//! Agent runtime: control-plane client and per-job data streaming.

use std::sync::Arc;
use std::time::Duration;

use domain::{wire, JobCommand};
use exporter::driver::Driver;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Initial reconnect delay for the control plane.
const BACKOFF_INITIAL: Duration = Duration::from_secs(1);

/// Upper bound on the reconnect delay.
const BACKOFF_MAX: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid agent key header")]
    InvalidKeyHeader,
}

/// Long-running agent connected to the reactor's control plane.
pub struct Agent {
    config: crate::config::AgentConfig,
    driver: Arc<dyn Driver>,
}

impl Agent {
    pub fn new(config: crate::config::AgentConfig, driver: Arc<dyn Driver>) -> Self {
        Self { config, driver }
    }

    /// Runs the control-plane loop forever, reconnecting with exponential
    /// backoff when the connection drops.
    pub async fn run(&self) {
        let mut backoff = BACKOFF_INITIAL;
        loop {
            match self.serve_control_plane().await {
                Ok(()) => {
                    info!("control plane closed by reactor");
                    backoff = BACKOFF_INITIAL;
                }
                Err(e) => {
                    error!(error = %e, "control plane failure");
                }
            }
            warn!(delay = ?backoff, "reconnecting to control plane");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(BACKOFF_MAX);
        }
    }

    /// Connects to the control plane and serves commands until the socket
    /// drops.
    async fn serve_control_plane(&self) -> Result<(), AgentError> {
        let url = format!("{}/agent/control", self.config.reactor_url);
        let request = signed_request(&url, &self.config.agent_key)?;
        let (stream, _) = connect_async(request).await?;
        info!("connected to reactor control plane");

        let (_sink, mut reader) = stream.split();
        while let Some(frame) = reader.next().await {
            match frame? {
                Message::Text(payload) => match serde_json::from_str::<JobCommand>(&payload) {
                    Ok(command) => {
                        info!(job_id = %command.id, query = %command.query, "received job");
                        let driver = Arc::clone(&self.driver);
                        let reactor_url = self.config.reactor_url.clone();
                        let agent_key = self.config.agent_key.clone();
                        tokio::spawn(execute_job(driver, reactor_url, agent_key, command));
                    }
                    Err(e) => error!(error = %e, "invalid command"),
                },
                Message::Close(_) => break,
                _ => continue,
            }
        }
        Ok(())
    }
}

/// Executes one dispatched job: open the cursor, dial the data plane, send
/// the column record, then stream rows under socket backpressure. Errors
/// abort the job and are logged only.
async fn execute_job(
    driver: Arc<dyn Driver>,
    reactor_url: String,
    agent_key: String,
    command: JobCommand,
) {
    info!(job_id = %command.id, "executing job");
    let scope = CancellationToken::new();

    let mut cursor = match driver.query(&command.query, scope.clone()).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!(job_id = %command.id, error = %e, "query execution failed");
            return;
        }
    };

    let url = format!("{}/agent/data?job_id={}", reactor_url, command.id);
    let request = match signed_request(&url, &agent_key) {
        Ok(request) => request,
        Err(e) => {
            error!(job_id = %command.id, error = %e, "failed to build data request");
            cursor.close().await;
            return;
        }
    };
    let stream = match connect_async(request).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            error!(job_id = %command.id, error = %e, "failed to connect to data stream");
            cursor.close().await;
            return;
        }
    };
    let (mut sink, _reader) = stream.split();

    let columns = match wire::encode_columns(cursor.columns()) {
        Ok(frame) => frame,
        Err(e) => {
            error!(job_id = %command.id, error = %e, "failed to encode columns");
            cursor.close().await;
            return;
        }
    };
    if let Err(e) = sink.send(Message::Binary(columns)).await {
        error!(job_id = %command.id, error = %e, "failed to send columns");
        cursor.close().await;
        return;
    }

    let mut rows: u64 = 0;
    loop {
        match cursor.next_row().await {
            Ok(Some(values)) => {
                let frame = match wire::encode_row(&values) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!(job_id = %command.id, error = %e, "encode failed");
                        break;
                    }
                };
                if let Err(e) = sink.send(Message::Binary(frame)).await {
                    error!(job_id = %command.id, error = %e, "send failed");
                    break;
                }
                rows += 1;
            }
            Ok(None) => break,
            Err(e) => {
                error!(job_id = %command.id, error = %e, "scan failed");
                break;
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    cursor.close().await;
    info!(job_id = %command.id, rows, "job completed");
}

/// Builds a WebSocket client request carrying the agent key header.
fn signed_request(
    url: &str,
    agent_key: &str,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, AgentError> {
    let mut request = url.into_client_request()?;
    let value = HeaderValue::from_str(agent_key).map_err(|_| AgentError::InvalidKeyHeader)?;
    request.headers_mut().insert("X-Agent-Key", value);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_request_carries_key_header() {
        let request = signed_request("ws://localhost:8080/agent/control", "sk_live_abc").unwrap();
        assert_eq!(
            request.headers().get("X-Agent-Key").unwrap(),
            &HeaderValue::from_static("sk_live_abc")
        );
    }

    #[test]
    fn test_signed_request_rejects_bad_header_value() {
        let result = signed_request("ws://localhost:8080/agent/control", "bad\nkey");
        assert!(matches!(result, Err(AgentError::InvalidKeyHeader)));
    }

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut backoff = BACKOFF_INITIAL;
        let mut steps = Vec::new();
        for _ in 0..8 {
            steps.push(backoff);
            backoff = (backoff * 2).min(BACKOFF_MAX);
        }
        assert_eq!(steps[0], Duration::from_secs(1));
        assert_eq!(steps[5], Duration::from_secs(32));
        assert_eq!(steps[6], Duration::from_secs(60));
        assert_eq!(steps[7], Duration::from_secs(60));
    }
}
