//! Export job lifecycle model.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Lifecycle state of an export job.
///
/// Transitions are monotonic: `Pending → Processing → (Completed | Failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Requested output format for an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Excel,
    Pdf,
}

impl ExportFormat {
    /// File extension used in the object-store key.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Excel => "xlsx",
            ExportFormat::Pdf => "pdf",
        }
    }
}

/// Metrics collected while streaming an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    /// Number of data rows written (header excluded).
    pub rows_processed: u64,
    /// Wall-clock time spent executing the query and streaming rows.
    pub query_duration: Duration,
}

/// A single unit of work for the export service.
///
/// The job is created by the submission handler and exclusively owned by one
/// worker from dequeue until it reaches a terminal state. The `scope` token
/// propagates cancellation to the cursor, the encoder loop, and the storage
/// upload task.
#[derive(Debug)]
pub struct ExportJob {
    /// Unique job id (UUID v4).
    pub id: String,
    /// SELECT-only query text.
    pub query: String,
    /// Recipient address for the completion notification.
    pub email: String,
    /// Requested output format.
    pub format: ExportFormat,
    /// Lifecycle timestamps. Invariant: submitted ≤ started ≤ finished.
    pub submitted: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Terminal error, set only when the job failed.
    pub error: Option<String>,
    /// Streaming metrics, set on success.
    pub stats: Option<ExportStats>,
    /// Object-store key, derived by the worker before opening the sink.
    pub storage_key: String,
    /// Maximum duration the job may run after submission.
    pub deadline: Duration,
    /// Cancellation scope shared by every stage of the pipeline.
    pub scope: CancellationToken,
}

impl ExportJob {
    /// Creates a new pending job with a fresh id and cancellation scope.
    pub fn new(query: String, email: String, format: ExportFormat, deadline: Duration) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query,
            email,
            format,
            submitted: Utc::now(),
            started: None,
            finished: None,
            status: JobStatus::Pending,
            error: None,
            stats: None,
            storage_key: String::new(),
            deadline,
            scope: CancellationToken::new(),
        }
    }

    /// Marks the job as picked up by a worker.
    pub fn mark_processing(&mut self) {
        self.started = Some(Utc::now());
        self.status = JobStatus::Processing;
    }

    /// Marks the job as successfully completed.
    pub fn mark_completed(&mut self, stats: ExportStats) {
        self.stats = Some(stats);
        self.finished = Some(Utc::now());
        self.status = JobStatus::Completed;
    }

    /// Marks the job as failed with a terminal error.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.finished = Some(Utc::now());
        self.status = JobStatus::Failed;
    }

    /// Time the job spent queued before a worker picked it up.
    pub fn wait_time(&self) -> Option<chrono::Duration> {
        self.started.map(|s| s - self.submitted)
    }

    /// Total processing time from pickup to terminal state.
    pub fn total_duration(&self) -> Option<chrono::Duration> {
        match (self.started, self.finished) {
            (Some(s), Some(f)) => Some(f - s),
            _ => None,
        }
    }
}
