//! Driver abstraction over relational and document stores.
//!
//! A [`Driver`] turns a query into a [`RowStream`]: a forward-only, lazy
//! cursor yielding positional [`ScalarValue`] rows. Relational drivers run
//! the query inside a read-only repeatable-read transaction so long scans
//! see a consistent snapshot, and forward rows one at a time so memory stays
//! bounded regardless of result size.

use async_trait::async_trait;
use domain::ScalarValue;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod mongo;
pub mod mysql;
pub mod postgres;

pub use mongo::MongoDriver;
pub use mysql::MySqlDriver;
pub use postgres::PostgresDriver;

/// Errors produced by drivers and cursors.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("query execution failed: {0}")]
    Query(String),

    #[error("row decode failed: {0}")]
    Decode(String),

    #[error("query cancelled")]
    Cancelled,
}

/// Forward-only lazy cursor over a query result. Rows are not restartable.
#[async_trait]
pub trait RowStream: Send {
    /// Column names in query order. Valid immediately after `query` returns,
    /// even for empty results.
    fn columns(&self) -> &[String];

    /// Advances the cursor. `Ok(None)` signals exhaustion.
    async fn next_row(&mut self) -> Result<Option<Vec<ScalarValue>>, DriverError>;

    /// Releases server-side resources. Safe to call in any state.
    async fn close(&mut self);
}

/// Uniform handle over a database connection.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Driver name, e.g. "mysql".
    fn name(&self) -> &'static str;

    /// Verifies connectivity and authentication.
    async fn ping(&self) -> Result<(), DriverError>;

    /// Executes a query and returns a streaming cursor. Connections are
    /// established lazily on first use.
    async fn query(
        &self,
        query: &str,
        scope: CancellationToken,
    ) -> Result<Box<dyn RowStream>, DriverError>;

    /// Terminates pooled connections. Idempotent.
    async fn close(&self);
}

/// Cursor fed by a pump task over a capacity-1 channel.
///
/// The pump owns the connection and transaction; bounding the channel at one
/// row enforces server-side streaming end to end.
pub(crate) struct ChannelRowStream {
    columns: Vec<String>,
    rx: mpsc::Receiver<Result<Vec<ScalarValue>, DriverError>>,
    done: bool,
}

impl ChannelRowStream {
    pub(crate) fn new(
        columns: Vec<String>,
        rx: mpsc::Receiver<Result<Vec<ScalarValue>, DriverError>>,
    ) -> Self {
        Self {
            columns,
            rx,
            done: false,
        }
    }
}

#[async_trait]
impl RowStream for ChannelRowStream {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<ScalarValue>>, DriverError> {
        if self.done {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => {
                self.done = true;
                Err(e)
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) {
        // Closing the receiver makes the pump's next send fail, which rolls
        // back its transaction and ends the task.
        self.rx.close();
        self.done = true;
    }
}
