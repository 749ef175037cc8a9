//! The streaming export chain: cursor → encoder → optional gzip → sink.
//!
//! Whatever happens inside the row loop, the stages are closed in a fixed
//! order — encoder, gzip, sink — and the upload's completion signal is always
//! consumed afterwards. Errors are aggregated with strict precedence so the
//! first failure in pipeline order becomes the job error.

use std::io::Write;
use std::time::Instant;

use domain::{ExportFormat, ExportStats};
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::driver::{Driver, DriverError};
use crate::encode::{encoder_for, RowEncoder};
use crate::storage::{StorageProvider, StorageSink};

/// Broadcast a progress update every this many rows.
const PROGRESS_INTERVAL: u64 = 10;

/// Terminal error of an export pipeline, in aggregation precedence order.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export failed: {0}")]
    Export(String),

    #[error("encoder close failed: {0}")]
    EncoderClose(String),

    #[error("gzip close failed: {0}")]
    GzipClose(String),

    #[error("storage close failed: {0}")]
    StorageClose(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("job cancelled")]
    Cancelled,
}

/// Runs one export end to end and returns its stats.
///
/// The DB semaphore is the caller's concern; this function only drives the
/// streaming chain for an already-admitted job.
pub async fn run_export(
    driver: &dyn Driver,
    storage: &dyn StorageProvider,
    key: &str,
    format: ExportFormat,
    use_gzip: bool,
    query: &str,
    scope: &CancellationToken,
    mut on_progress: Option<&mut (dyn FnMut(u64) + Send)>,
) -> Result<ExportStats, ExportError> {
    let (sink, completion) = storage.open_sink(key, scope.clone());
    let mut output = OutputStage::new(sink, use_gzip);
    let mut encoder = encoder_for(format);

    let export_result = stream_rows(
        driver,
        encoder.as_mut(),
        &mut output,
        query,
        scope,
        &mut on_progress,
    )
    .await;

    // Close order: encoder first (trailers), then gzip (footer), then the
    // sink (EOF to the uploader), then wait for the upload result.
    let mut encoder_close_err: Option<String> = None;
    match encoder.finish() {
        Ok(trailer) => {
            if let Err(e) = output.write(&trailer).await {
                encoder_close_err = Some(e.to_string());
            }
        }
        Err(e) => encoder_close_err = Some(e.to_string()),
    }

    let (mut sink, gzip_close_err) = output.finish().await;
    let storage_close_err = sink.shutdown().await.err().map(|e| e.to_string());

    let upload_err = match completion.await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some("upload task ended without reporting a result".to_string()),
    };

    let stats = export_result?;
    if let Some(msg) = encoder_close_err {
        return Err(ExportError::EncoderClose(msg));
    }
    if let Some(msg) = gzip_close_err {
        return Err(ExportError::GzipClose(msg));
    }
    if let Some(msg) = storage_close_err {
        return Err(ExportError::StorageClose(msg));
    }
    if let Some(msg) = upload_err {
        return Err(ExportError::Upload(msg));
    }
    Ok(stats)
}

async fn stream_rows(
    driver: &dyn Driver,
    encoder: &mut dyn RowEncoder,
    output: &mut OutputStage,
    query: &str,
    scope: &CancellationToken,
    on_progress: &mut Option<&mut (dyn FnMut(u64) + Send)>,
) -> Result<ExportStats, ExportError> {
    let start = Instant::now();

    let mut cursor = driver
        .query(query, scope.clone())
        .await
        .map_err(map_driver_error)?;

    let result = async {
        let columns = cursor.columns().to_vec();
        encoder
            .write_header(&columns)
            .map_err(|e| ExportError::Export(format!("failed to write header: {}", e)))?;

        let mut rows: u64 = 0;
        loop {
            if scope.is_cancelled() {
                return Err(ExportError::Cancelled);
            }
            match cursor.next_row().await.map_err(map_driver_error)? {
                Some(values) => {
                    encoder
                        .write_row(&values)
                        .map_err(|e| ExportError::Export(format!("row write failed: {}", e)))?;
                    rows += 1;

                    let chunk = encoder
                        .drain()
                        .map_err(|e| ExportError::Export(e.to_string()))?;
                    if !chunk.is_empty() {
                        output
                            .write(&chunk)
                            .await
                            .map_err(|e| ExportError::Export(e.to_string()))?;
                    }

                    if rows % PROGRESS_INTERVAL == 0 {
                        if let Some(callback) = on_progress.as_mut() {
                            callback(rows);
                        }
                    }
                }
                None => {
                    let chunk = encoder
                        .drain()
                        .map_err(|e| ExportError::Export(e.to_string()))?;
                    if !chunk.is_empty() {
                        output
                            .write(&chunk)
                            .await
                            .map_err(|e| ExportError::Export(e.to_string()))?;
                    }
                    return Ok(rows);
                }
            }
        }
    }
    .await;

    cursor.close().await;

    result.map(|rows| ExportStats {
        rows_processed: rows,
        query_duration: start.elapsed(),
    })
}

fn map_driver_error(err: DriverError) -> ExportError {
    match err {
        DriverError::Cancelled => ExportError::Cancelled,
        other => ExportError::Export(other.to_string()),
    }
}

/// The sink with an optional gzip stage in front of it.
struct OutputStage {
    sink: StorageSink,
    gzip: Option<GzEncoder<Vec<u8>>>,
}

impl OutputStage {
    fn new(sink: StorageSink, use_gzip: bool) -> Self {
        let gzip = use_gzip.then(|| GzEncoder::new(Vec::new(), Compression::default()));
        Self { sink, gzip }
    }

    async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        match &mut self.gzip {
            Some(encoder) => {
                encoder.write_all(chunk)?;
                let compressed = std::mem::take(encoder.get_mut());
                if !compressed.is_empty() {
                    self.sink.write_all(&compressed).await?;
                }
                Ok(())
            }
            None => self.sink.write_all(chunk).await,
        }
    }

    /// Flushes the gzip footer (if any) and hands the sink back for shutdown.
    async fn finish(mut self) -> (StorageSink, Option<String>) {
        let gzip_err = match self.gzip.take() {
            None => None,
            Some(encoder) => match encoder.finish() {
                Ok(tail) => self
                    .sink
                    .write_all(&tail)
                    .await
                    .err()
                    .map(|e| e.to_string()),
                Err(e) => Some(e.to_string()),
            },
        };
        (self.sink, gzip_err)
    }
}
