//! Worker pool and job lifecycle.
//!
//! A fixed set of symmetric workers drains a bounded submission queue. A
//! separate weighted semaphore caps concurrent database scans well below the
//! worker count, so queued jobs wait on capacity instead of piling load onto
//! the database.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domain::{DashboardUpdate, ExportJob};
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::driver::Driver;
use crate::notify::Notifier;
use crate::pipeline::run_export;
use crate::storage::StorageProvider;

/// Largest export that may travel as an email attachment.
const MAX_ATTACHMENT_SIZE: usize = 25 * 1024 * 1024;

/// Receiver of job progress events (e.g. the dashboard hub).
pub trait ProgressSink: Send + Sync {
    fn publish(&self, update: DashboardUpdate);
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub max_db_concurrency: usize,
    pub use_gzip: bool,
    pub attach_file: bool,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_capacity: 100,
            max_db_concurrency: 3,
            use_gzip: false,
            attach_file: false,
        }
    }
}

struct WorkerContext {
    driver: Arc<dyn Driver>,
    storage: Arc<dyn StorageProvider>,
    notifier: Arc<dyn Notifier>,
    progress: Option<Arc<dyn ProgressSink>>,
    db_sem: Arc<Semaphore>,
    use_gzip: bool,
    attach_file: bool,
}

/// Bounded worker pool processing export jobs.
pub struct WorkerPool {
    queue_tx: mpsc::Sender<ExportJob>,
    quit_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts the workers and returns the running pool.
    pub fn start(
        config: WorkerPoolConfig,
        driver: Arc<dyn Driver>,
        storage: Arc<dyn StorageProvider>,
        notifier: Arc<dyn Notifier>,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (quit_tx, quit_rx) = watch::channel(false);

        let ctx = Arc::new(WorkerContext {
            driver,
            storage,
            notifier,
            progress,
            db_sem: Arc::new(Semaphore::new(config.max_db_concurrency)),
            use_gzip: config.use_gzip,
            attach_file: config.attach_file,
        });

        let handles = (0..config.workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&queue_rx),
                    quit_rx.clone(),
                    Arc::clone(&ctx),
                ))
            })
            .collect();

        info!(workers = config.workers, "worker pool started");
        Self {
            queue_tx,
            quit_tx,
            handles: Mutex::new(handles),
        }
    }

    /// Non-blocking admission. Returns false when the queue is full or the
    /// pool is shutting down.
    pub fn submit(&self, job: ExportJob) -> bool {
        if *self.quit_tx.borrow() {
            return false;
        }
        self.queue_tx.try_send(job).is_ok()
    }

    /// Graceful shutdown: stop admitting, then wait for in-flight jobs to
    /// reach a terminal state.
    pub async fn stop(&self) {
        let _ = self.quit_tx.send(true);
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("worker pool stopped");
    }
}

async fn worker_loop(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<ExportJob>>>,
    mut quit_rx: watch::Receiver<bool>,
    ctx: Arc<WorkerContext>,
) {
    debug!(worker_id = id, "worker started");
    loop {
        let job = {
            let mut rx = queue.lock().await;
            tokio::select! {
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => return,
                },
                _ = quit_rx.changed() => {
                    if *quit_rx.borrow() {
                        return;
                    }
                    continue;
                }
            }
        };
        process_job(id, job, &ctx).await;
    }
}

async fn process_job(worker_id: usize, mut job: ExportJob, ctx: &WorkerContext) {
    info!(worker_id, job_id = %job.id, "processing job");
    job.mark_processing();

    // Arm the deadline with whatever time is left after queueing.
    let queued = (Utc::now() - job.submitted).to_std().unwrap_or_default();
    let remaining = job.deadline.saturating_sub(queued);
    let deadline_scope = job.scope.clone();
    let watchdog = tokio::spawn(async move {
        tokio::time::sleep(remaining).await;
        deadline_scope.cancel();
    });

    let permit = tokio::select! {
        biased;
        _ = job.scope.cancelled() => {
            watchdog.abort();
            fail_job(&mut job, "failed to acquire db connection: job cancelled");
            return;
        }
        permit = Arc::clone(&ctx.db_sem).acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                watchdog.abort();
                fail_job(&mut job, "failed to acquire db connection: semaphore closed");
                return;
            }
        },
    };

    let ext = job.format.extension();
    job.storage_key = if ctx.use_gzip {
        format!("exports/{}.{}.gz", job.id, ext)
    } else {
        format!("exports/{}.{}", job.id, ext)
    };

    if let Some(progress) = &ctx.progress {
        progress.publish(DashboardUpdate::job_start(&job.id, "processing"));
    }

    let progress_sink = ctx.progress.clone();
    let progress_job_id = job.id.clone();
    let mut on_progress = move |rows: u64| {
        if let Some(sink) = &progress_sink {
            sink.publish(DashboardUpdate::progress(progress_job_id.clone(), rows));
        }
    };

    let result = run_export(
        ctx.driver.as_ref(),
        ctx.storage.as_ref(),
        &job.storage_key,
        job.format,
        ctx.use_gzip,
        &job.query,
        &job.scope,
        Some(&mut on_progress),
    )
    .await;

    drop(permit);
    watchdog.abort();

    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            fail_job(&mut job, e.to_string());
            return;
        }
    };

    job.mark_completed(stats);
    info!(job_id = %job.id, rows = stats.rows_processed, "job completed");
    if let Some(progress) = &ctx.progress {
        progress.publish(DashboardUpdate::job_complete(&job.id, stats.rows_processed));
    }

    let summary = build_summary(&job, queued);
    notify(ctx, &job, &summary).await;
}

fn fail_job(job: &mut ExportJob, error: impl Into<String>) {
    let error = error.into();
    error!(job_id = %job.id, error = %error, "job failed");
    job.mark_failed(error);
}

fn build_summary(job: &ExportJob, wait: Duration) -> String {
    let stats = job.stats.unwrap_or_default();
    let format_ts = |ts: Option<chrono::DateTime<Utc>>| {
        ts.map(|t| t.format("%Y-%m-%d %I:%M:%S %p").to_string())
            .unwrap_or_default()
    };
    let total = job
        .total_duration()
        .and_then(|d| d.to_std().ok())
        .unwrap_or_default();

    format!(
        "Job Summary:\n\
         ----------------\n\
         Job ID: {}\n\
         Rows Processed: {}\n\
         Submitted: {}\n\
         Started: {} (Wait: {:?})\n\
         Finished: {}\n\
         Total Duration: {:?}\n\
         Query Execution: {:?}\n",
        job.id,
        stats.rows_processed,
        job.submitted.format("%Y-%m-%d %I:%M:%S %p"),
        format_ts(job.started),
        wait,
        format_ts(job.finished),
        total,
        stats.query_duration,
    )
}

async fn notify(ctx: &WorkerContext, job: &ExportJob, summary: &str) {
    if ctx.attach_file {
        match read_attachment(ctx.storage.as_ref(), &job.storage_key).await {
            Ok(content) => {
                ctx.notifier
                    .send_with_attachment(&job.email, &job.storage_key, content, summary)
                    .await;
            }
            Err(reason) => {
                warn!(key = %job.storage_key, reason = %reason, "skipping attachment");
                let url = ctx.storage.download_url(&job.storage_key);
                let summary = format!(
                    "{}\nAttachment skipped: {}\nDownload Link: {}",
                    summary, reason, url
                );
                ctx.notifier
                    .send_download_link(&job.email, &url, &summary)
                    .await;
            }
        }
    } else {
        let url = ctx.storage.download_url(&job.storage_key);
        ctx.notifier
            .send_download_link(&job.email, &url, summary)
            .await;
    }
}

async fn read_attachment(storage: &dyn StorageProvider, key: &str) -> Result<Vec<u8>, String> {
    let reader = storage.open_file(key).await.map_err(|e| e.to_string())?;
    let mut limited = reader.take(MAX_ATTACHMENT_SIZE as u64 + 1);
    let mut content = Vec::new();
    limited
        .read_to_end(&mut content)
        .await
        .map_err(|e| e.to_string())?;
    if content.len() > MAX_ATTACHMENT_SIZE {
        return Err(format!(
            "file exceeds max attachment size ({} bytes)",
            MAX_ATTACHMENT_SIZE
        ));
    }
    Ok(content)
}
