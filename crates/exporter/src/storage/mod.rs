//! Streaming sinks over object-store backends.
//!
//! A provider hands the pipeline the write end of an in-memory pipe plus a
//! one-shot completion receiver. A detached task uploads whatever is written
//! to the pipe; the completion receiver yields the upload's terminal result
//! only after the sink has been shut down and the upload finished. The
//! pipeline must therefore close the sink before awaiting the completion.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, WriteMultipart};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::oneshot;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

/// Multipart part size used for uploads.
const PART_SIZE: usize = 10 * 1024 * 1024;

/// Maximum concurrently in-flight upload parts.
const UPLOAD_CONCURRENCY: usize = 5;

/// Capacity of the in-memory pipe between the pipeline and the uploader.
const PIPE_BUFFER: usize = 64 * 1024;

/// The writable end of the storage pipeline.
pub type StorageSink = Box<dyn AsyncWrite + Send + Unpin>;

/// One-shot delivery of the upload's terminal status.
pub type UploadResult = oneshot::Receiver<Result<(), StorageError>>;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload cancelled")]
    Cancelled,

    #[error("invalid storage configuration: {0}")]
    Config(String),
}

/// Streaming destination for exported objects.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Opens a streaming sink for `key`.
    ///
    /// The upload task observes `scope`: cancelling it aborts the upload,
    /// which is then reported on the completion receiver.
    fn open_sink(&self, key: &str, scope: CancellationToken) -> (StorageSink, UploadResult);

    /// Opens the stored object for reading.
    async fn open_file(
        &self,
        key: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, StorageError>;

    /// Returns a user-facing URL for the stored object.
    fn download_url(&self, key: &str) -> String;
}

/// S3 connection settings.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub region: String,
    pub bucket: String,
    /// Custom endpoint for non-AWS S3 providers (MinIO and friends).
    pub endpoint: String,
    /// Path-style addressing, required by some S3 providers.
    pub path_style: bool,
}

enum Location {
    Local { base: PathBuf },
    S3 { bucket: String },
    Memory,
}

/// Storage provider backed by an `object_store` backend.
pub struct ObjectStoreProvider {
    store: Arc<dyn ObjectStore>,
    location: Location,
}

impl ObjectStoreProvider {
    /// Local filesystem storage rooted at `base_path`.
    pub fn local(base_path: &str) -> Result<Self, StorageError> {
        std::fs::create_dir_all(base_path)?;
        let base = std::fs::canonicalize(base_path)?;
        let store = LocalFileSystem::new_with_prefix(&base)?;
        Ok(Self {
            store: Arc::new(store),
            location: Location::Local { base },
        })
    }

    /// S3-compatible bucket storage.
    pub fn s3(config: &S3Config) -> Result<Self, StorageError> {
        if config.bucket.is_empty() {
            return Err(StorageError::Config("S3_BUCKET is required".to_string()));
        }
        let mut builder = AmazonS3Builder::from_env()
            .with_region(config.region.clone())
            .with_bucket_name(config.bucket.clone());
        if !config.endpoint.is_empty() {
            builder = builder
                .with_endpoint(config.endpoint.clone())
                .with_allow_http(true);
        }
        if config.path_style {
            builder = builder.with_virtual_hosted_style_request(false);
        }
        let store = builder.build()?;
        Ok(Self {
            store: Arc::new(store),
            location: Location::S3 {
                bucket: config.bucket.clone(),
            },
        })
    }

    /// In-memory storage, used by tests.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            location: Location::Memory,
        }
    }
}

#[async_trait]
impl StorageProvider for ObjectStoreProvider {
    fn open_sink(&self, key: &str, scope: CancellationToken) -> (StorageSink, UploadResult) {
        let (result_tx, result_rx) = oneshot::channel();
        let (writer, reader) = tokio::io::duplex(PIPE_BUFFER);
        let store = Arc::clone(&self.store);
        let path = ObjectPath::from(key);
        let key = key.to_string();

        tokio::spawn(async move {
            let result = upload_from_pipe(store, path, reader, scope).await;
            match &result {
                Ok(()) => tracing::info!(key = %key, "upload finished"),
                Err(e) => tracing::error!(key = %key, error = %e, "upload failed"),
            }
            let _ = result_tx.send(result);
        });

        (Box::new(writer), result_rx)
    }

    async fn open_file(
        &self,
        key: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, StorageError> {
        let path = ObjectPath::from(key);
        let result = self.store.get(&path).await?;
        let stream = result
            .into_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(Box::new(StreamReader::new(stream)))
    }

    fn download_url(&self, key: &str) -> String {
        match &self.location {
            Location::Local { base } => format!("file://{}", base.join(key).display()),
            Location::S3 { bucket } => format!("s3://{}/{}", bucket, key),
            Location::Memory => format!("memory://{}", key),
        }
    }
}

/// Reads the pipe until EOF, uploading 10 MiB multipart chunks with bounded
/// concurrency. Cancellation aborts the transfer and surfaces as an error.
async fn upload_from_pipe(
    store: Arc<dyn ObjectStore>,
    path: ObjectPath,
    mut reader: tokio::io::DuplexStream,
    scope: CancellationToken,
) -> Result<(), StorageError> {
    let upload = store.put_multipart(&path).await?;
    let mut write = WriteMultipart::new_with_chunk_size(upload, PART_SIZE);
    let mut buf = vec![0u8; PIPE_BUFFER];

    loop {
        let n = tokio::select! {
            biased;
            _ = scope.cancelled() => {
                write.abort().await?;
                return Err(StorageError::Cancelled);
            }
            read = reader.read(&mut buf) => read?,
        };
        if n == 0 {
            break;
        }
        write.wait_for_capacity(UPLOAD_CONCURRENCY).await?;
        write.write(&buf[..n]);
    }

    write.finish().await?;
    Ok(())
}
