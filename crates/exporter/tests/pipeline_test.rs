//! End-to-end pipeline tests over a mock driver and in-memory storage.

use async_trait::async_trait;
use domain::{ExportFormat, ScalarValue};
use exporter::driver::{Driver, DriverError, RowStream};
use exporter::pipeline::{run_export, ExportError};
use exporter::storage::{ObjectStoreProvider, StorageProvider};
use flate2::read::GzDecoder;
use std::io::Read;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

struct MockStream {
    columns: Vec<String>,
    rows: Vec<Vec<ScalarValue>>,
    fail_after: Option<usize>,
    served: usize,
}

#[async_trait]
impl RowStream for MockStream {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<ScalarValue>>, DriverError> {
        if let Some(limit) = self.fail_after {
            if self.served >= limit {
                return Err(DriverError::Query("connection reset".to_string()));
            }
        }
        if self.served >= self.rows.len() {
            return Ok(None);
        }
        let row = self.rows[self.served].clone();
        self.served += 1;
        Ok(Some(row))
    }

    async fn close(&mut self) {}
}

struct MockDriver {
    columns: Vec<String>,
    rows: Vec<Vec<ScalarValue>>,
    fail_after: Option<usize>,
}

impl MockDriver {
    fn new(columns: &[&str], rows: Vec<Vec<ScalarValue>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            fail_after: None,
        }
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn ping(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn query(
        &self,
        _query: &str,
        _scope: CancellationToken,
    ) -> Result<Box<dyn RowStream>, DriverError> {
        Ok(Box::new(MockStream {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            fail_after: self.fail_after,
            served: 0,
        }))
    }

    async fn close(&self) {}
}

async fn stored_bytes(storage: &ObjectStoreProvider, key: &str) -> Vec<u8> {
    let mut reader = storage.open_file(key).await.expect("object exists");
    let mut content = Vec::new();
    reader.read_to_end(&mut content).await.unwrap();
    content
}

#[tokio::test]
async fn test_csv_export_end_to_end() {
    let driver = MockDriver::new(
        &["id", "name"],
        vec![
            vec![ScalarValue::Int(1), ScalarValue::Text("alice".to_string())],
            vec![ScalarValue::Int(2), ScalarValue::Text("bob".to_string())],
        ],
    );
    let storage = ObjectStoreProvider::in_memory();
    let scope = CancellationToken::new();

    let stats = run_export(
        &driver,
        &storage,
        "exports/job.csv",
        ExportFormat::Csv,
        false,
        "SELECT id, name FROM users",
        &scope,
        None,
    )
    .await
    .unwrap();

    assert_eq!(stats.rows_processed, 2);
    let content = stored_bytes(&storage, "exports/job.csv").await;
    assert_eq!(content, b"id,name\n1,alice\n2,bob\n");
}

#[tokio::test]
async fn test_empty_result_writes_header_only() {
    let driver = MockDriver::new(&["id"], vec![]);
    let storage = ObjectStoreProvider::in_memory();

    let stats = run_export(
        &driver,
        &storage,
        "exports/empty.csv",
        ExportFormat::Csv,
        false,
        "SELECT id FROM users LIMIT 0",
        &CancellationToken::new(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(stats.rows_processed, 0);
    let content = stored_bytes(&storage, "exports/empty.csv").await;
    assert_eq!(content, b"id\n");
}

#[tokio::test]
async fn test_gzip_round_trip() {
    let driver = MockDriver::new(
        &["v"],
        vec![vec![ScalarValue::Text("payload".to_string())]],
    );
    let storage = ObjectStoreProvider::in_memory();

    run_export(
        &driver,
        &storage,
        "exports/job.csv.gz",
        ExportFormat::Csv,
        true,
        "SELECT v FROM t",
        &CancellationToken::new(),
        None,
    )
    .await
    .unwrap();

    let compressed = stored_bytes(&storage, "exports/job.csv.gz").await;
    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut decompressed = String::new();
    decoder.read_to_string(&mut decompressed).unwrap();
    assert_eq!(decompressed, "v\npayload\n");
}

#[tokio::test]
async fn test_jsonl_export() {
    let driver = MockDriver::new(
        &["id", "ok"],
        vec![vec![ScalarValue::Int(1), ScalarValue::Bool(true)]],
    );
    let storage = ObjectStoreProvider::in_memory();

    run_export(
        &driver,
        &storage,
        "exports/job.json",
        ExportFormat::Json,
        false,
        "SELECT id, ok FROM t",
        &CancellationToken::new(),
        None,
    )
    .await
    .unwrap();

    let content = stored_bytes(&storage, "exports/job.json").await;
    let line: serde_json::Value = serde_json::from_slice(&content).unwrap();
    assert_eq!(line["id"], serde_json::json!(1));
    assert_eq!(line["ok"], serde_json::json!(true));
}

#[tokio::test]
async fn test_mid_stream_error_takes_precedence() {
    let mut driver = MockDriver::new(
        &["id"],
        vec![vec![ScalarValue::Int(1)], vec![ScalarValue::Int(2)]],
    );
    driver.fail_after = Some(1);
    let storage = ObjectStoreProvider::in_memory();

    let err = run_export(
        &driver,
        &storage,
        "exports/fail.csv",
        ExportFormat::Csv,
        false,
        "SELECT id FROM t",
        &CancellationToken::new(),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ExportError::Export(_)));
    // The sink was still closed in order: the object exists with the bytes
    // that made it through before the failure.
    assert!(storage.open_file("exports/fail.csv").await.is_ok());
}

#[tokio::test]
async fn test_cancellation_mid_stream() {
    let rows: Vec<Vec<ScalarValue>> = (0..1000).map(|i| vec![ScalarValue::Int(i)]).collect();
    let driver = MockDriver::new(&["id"], rows);
    let storage = ObjectStoreProvider::in_memory();
    let scope = CancellationToken::new();

    // Cancel as soon as the first progress tick fires.
    let cancel_scope = scope.clone();
    let mut on_progress = move |rows: u64| {
        if rows >= 10 {
            cancel_scope.cancel();
        }
    };

    let err = run_export(
        &driver,
        &storage,
        "exports/cancelled.csv",
        ExportFormat::Csv,
        false,
        "SELECT id FROM t",
        &scope,
        Some(&mut on_progress),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ExportError::Cancelled));
}

#[tokio::test]
async fn test_progress_callback_fires_every_ten_rows() {
    let rows: Vec<Vec<ScalarValue>> = (0..25).map(|i| vec![ScalarValue::Int(i)]).collect();
    let driver = MockDriver::new(&["id"], rows);
    let storage = ObjectStoreProvider::in_memory();

    let mut ticks = Vec::new();
    let mut on_progress = |rows: u64| ticks.push(rows);

    run_export(
        &driver,
        &storage,
        "exports/progress.csv",
        ExportFormat::Csv,
        false,
        "SELECT id FROM t",
        &CancellationToken::new(),
        Some(&mut on_progress),
    )
    .await
    .unwrap();

    assert_eq!(ticks, vec![10, 20]);
}

#[tokio::test]
async fn test_xlsx_export_produces_package() {
    let driver = MockDriver::new(
        &["id"],
        vec![vec![ScalarValue::Int(1)], vec![ScalarValue::Int(2)]],
    );
    let storage = ObjectStoreProvider::in_memory();

    let stats = run_export(
        &driver,
        &storage,
        "exports/job.xlsx",
        ExportFormat::Excel,
        false,
        "SELECT id FROM t",
        &CancellationToken::new(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(stats.rows_processed, 2);
    let content = stored_bytes(&storage, "exports/job.xlsx").await;
    assert_eq!(&content[..2], b"PK");
}

#[tokio::test]
async fn test_pdf_export_produces_document() {
    let driver = MockDriver::new(&["id"], vec![vec![ScalarValue::Int(1)]]);
    let storage = ObjectStoreProvider::in_memory();

    run_export(
        &driver,
        &storage,
        "exports/job.pdf",
        ExportFormat::Pdf,
        false,
        "SELECT id FROM t",
        &CancellationToken::new(),
        None,
    )
    .await
    .unwrap();

    let content = stored_bytes(&storage, "exports/job.pdf").await;
    assert_eq!(&content[..5], b"%PDF-");
}
