//! Format-agnostic streaming row encoders.
//!
//! All encoders share the same contract: the header is written exactly once
//! before any row, a failed call puts the encoder into a sticky-error state,
//! and a partial row never appears in the output. Encoders buffer complete
//! encoded bytes internally; the pipeline periodically `drain`s them into the
//! (possibly gzipped) storage sink and calls `finish` for the trailer.

use std::io::Write;
use std::sync::{Arc, Mutex};

use domain::{ExportFormat, ScalarValue};
use thiserror::Error;

pub mod csv;
pub mod jsonl;
pub mod pdf;
pub mod xlsx;

pub use csv::CsvEncoder;
pub use jsonl::JsonLinesEncoder;
pub use pdf::PdfEncoder;
pub use xlsx::XlsxEncoder;

/// Errors produced while encoding rows.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("header must be written exactly once before any row")]
    HeaderState,

    #[error("excel row limit exceeded (1,048,576 rows)")]
    Overflow,

    #[error("encoder io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv encoding failed: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("xlsx encoding failed: {0}")]
    Xlsx(String),

    #[error("pdf encoding failed: {0}")]
    Pdf(String),

    #[error("encoder already failed: {0}")]
    Sticky(String),
}

/// Common contract for streaming row serializers.
pub trait RowEncoder: Send {
    /// Writes the column header. Must be called exactly once before any row.
    fn write_header(&mut self, columns: &[String]) -> Result<(), EncodeError>;

    /// Writes a single data row. The values must be positional with respect
    /// to the header columns.
    fn write_row(&mut self, values: &[ScalarValue]) -> Result<(), EncodeError>;

    /// Takes any complete encoded bytes buffered since the last drain.
    /// Formats that can only serialize at finalization return nothing here.
    fn drain(&mut self) -> Result<Vec<u8>, EncodeError>;

    /// Finalizes the document and returns the trailing bytes.
    fn finish(&mut self) -> Result<Vec<u8>, EncodeError>;
}

/// Instantiates the encoder matching the requested export format.
pub fn encoder_for(format: ExportFormat) -> Box<dyn RowEncoder> {
    match format {
        ExportFormat::Csv => Box::new(CsvEncoder::new()),
        ExportFormat::Json => Box::new(JsonLinesEncoder::new()),
        ExportFormat::Excel => Box::new(XlsxEncoder::new()),
        ExportFormat::Pdf => Box::new(PdfEncoder::new()),
    }
}

/// Shared byte buffer handed to writers that insist on owning their output.
///
/// The csv writer keeps its own 64 KiB buffer and flushes into this; `take`
/// then moves the flushed bytes onward without copying twice.
#[derive(Clone, Default)]
pub(crate) struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn take(&self) -> Vec<u8> {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut guard)
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_for_returns_format_specific_encoders() {
        // Each factory result accepts a header, which is the common contract.
        for format in [
            ExportFormat::Csv,
            ExportFormat::Json,
            ExportFormat::Excel,
            ExportFormat::Pdf,
        ] {
            let mut encoder = encoder_for(format);
            encoder
                .write_header(&["id".to_string()])
                .expect("header write");
        }
    }

    #[test]
    fn test_shared_buf_take_resets() {
        let mut buf = SharedBuf::new();
        buf.write_all(b"abc").unwrap();
        assert_eq!(buf.take(), b"abc");
        assert!(buf.take().is_empty());
    }
}
