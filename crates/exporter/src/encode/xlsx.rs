//! XLSX row encoder.
//!
//! Writes rows into a single worksheet. Numbers and booleans are written as
//! native cell types; everything else is written as text with the formula
//! mitigation applied. The workbook package is produced at finalization.

use domain::{harden_cell, ScalarValue};
use rust_xlsxwriter::Workbook;

use super::{EncodeError, RowEncoder};

/// Hard limit on worksheet rows, header included.
const MAX_ROWS: u32 = 1_048_576;

/// Streaming XLSX encoder.
pub struct XlsxEncoder {
    workbook: Workbook,
    row_idx: u32,
    header_written: bool,
    err: Option<String>,
}

impl XlsxEncoder {
    pub fn new() -> Self {
        let mut workbook = Workbook::new();
        workbook.add_worksheet();
        Self {
            workbook,
            row_idx: 0,
            header_written: false,
            err: None,
        }
    }

    fn guard(&self) -> Result<(), EncodeError> {
        match &self.err {
            Some(msg) => Err(EncodeError::Sticky(msg.clone())),
            None => Ok(()),
        }
    }

    fn record_failure(&mut self, err: EncodeError) -> EncodeError {
        self.err = Some(err.to_string());
        err
    }

    fn write_cells(&mut self, values: &[ScalarValue]) -> Result<(), EncodeError> {
        let row = self.row_idx;
        let worksheet = self
            .workbook
            .worksheet_from_index(0)
            .map_err(|e| EncodeError::Xlsx(e.to_string()))?;

        for (i, value) in values.iter().enumerate() {
            let col = i as u16;
            let result = match value {
                ScalarValue::Int(v) => worksheet.write_number(row, col, *v as f64),
                ScalarValue::Float(v) => worksheet.write_number(row, col, *v),
                ScalarValue::Bool(v) => worksheet.write_boolean(row, col, *v),
                other => worksheet.write_string(row, col, harden_cell(other.render())),
            };
            result.map_err(|e| EncodeError::Xlsx(e.to_string()))?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn force_row_index(&mut self, idx: u32) {
        self.row_idx = idx;
    }
}

impl Default for XlsxEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RowEncoder for XlsxEncoder {
    fn write_header(&mut self, columns: &[String]) -> Result<(), EncodeError> {
        self.guard()?;
        if self.header_written {
            return Err(self.record_failure(EncodeError::HeaderState));
        }
        self.header_written = true;

        let header: Vec<ScalarValue> = columns
            .iter()
            .map(|c| ScalarValue::Text(c.clone()))
            .collect();
        match self.write_cells(&header) {
            Ok(()) => {
                self.row_idx += 1;
                Ok(())
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    fn write_row(&mut self, values: &[ScalarValue]) -> Result<(), EncodeError> {
        self.guard()?;
        if !self.header_written {
            return Err(self.record_failure(EncodeError::HeaderState));
        }
        if self.row_idx >= MAX_ROWS {
            return Err(self.record_failure(EncodeError::Overflow));
        }
        match self.write_cells(values) {
            Ok(()) => {
                self.row_idx += 1;
                Ok(())
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    fn drain(&mut self) -> Result<Vec<u8>, EncodeError> {
        self.guard()?;
        // The workbook package can only be produced as a whole at finish.
        Ok(Vec::new())
    }

    fn finish(&mut self) -> Result<Vec<u8>, EncodeError> {
        self.guard()?;
        self.workbook
            .save_to_buffer()
            .map_err(|e| self.record_failure(EncodeError::Xlsx(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_produces_xlsx_package() {
        let mut enc = XlsxEncoder::new();
        enc.write_header(&["id".to_string(), "name".to_string()])
            .unwrap();
        enc.write_row(&[
            ScalarValue::Int(1),
            ScalarValue::Text("alice".to_string()),
        ])
        .unwrap();
        assert!(enc.drain().unwrap().is_empty());
        let bytes = enc.finish().unwrap();
        // XLSX packages are zip archives.
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_row_limit_overflow() {
        let mut enc = XlsxEncoder::new();
        enc.write_header(&["v".to_string()]).unwrap();
        enc.force_row_index(MAX_ROWS - 1);
        // Last admissible row.
        enc.write_row(&[ScalarValue::Int(1)]).unwrap();
        // The next one would exceed the worksheet limit.
        let err = enc.write_row(&[ScalarValue::Int(2)]).unwrap_err();
        assert!(matches!(err, EncodeError::Overflow));
        // Overflow is sticky.
        let err = enc.write_row(&[ScalarValue::Int(3)]).unwrap_err();
        assert!(matches!(err, EncodeError::Sticky(_)));
    }

    #[test]
    fn test_row_before_header_rejected() {
        let mut enc = XlsxEncoder::new();
        assert!(matches!(
            enc.write_row(&[ScalarValue::Int(1)]),
            Err(EncodeError::HeaderState)
        ));
    }

    #[test]
    fn test_formula_text_written_with_apostrophe() {
        let mut enc = XlsxEncoder::new();
        enc.write_header(&["v".to_string()]).unwrap();
        enc.write_row(&[ScalarValue::Text("=SUM(A1)".to_string())])
            .unwrap();
        let bytes = enc.finish().unwrap();
        assert!(!bytes.is_empty());
    }
}
