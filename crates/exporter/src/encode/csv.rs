//! CSV row encoder.
//!
//! Wraps the csv crate's writer with a 64 KiB buffer and the shared type
//! coercions. Quoting follows RFC 4180; cells that could be interpreted as
//! spreadsheet formulas are prefixed with an apostrophe.

use domain::{harden_cell, ScalarValue};

use super::{EncodeError, RowEncoder, SharedBuf};

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Streaming CSV encoder.
pub struct CsvEncoder {
    writer: ::csv::Writer<SharedBuf>,
    out: SharedBuf,
    header_written: bool,
    err: Option<String>,
}

impl CsvEncoder {
    pub fn new() -> Self {
        let out = SharedBuf::new();
        let writer = ::csv::WriterBuilder::new()
            .buffer_capacity(WRITE_BUFFER_SIZE)
            .from_writer(out.clone());
        Self {
            writer,
            out,
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
}

impl Default for CsvEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RowEncoder for CsvEncoder {
    fn write_header(&mut self, columns: &[String]) -> Result<(), EncodeError> {
        self.guard()?;
        if self.header_written {
            return Err(self.record_failure(EncodeError::HeaderState));
        }
        self.header_written = true;
        self.writer
            .write_record(columns)
            .map_err(|e| self.record_failure(e.into()))
    }

    fn write_row(&mut self, values: &[ScalarValue]) -> Result<(), EncodeError> {
        self.guard()?;
        if !self.header_written {
            return Err(self.record_failure(EncodeError::HeaderState));
        }
        let record: Vec<String> = values.iter().map(|v| harden_cell(v.render())).collect();
        self.writer
            .write_record(&record)
            .map_err(|e| self.record_failure(e.into()))
    }

    fn drain(&mut self) -> Result<Vec<u8>, EncodeError> {
        self.guard()?;
        // The csv writer keeps partial data in its own buffer until it
        // overflows; only the already-flushed bytes move on here.
        Ok(self.out.take())
    }

    fn finish(&mut self) -> Result<Vec<u8>, EncodeError> {
        self.guard()?;
        self.writer
            .flush()
            .map_err(|e| self.record_failure(e.into()))?;
        Ok(self.out.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn encode_all(columns: &[&str], rows: &[Vec<ScalarValue>]) -> String {
        let mut enc = CsvEncoder::new();
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        enc.write_header(&columns).unwrap();
        let mut out = Vec::new();
        for row in rows {
            enc.write_row(row).unwrap();
            out.extend(enc.drain().unwrap());
        }
        out.extend(enc.finish().unwrap());
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_header_only_export() {
        let out = encode_all(&["id"], &[]);
        assert_eq!(out, "id\n");
    }

    #[test]
    fn test_scalar_coercions() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap();
        let out = encode_all(
            &["a", "b", "c", "d", "e"],
            &[vec![
                ScalarValue::Null,
                ScalarValue::Bool(true),
                ScalarValue::Int(12),
                ScalarValue::Float(3.5),
                ScalarValue::Timestamp(ts),
            ]],
        );
        assert_eq!(out, "a,b,c,d,e\nNULL,1,12,3.5,2024-05-06 07:08:09\n");
    }

    #[test]
    fn test_formula_injection_mitigated() {
        let out = encode_all(
            &["v"],
            &[vec![ScalarValue::Text("=1+2".to_string())]],
        );
        assert_eq!(out, "v\n'=1+2\n");
    }

    #[test]
    fn test_negative_number_gets_apostrophe() {
        // The mitigation applies to the rendered text, matching the rule that
        // any cell starting with a formula trigger is prefixed.
        let out = encode_all(&["v"], &[vec![ScalarValue::Int(-3)]]);
        assert_eq!(out, "v\n'-3\n");
    }

    #[test]
    fn test_quoting_of_embedded_separators() {
        let out = encode_all(
            &["v"],
            &[vec![ScalarValue::Text("a,b \"quoted\"".to_string())]],
        );
        assert_eq!(out, "v\n\"a,b \"\"quoted\"\"\"\n");
    }

    #[test]
    fn test_round_trip_with_csv_reader() {
        let out = encode_all(
            &["x", "y"],
            &[
                vec![
                    ScalarValue::Text("alpha".to_string()),
                    ScalarValue::Int(1),
                ],
                vec![
                    ScalarValue::Text("beta".to_string()),
                    ScalarValue::Int(2),
                ],
            ],
        );
        let mut reader = ::csv::Reader::from_reader(out.as_bytes());
        let records: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        assert_eq!(records, vec![vec!["alpha", "1"], vec!["beta", "2"]]);
    }

    #[test]
    fn test_row_before_header_rejected() {
        let mut enc = CsvEncoder::new();
        let err = enc.write_row(&[ScalarValue::Int(1)]).unwrap_err();
        assert!(matches!(err, EncodeError::HeaderState));
        // The failure is sticky.
        let err = enc.write_header(&["id".to_string()]).unwrap_err();
        assert!(matches!(err, EncodeError::Sticky(_)));
    }

    #[test]
    fn test_double_header_rejected() {
        let mut enc = CsvEncoder::new();
        enc.write_header(&["id".to_string()]).unwrap();
        let err = enc.write_header(&["id".to_string()]).unwrap_err();
        assert!(matches!(err, EncodeError::HeaderState));
    }
}
