//! JSON Lines row encoder.
//!
//! Emits one JSON object per row, keyed by column name. No header row is
//! written; the column names become object keys.

use domain::ScalarValue;

use super::{EncodeError, RowEncoder};

/// Streaming JSON Lines encoder.
pub struct JsonLinesEncoder {
    out: Vec<u8>,
    columns: Vec<String>,
    header_written: bool,
    err: Option<String>,
}

impl JsonLinesEncoder {
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            columns: Vec::new(),
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

impl Default for JsonLinesEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RowEncoder for JsonLinesEncoder {
    fn write_header(&mut self, columns: &[String]) -> Result<(), EncodeError> {
        self.guard()?;
        if self.header_written {
            return Err(self.record_failure(EncodeError::HeaderState));
        }
        self.header_written = true;
        self.columns = columns.to_vec();
        Ok(())
    }

    fn write_row(&mut self, values: &[ScalarValue]) -> Result<(), EncodeError> {
        self.guard()?;
        if !self.header_written {
            return Err(self.record_failure(EncodeError::HeaderState));
        }

        let mut object = serde_json::Map::with_capacity(values.len());
        for (i, value) in values.iter().enumerate() {
            let key = match self.columns.get(i) {
                Some(name) => name.clone(),
                None => format!("column_{}", i),
            };
            object.insert(key, value.to_json());
        }

        // Serialize into a scratch line first so a failed row never leaves
        // partial bytes in the output.
        let line = serde_json::to_vec(&serde_json::Value::Object(object))
            .map_err(|e| self.record_failure(e.into()))?;
        self.out.extend_from_slice(&line);
        self.out.push(b'\n');
        Ok(())
    }

    fn drain(&mut self) -> Result<Vec<u8>, EncodeError> {
        self.guard()?;
        Ok(std::mem::take(&mut self.out))
    }

    fn finish(&mut self) -> Result<Vec<u8>, EncodeError> {
        self.guard()?;
        Ok(std::mem::take(&mut self.out))
    }
}
