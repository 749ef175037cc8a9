//! Typed scalar values and shared export coercions.
//!
//! Every row crossing a driver, encoder, or wire boundary is a positional
//! sequence of [`ScalarValue`]s. The display coercions and the CSV-injection
//! mitigation live here so that CSV, XLSX, and PDF render identically.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp display format shared by all encoders.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single typed cell value.
///
/// These are the only scalar types admitted at the wire boundary between
/// agents and the reactor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
}

impl ScalarValue {
    /// Renders the value as display text using the shared export coercions:
    /// null → `NULL`, bool → `1`/`0`, integers in decimal, floats in
    /// shortest round-trip form, bytes as UTF-8, timestamps as
    /// `YYYY-MM-DD HH:MM:SS`.
    pub fn render(&self) -> String {
        match self {
            ScalarValue::Null => "NULL".to_string(),
            ScalarValue::Bool(true) => "1".to_string(),
            ScalarValue::Bool(false) => "0".to_string(),
            ScalarValue::Int(i) => i.to_string(),
            ScalarValue::Float(f) => f.to_string(),
            ScalarValue::Text(s) => s.clone(),
            ScalarValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            ScalarValue::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Converts the value to its JSON-lines representation. Booleans and
    /// numbers stay native; bytes become strings; timestamps use the shared
    /// display format.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ScalarValue::Null => serde_json::Value::Null,
            ScalarValue::Bool(b) => serde_json::Value::Bool(*b),
            ScalarValue::Int(i) => serde_json::Value::from(*i),
            ScalarValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ScalarValue::Text(s) => serde_json::Value::String(s.clone()),
            ScalarValue::Bytes(b) => {
                serde_json::Value::String(String::from_utf8_lossy(b).into_owned())
            }
            ScalarValue::Timestamp(ts) => {
                serde_json::Value::String(ts.format(TIMESTAMP_FORMAT).to_string())
            }
        }
    }
}

/// Applies the CSV-injection mitigation: a cell whose text starts with `=`,
/// `+`, `-`, or `@` is prefixed with a single apostrophe so spreadsheet
/// applications will not evaluate it as a formula.
pub fn harden_cell(text: String) -> String {
    match text.as_bytes().first() {
        Some(b'=') | Some(b'+') | Some(b'-') | Some(b'@') => format!("'{}", text),
        _ => text,
    }
}
