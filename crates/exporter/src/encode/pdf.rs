//! PDF row encoder.
//!
//! Lays rows out in a grid on A4 landscape pages with equal column widths.
//! PDF generation is acknowledged as non-streaming: rendered rows are
//! buffered and the document is produced at finalization. Size limits are
//! the caller's responsibility.

use domain::{harden_cell, ScalarValue};
use printpdf::{BuiltinFont, Mm, PdfDocument};

use super::{EncodeError, RowEncoder};

const PAGE_WIDTH_MM: f32 = 297.0;
const PAGE_HEIGHT_MM: f32 = 210.0;
const MARGIN_MM: f32 = 10.0;
const ROW_HEIGHT_MM: f32 = 7.0;
const FONT_SIZE: f32 = 10.0;

/// Grid-layout PDF encoder.
pub struct PdfEncoder {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    header_written: bool,
    err: Option<String>,
}

impl PdfEncoder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
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

    fn render_document(&self) -> Result<Vec<u8>, EncodeError> {
        let (doc, page, layer) = PdfDocument::new(
            "Export",
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            "grid",
        );
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| EncodeError::Pdf(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| EncodeError::Pdf(e.to_string()))?;

        let usable_width = PAGE_WIDTH_MM - 2.0 * MARGIN_MM;
        let col_width = usable_width / self.columns.len().max(1) as f32;

        let mut layer_ref = doc.get_page(page).get_layer(layer);
        let mut y = PAGE_HEIGHT_MM - MARGIN_MM - ROW_HEIGHT_MM;

        for (i, name) in self.columns.iter().enumerate() {
            let x = MARGIN_MM + i as f32 * col_width;
            layer_ref.use_text(name.clone(), FONT_SIZE, Mm(x), Mm(y), &bold);
        }

        for row in &self.rows {
            y -= ROW_HEIGHT_MM;
            if y < MARGIN_MM {
                let (next_page, next_layer) =
                    doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "grid");
                layer_ref = doc.get_page(next_page).get_layer(next_layer);
                y = PAGE_HEIGHT_MM - MARGIN_MM - ROW_HEIGHT_MM;
            }
            for (i, cell) in row.iter().enumerate() {
                let x = MARGIN_MM + i as f32 * col_width;
                layer_ref.use_text(cell.clone(), FONT_SIZE, Mm(x), Mm(y), &font);
            }
        }

        doc.save_to_bytes().map_err(|e| EncodeError::Pdf(e.to_string()))
    }
}

impl Default for PdfEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RowEncoder for PdfEncoder {
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
        let row: Vec<String> = values
            .iter()
            // The mitigation is applied upstream like every other format; the
            // protective apostrophe is stripped again for display.
            .map(|v| {
                let cell = harden_cell(v.render());
                cell.strip_prefix('\'').map(str::to_string).unwrap_or(cell)
            })
            .collect();
        self.rows.push(row);
        Ok(())
    }

    fn drain(&mut self) -> Result<Vec<u8>, EncodeError> {
        self.guard()?;
        // The document can only be produced as a whole at finish.
        Ok(Vec::new())
    }

    fn finish(&mut self) -> Result<Vec<u8>, EncodeError> {
        self.guard()?;
        match self.render_document() {
            Ok(bytes) => Ok(bytes),
            Err(e) => Err(self.record_failure(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_produces_pdf_document() {
        let mut enc = PdfEncoder::new();
        enc.write_header(&["id".to_string(), "name".to_string()])
            .unwrap();
        enc.write_row(&[ScalarValue::Int(1), ScalarValue::Text("a".to_string())])
            .unwrap();
        let bytes = enc.finish().unwrap();
        assert_eq!(&bytes[..5], b"%PDF-");
    }

    #[test]
    fn test_many_rows_span_pages() {
        let mut enc = PdfEncoder::new();
        enc.write_header(&["v".to_string()]).unwrap();
        for i in 0..100 {
            enc.write_row(&[ScalarValue::Int(i)]).unwrap();
        }
        let bytes = enc.finish().unwrap();
        assert!(bytes.len() > 1_000);
    }

    #[test]
    fn test_apostrophe_stripped_for_display() {
        let mut enc = PdfEncoder::new();
        enc.write_header(&["v".to_string()]).unwrap();
        enc.write_row(&[ScalarValue::Text("=danger".to_string())])
            .unwrap();
        assert_eq!(enc.rows[0][0], "=danger");
    }

    #[test]
    fn test_row_before_header_rejected() {
        let mut enc = PdfEncoder::new();
        assert!(matches!(
            enc.write_row(&[ScalarValue::Null]),
            Err(EncodeError::HeaderState)
        ));
    }
}
