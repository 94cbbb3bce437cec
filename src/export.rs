/*!
 * Export functionality for pricing tables
 *
 * Writes alternatives and insurance comparisons as JSON, JSON Lines or CSV.
 */

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::alternatives::{AlternativesView, ComparisonRow, InsuranceComparison};
use crate::data_types::*;
use crate::{ExportFormat, Result, RxError};

/// A table row that can be written in every export format
pub trait ExportRow: Serialize {
    /// CSV column names
    fn csv_header() -> &'static [&'static str];

    /// CSV fields, in header order
    fn csv_record(&self) -> Vec<String>;
}

fn price_field(price: Option<rust_decimal::Decimal>) -> String {
    price.map(|p| p.round_dp(2).to_string()).unwrap_or_default()
}

impl ExportRow for DrugAlternative {
    fn csv_header() -> &'static [&'static str] {
        &["ndc", "name", "insured", "bin_id", "pcn_id", "net_price"]
    }

    fn csv_record(&self) -> Vec<String> {
        let (insured, bin_id, pcn_id) = match self.coverage {
            Coverage::Insured { bin_id, pcn_id } => ("Y", bin_id.to_string(), pcn_id.to_string()),
            Coverage::Uninsured => ("N", String::new(), String::new()),
        };
        vec![
            self.ndc.as_str().to_string(),
            self.name.clone(),
            insured.to_string(),
            bin_id,
            pcn_id,
            price_field(self.net_price),
        ]
    }
}

impl ExportRow for ComparisonRow {
    fn csv_header() -> &'static [&'static str] {
        &["label", "insurance_id", "net_price"]
    }

    fn csv_record(&self) -> Vec<String> {
        vec![self.label.clone(), self.insurance_id.to_string(), price_field(self.net_price)]
    }
}

/// Trait for table exporters
pub trait TableExporter {
    /// Write rows to any writer
    fn write_rows<R: ExportRow, W: Write>(&self, rows: &[R], writer: W) -> Result<()>;

    fn format(&self) -> ExportFormat;

    /// Write rows to a file, replacing it
    fn export<R: ExportRow>(&self, rows: &[R], path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| RxError::Export {
            message: format!("cannot create {}: {}", path.display(), e),
            format: self.format(),
            suggestion: Some("Check that the directory exists and is writable".to_string()),
        })?;
        self.write_rows(rows, BufWriter::new(file))
    }
}

/// JSON exporter
pub struct JsonExporter {
    /// Whether to pretty-print the JSON
    pub pretty_print: bool,
    /// Whether to export as JSON Lines (one row per line)
    pub json_lines: bool,
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self {
            pretty_print: true,
            json_lines: false,
        }
    }
}

impl JsonExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    pub fn as_json_lines(mut self) -> Self {
        self.json_lines = true;
        self.pretty_print = false;
        self
    }
}

impl TableExporter for JsonExporter {
    fn write_rows<R: ExportRow, W: Write>(&self, rows: &[R], mut writer: W) -> Result<()> {
        if self.json_lines {
            for row in rows {
                serde_json::to_writer(&mut writer, row)?;
                writeln!(writer)?;
            }
        } else if self.pretty_print {
            serde_json::to_writer_pretty(&mut writer, rows)?;
            writeln!(writer)?;
        } else {
            serde_json::to_writer(&mut writer, rows)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn format(&self) -> ExportFormat {
        if self.json_lines {
            ExportFormat::JsonLines
        } else {
            ExportFormat::Json
        }
    }
}

/// CSV exporter
pub struct CsvExporter {
    pub include_headers: bool,
    pub delimiter: u8,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self {
            include_headers: true,
            delimiter: b',',
        }
    }
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_headers(mut self, include: bool) -> Self {
        self.include_headers = include;
        self
    }
}

impl TableExporter for CsvExporter {
    fn write_rows<R: ExportRow, W: Write>(&self, rows: &[R], writer: W) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .from_writer(writer);

        if self.include_headers {
            csv_writer.write_record(R::csv_header())?;
        }
        for row in rows {
            csv_writer.write_record(row.csv_record())?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Csv
    }
}

/// Write rows in the given format
pub fn write_rows<R: ExportRow, W: Write>(rows: &[R], writer: W, format: ExportFormat) -> Result<()> {
    match format {
        ExportFormat::Json => JsonExporter::default().write_rows(rows, writer),
        ExportFormat::JsonLines => JsonExporter::new().as_json_lines().write_rows(rows, writer),
        ExportFormat::Csv => CsvExporter::default().write_rows(rows, writer),
    }
}

/// Pick a format from a file extension
pub fn format_for_path(path: &Path) -> Result<ExportFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json") => Ok(ExportFormat::Json),
        Some("jsonl") | Some("ndjson") => Ok(ExportFormat::JsonLines),
        Some("csv") => Ok(ExportFormat::Csv),
        other => Err(RxError::Export {
            message: format!("unrecognized export extension {:?}", other.unwrap_or("")),
            format: ExportFormat::default(),
            suggestion: Some("Use a .json, .jsonl or .csv file name".to_string()),
        }),
    }
}

/// Export a file, choosing the format from its extension
pub fn export_rows<R: ExportRow, P: AsRef<Path>>(rows: &[R], path: P) -> Result<ExportFormat> {
    let path = path.as_ref();
    let format = format_for_path(path)?;
    match format {
        ExportFormat::Json => JsonExporter::default().export(rows, path)?,
        ExportFormat::JsonLines => JsonExporter::new().as_json_lines().export(rows, path)?,
        ExportFormat::Csv => CsvExporter::default().export(rows, path)?,
    }
    Ok(format)
}

// Export convenience functions for the pricing tables
impl AlternativesView {
    /// Export both tables as one list, insured rows first
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<ExportFormat> {
        let rows: Vec<DrugAlternative> = self.insured.iter().chain(&self.uninsured).cloned().collect();
        export_rows(&rows, path)
    }
}

impl InsuranceComparison {
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<ExportFormat> {
        export_rows(self.rows(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alternatives::split_alternatives;
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    fn alternatives() -> AlternativesView {
        split_alternatives(vec![
            DrugAlternative {
                ndc: Ndc::new("00093111101").unwrap(),
                name: "Lisinopril 10 MG Tablet".to_string(),
                coverage: Coverage::Insured { bin_id: 1, pcn_id: 101 },
                net_price: Some(Decimal::new(450, 2)),
            },
            DrugAlternative {
                ndc: Ndc::new("00093111101").unwrap(),
                name: "Lisinopril 10 MG Tablet".to_string(),
                coverage: Coverage::Uninsured,
                net_price: None,
            },
        ])
    }

    #[test]
    fn test_csv_rows() {
        let view = alternatives();
        let mut out = Vec::new();
        CsvExporter::new().write_rows(&view.insured, &mut out).unwrap();
        CsvExporter::new().with_headers(false).write_rows(&view.uninsured, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ndc,name,insured,bin_id,pcn_id,net_price");
        assert_eq!(lines[1], "00093111101,Lisinopril 10 MG Tablet,Y,1,101,4.50");
        assert_eq!(lines[2], "00093111101,Lisinopril 10 MG Tablet,N,,,");
    }

    #[test]
    fn test_json_lines_one_row_per_line() {
        let view = alternatives();
        let rows: Vec<DrugAlternative> = view.insured.iter().chain(&view.uninsured).cloned().collect();
        let mut out = Vec::new();
        write_rows(&rows, &mut out, ExportFormat::JsonLines).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["coverage"]["kind"], "insured");
        assert_eq!(first["net_price"], "4.50");
    }

    #[test]
    fn test_export_by_extension() {
        let dir = tempdir().unwrap();
        let view = alternatives();

        let json_path = dir.path().join("alternatives.json");
        assert_eq!(view.export(&json_path).unwrap(), ExportFormat::Json);
        let parsed: Vec<DrugAlternative> =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].coverage, Coverage::Uninsured);

        let mut comparison = InsuranceComparison::new(Ndc::new("00071015523").unwrap());
        comparison.push("CMK-STD", 1001, Some(Decimal::new(1234, 2)));
        let csv_path = dir.path().join("compare.csv");
        assert_eq!(comparison.export(&csv_path).unwrap(), ExportFormat::Csv);
        let text = std::fs::read_to_string(&csv_path).unwrap();
        assert!(text.contains("CMK-STD,1001,12.34"));

        assert!(matches!(
            view.export(dir.path().join("alternatives.xlsx")),
            Err(RxError::Export { .. })
        ));
    }
}
