//! Normalizer: raw landing files to canonical tables
//!
//! Parses line-delimited JSON or CSV and stamps every row with
//! `source_file` and `load_timestamp`. No other transformation happens here:
//! CSV cells stay text, JSON values keep their JSON type.

use crate::error::ParseError;
use crate::table::{CanonicalRow, CanonicalTable, Record, LOAD_TIMESTAMP_COLUMN, SOURCE_FILE_COLUMN};
use serde_json::Value;
use std::path::Path;
use tracing::debug;
use vpa_common::Clock;

/// Declared structure of a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// One JSON object per line
    JsonLines,
    /// Comma separated with a header row
    Csv,
}

impl SourceFormat {
    /// Format from file extension (`.json`, `.csv`), case-insensitive
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(SourceFormat::JsonLines),
            "csv" => Some(SourceFormat::Csv),
            _ => None,
        }
    }
}

/// One landing file, fully read into memory
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filename: String,
    pub format: SourceFormat,
    pub content: Vec<u8>,
}

impl SourceFile {
    pub fn new(filename: impl Into<String>, format: SourceFormat, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            format,
            content: content.into(),
        }
    }

    /// File name without extension; keys the table downstream
    pub fn base_name(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.clone())
    }

    fn parse_error(&self, reason: impl Into<String>) -> ParseError {
        ParseError {
            file: self.filename.clone(),
            reason: reason.into(),
        }
    }
}

/// Normalize a source file into a canonical table
///
/// The clock is read once per file, so every row of the file carries the same
/// load timestamp and timestamps never decrease across files of a run.
pub fn normalize(source: &SourceFile, clock: &dyn Clock) -> Result<CanonicalTable, ParseError> {
    let (columns, records) = match source.format {
        SourceFormat::JsonLines => parse_json_lines(source)?,
        SourceFormat::Csv => parse_csv(source)?,
    };

    if let Some(reserved) = columns
        .iter()
        .find(|c| *c == SOURCE_FILE_COLUMN || *c == LOAD_TIMESTAMP_COLUMN)
    {
        return Err(source.parse_error(format!("column {} is reserved for provenance", reserved)));
    }

    let load_timestamp = clock.now();
    let rows = records
        .into_iter()
        .map(|fields| CanonicalRow {
            fields,
            source_file: source.filename.clone(),
            load_timestamp,
        })
        .collect::<Vec<_>>();

    debug!(
        file = %source.filename,
        rows = rows.len(),
        columns = columns.len(),
        "Normalized source file"
    );

    Ok(CanonicalTable {
        name: source.base_name(),
        columns,
        rows,
    })
}

fn parse_json_lines(source: &SourceFile) -> Result<(Vec<String>, Vec<Record>), ParseError> {
    let text = std::str::from_utf8(&source.content)
        .map_err(|e| source.parse_error(format!("not valid UTF-8: {}", e)))?;

    let mut columns: Vec<String> = Vec::new();
    let mut records = Vec::new();

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| source.parse_error(format!("line {}: {}", index + 1, e)))?;
        let Value::Object(record) = value else {
            return Err(source.parse_error(format!("line {}: expected a JSON object", index + 1)));
        };
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
        records.push(record);
    }

    Ok((columns, records))
}

fn parse_csv(source: &SourceFile) -> Result<(Vec<String>, Vec<Record>), ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(source.content.as_slice());

    let headers = reader
        .headers()
        .map_err(|e| source.parse_error(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|e| source.parse_error(e.to_string()))?;
        let record = headers
            .iter()
            .zip(row.iter())
            .map(|(name, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                (name.clone(), value)
            })
            .collect::<Record>();
        records.push(record);
    }

    Ok((headers, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use vpa_common::time::FixedClock;

    fn clock() -> FixedClock {
        FixedClock::stepping(
            Utc.with_ymd_and_hms(2023, 12, 10, 12, 0, 0).unwrap(),
            Duration::milliseconds(5),
        )
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(SourceFormat::from_path(Path::new("prints.json")), Some(SourceFormat::JsonLines));
        assert_eq!(SourceFormat::from_path(Path::new("pays.CSV")), Some(SourceFormat::Csv));
        assert_eq!(SourceFormat::from_path(Path::new("notes.txt")), None);
        assert_eq!(SourceFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_json_lines_gain_provenance() {
        let content = concat!(
            r#"{"day":"2023-12-05","event_data":{"position":0,"value_prop":"A"},"user_id":1}"#,
            "\n\n",
            r#"{"day":"2023-12-06","event_data":{"position":1,"value_prop":"B"},"user_id":2}"#,
            "\n"
        );
        let source = SourceFile::new("prints.json", SourceFormat::JsonLines, content);
        let clock = clock();
        let table = normalize(&source, &clock).unwrap();

        assert_eq!(table.name, "prints");
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns, vec!["day", "event_data", "user_id"]);
        for row in &table.rows {
            assert_eq!(row.source_file, "prints.json");
            assert_eq!(row.load_timestamp, Utc.with_ymd_and_hms(2023, 12, 10, 12, 0, 0).unwrap());
        }
        assert_eq!(table.rows[1].get("event_data"), Some(&json!({"position": 1, "value_prop": "B"})));
        assert_eq!(table.rows[1].get("user_id"), Some(&json!(2)));
        assert!(!table.has_column(SOURCE_FILE_COLUMN));
        assert!(!table.has_column(LOAD_TIMESTAMP_COLUMN));
    }

    #[test]
    fn test_csv_rows_keep_text_cells() {
        let content = "pay_date,total,user_id,value_prop\n2023-12-05,10.5,1,A\n2023-12-06,,2,B\n";
        let source = SourceFile::new("pays.csv", SourceFormat::Csv, content);
        let table = normalize(&source, &clock()).unwrap();

        assert_eq!(table.name, "pays");
        assert_eq!(table.columns, vec!["pay_date", "total", "user_id", "value_prop"]);
        assert_eq!(table.rows[0].text("total").as_deref(), Some("10.5"));
        assert_eq!(table.rows[1].get("total"), Some(&Value::Null));
    }

    #[test]
    fn test_timestamps_non_decreasing_across_files() {
        let clock = clock();
        let first = normalize(&SourceFile::new("a.csv", SourceFormat::Csv, "x\n1\n"), &clock).unwrap();
        let second = normalize(&SourceFile::new("b.csv", SourceFormat::Csv, "x\n2\n"), &clock).unwrap();
        assert!(second.rows[0].load_timestamp >= first.rows[0].load_timestamp);
    }

    #[test]
    fn test_malformed_json_names_file_and_line() {
        let content = "{\"user_id\":1}\n{not json}\n";
        let source = SourceFile::new("taps.json", SourceFormat::JsonLines, content);
        let err = normalize(&source, &clock()).unwrap_err();
        assert_eq!(err.file, "taps.json");
        assert!(err.reason.starts_with("line 2"), "reason: {}", err.reason);
    }

    #[test]
    fn test_json_line_must_be_object() {
        let source = SourceFile::new("taps.json", SourceFormat::JsonLines, "[1,2]\n");
        let err = normalize(&source, &clock()).unwrap_err();
        assert!(err.reason.contains("expected a JSON object"));
    }

    #[test]
    fn test_ragged_csv_is_parse_error() {
        let source = SourceFile::new("pays.csv", SourceFormat::Csv, "a,b\n1,2\n3\n");
        let err = normalize(&source, &clock()).unwrap_err();
        assert_eq!(err.file, "pays.csv");
    }

    #[test]
    fn test_provenance_column_in_source_is_rejected() {
        let source = SourceFile::new(
            "prints.json",
            SourceFormat::JsonLines,
            "{\"user_id\":1}\n{\"user_id\":2,\"source_file\":\"x.json\"}\n",
        );
        let err = normalize(&source, &clock()).unwrap_err();
        assert_eq!(err.file, "prints.json");
        assert_eq!(err.reason, "column source_file is reserved for provenance");

        let source = SourceFile::new("pays.csv", SourceFormat::Csv, "user_id,load_timestamp\n1,2023-12-10\n");
        let err = normalize(&source, &clock()).unwrap_err();
        assert_eq!(err.file, "pays.csv");
        assert_eq!(err.reason, "column load_timestamp is reserved for provenance");
    }

    #[test]
    fn test_empty_file_gives_empty_table() {
        let source = SourceFile::new("prints.json", SourceFormat::JsonLines, "");
        let table = normalize(&source, &clock()).unwrap();
        assert!(table.is_empty());
        assert!(table.columns.is_empty());
    }
}
