//! Canonical table model
//!
//! A canonical table is the bronze representation of one source file: the
//! untyped source columns plus `source_file` and `load_timestamp` on every row.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Provenance column: name of the landing file a row came from
pub const SOURCE_FILE_COLUMN: &str = "source_file";

/// Provenance column: instant the row was normalized
pub const LOAD_TIMESTAMP_COLUMN: &str = "load_timestamp";

/// Untyped source fields of one row
pub type Record = Map<String, Value>;

/// One row of a canonical table
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    pub fields: Record,
    pub source_file: String,
    pub load_timestamp: DateTime<Utc>,
}

impl CanonicalRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Field rendered as text; `None` for missing or null fields
    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(value_to_text)
    }

    /// `load_timestamp` as written to disk
    pub fn load_timestamp_text(&self) -> String {
        format_timestamp(&self.load_timestamp)
    }
}

/// Canonical table for one source, keyed by the file's base name
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanonicalTable {
    /// Base name of the source file (`prints`, `taps`, `pays`, ...)
    pub name: String,
    /// Source columns in first-seen order, without provenance columns
    pub columns: Vec<String>,
    pub rows: Vec<CanonicalRow>,
}

impl CanonicalTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Register a column if it is not known yet
    pub fn add_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    pub fn remove_column(&mut self, column: &str) {
        self.columns.retain(|c| c != column);
    }

    /// Full header: source columns followed by the provenance columns
    pub fn header(&self) -> Vec<String> {
        let mut header = self.columns.clone();
        header.push(SOURCE_FILE_COLUMN.to_string());
        header.push(LOAD_TIMESTAMP_COLUMN.to_string());
        header
    }
}

/// Render a JSON value as a flat cell. Objects and arrays become compact JSON.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// ISO-8601 with microseconds, UTC designator
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn row(fields: Value) -> CanonicalRow {
        CanonicalRow {
            fields: fields.as_object().cloned().unwrap(),
            source_file: "prints.json".to_string(),
            load_timestamp: Utc.with_ymd_and_hms(2023, 12, 5, 8, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_text_renders_scalars_and_nested_values() {
        let r = row(json!({
            "user_id": 7,
            "day": "2023-12-05",
            "event_data": {"value_prop": "A"},
            "flag": true,
            "gap": null
        }));
        assert_eq!(r.text("user_id").as_deref(), Some("7"));
        assert_eq!(r.text("day").as_deref(), Some("2023-12-05"));
        assert_eq!(r.text("event_data").as_deref(), Some(r#"{"value_prop":"A"}"#));
        assert_eq!(r.text("flag").as_deref(), Some("true"));
        assert_eq!(r.text("gap"), None);
        assert_eq!(r.text("missing"), None);
    }

    #[test]
    fn test_header_appends_provenance_columns() {
        let mut table = CanonicalTable::new("prints");
        table.add_column("day");
        table.add_column("user_id");
        table.add_column("day");
        assert_eq!(
            table.header(),
            vec!["day", "user_id", SOURCE_FILE_COLUMN, LOAD_TIMESTAMP_COLUMN]
        );

        table.remove_column("day");
        assert_eq!(table.columns, vec!["user_id"]);
    }

    #[test]
    fn test_timestamp_format() {
        let r = row(json!({}));
        assert_eq!(r.load_timestamp_text(), "2023-12-05T08:30:00.000000Z");
    }
}
