//! Error types for vpa-etl
//!
//! Parse-level errors abort the current stage. Empty input is not an error;
//! stages report it as `StageOutcome::NoData`.

use thiserror::Error;

/// Source file bytes do not match the declared JSON-lines or CSV structure
#[derive(Debug, Error)]
#[error("Failed to parse {file}: {reason}")]
pub struct ParseError {
    pub file: String,
    pub reason: String,
}

/// Nested event payload missing, malformed, or without `value_prop`
#[derive(Debug, Error)]
#[error("Invalid event payload in {table} row {row}: {reason}")]
pub struct PayloadError {
    pub table: String,
    pub row: usize,
    pub reason: String,
}

/// Date column that cannot be read as a calendar day
#[derive(Debug, Error)]
#[error("Invalid date in {table} row {row}: {column} = {value:?}")]
pub struct DateParseError {
    pub table: String,
    pub row: usize,
    pub column: String,
    pub value: String,
}

/// Pipeline error type
#[derive(Debug, Error)]
pub enum EtlError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    DateParse(#[from] DateParseError),

    /// Required field missing or not convertible
    #[error("Invalid record in {table} row {row}: {reason}")]
    Record {
        table: String,
        row: usize,
        reason: String,
    },

    /// Anchor week does not exist in the calendar (e.g. week 53 of a 52-week year)
    #[error("Invalid anchor week: {0}")]
    Anchor(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// vpa-common error
    #[error("Common error: {0}")]
    Common(#[from] vpa_common::Error),
}

impl EtlError {
    pub(crate) fn record(table: &str, row: usize, reason: impl Into<String>) -> Self {
        EtlError::Record {
            table: table.to_string(),
            row,
            reason: reason.into(),
        }
    }
}

/// Result type for pipeline operations
pub type EtlResult<T> = Result<T, EtlError>;
