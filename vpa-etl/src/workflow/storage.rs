//! File storage for the layer folders
//!
//! Stages read whole files into memory and write outputs in two phases:
//! every output goes to a hidden temp file first, then all temp files are
//! renamed into place. A failure before the rename phase leaves the
//! destination folder untouched.

use super::{Artifact, EventSink, PendingArtifact};
use crate::error::{EtlError, EtlResult, ParseError};
use crate::normalizer::{SourceFile, SourceFormat};
use crate::table::{CanonicalRow, CanonicalTable, Record, LOAD_TIMESTAMP_COLUMN, SOURCE_FILE_COLUMN};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use vpa_common::{Layer, PipelineEvent};

/// Regular files in a folder, sorted by path. A missing folder is empty.
async fn list_files(dir: &Path) -> EtlResult<Vec<PathBuf>> {
    if !tokio::fs::try_exists(dir).await? {
        warn!(dir = %dir.display(), "Folder does not exist, treating as empty");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Landing files with a recognized extension
pub async fn read_sources(dir: &Path) -> EtlResult<Vec<SourceFile>> {
    let mut sources = Vec::new();
    for path in list_files(dir).await? {
        let Some(format) = SourceFormat::from_path(&path) else {
            debug!(file = %path.display(), "Skipping file with unsupported extension");
            continue;
        };
        let content = tokio::fs::read(&path).await?;
        sources.push(SourceFile::new(file_name(&path), format, content));
    }
    Ok(sources)
}

/// Bronze tables keyed by base name
pub async fn read_tables(dir: &Path) -> EtlResult<HashMap<String, CanonicalTable>> {
    let mut tables = HashMap::new();
    for path in list_files(dir).await? {
        if SourceFormat::from_path(&path) != Some(SourceFormat::Csv) {
            debug!(file = %path.display(), "Skipping non-CSV file");
            continue;
        }
        let content = tokio::fs::read(&path).await?;
        let table = table_from_csv(&file_name(&path), &content)?;
        debug!(table = %table.name, rows = table.len(), "Loaded bronze table");
        tables.insert(table.name.clone(), table);
    }
    Ok(tables)
}

/// Canonical table as CSV: source columns, then `source_file`, `load_timestamp`
pub fn table_to_csv(table: &CanonicalTable) -> EtlResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.header())?;
    for row in &table.rows {
        let mut record: Vec<String> = table
            .columns
            .iter()
            .map(|column| row.text(column).unwrap_or_default())
            .collect();
        record.push(row.source_file.clone());
        record.push(row.load_timestamp_text());
        writer.write_record(&record)?;
    }
    into_bytes(writer)
}

/// Read a CSV written by [`table_to_csv`] back into a canonical table
pub fn table_from_csv(filename: &str, content: &[u8]) -> Result<CanonicalTable, ParseError> {
    let error = |reason: String| ParseError {
        file: filename.to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(content);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| error(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let position = |column: &str| {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| error(format!("missing {} column", column)))
    };
    let source_index = position(SOURCE_FILE_COLUMN)?;
    let timestamp_index = position(LOAD_TIMESTAMP_COLUMN)?;

    let mut table = CanonicalTable::new(
        Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string()),
    );
    for (i, header) in headers.iter().enumerate() {
        if i != source_index && i != timestamp_index {
            table.add_column(header);
        }
    }

    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|e| error(e.to_string()))?;
        let mut fields = Record::new();
        for (i, (header, cell)) in headers.iter().zip(record.iter()).enumerate() {
            if i == source_index || i == timestamp_index {
                continue;
            }
            let value = if cell.is_empty() {
                Value::Null
            } else {
                Value::String(cell.to_string())
            };
            fields.insert(header.clone(), value);
        }

        let stamp = record.get(timestamp_index).unwrap_or_default();
        let load_timestamp = DateTime::parse_from_rfc3339(stamp)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| error(format!("row {}: {} {:?}: {}", index + 1, LOAD_TIMESTAMP_COLUMN, stamp, e)))?;

        table.rows.push(CanonicalRow {
            fields,
            source_file: record.get(source_index).unwrap_or_default().to_string(),
            load_timestamp,
        });
    }

    Ok(table)
}

/// Serialize rows as CSV; an empty input still gets a header
pub fn rows_to_csv<T: Serialize>(rows: &[T], columns: &[&str]) -> EtlResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.is_empty() {
        writer.write_record(columns)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    into_bytes(writer)
}

/// Serialize rows as JSON lines
pub fn rows_to_json_lines<T: Serialize>(rows: &[T]) -> EtlResult<Vec<u8>> {
    let mut out = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Deserialize CSV rows; a bad row is a parse error naming the file
pub fn rows_from_csv<T: DeserializeOwned>(filename: &str, content: &[u8]) -> Result<Vec<T>, ParseError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(content);
    reader
        .deserialize()
        .enumerate()
        .map(|(index, row)| {
            row.map_err(|e| ParseError {
                file: filename.to_string(),
                reason: format!("row {}: {}", index + 1, e),
            })
        })
        .collect()
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> EtlResult<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| EtlError::Io(e.into_error()))
}

fn temp_path(path: &Path) -> PathBuf {
    path.with_file_name(format!(".{}.tmp", file_name(path)))
}

/// Write every pending output, then move them all into place
pub async fn commit(layer: Layer, pending: Vec<PendingArtifact>, events: &EventSink) -> EtlResult<Vec<Artifact>> {
    let mut staged: Vec<(PathBuf, &PendingArtifact)> = Vec::with_capacity(pending.len());
    for artifact in &pending {
        let tmp = temp_path(&artifact.path);
        let written = async {
            if let Some(parent) = artifact.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&tmp, &artifact.content).await
        }
        .await;

        if let Err(e) = written {
            for (tmp, _) in &staged {
                let _ = tokio::fs::remove_file(tmp).await;
            }
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        staged.push((tmp, artifact));
    }

    let mut artifacts = Vec::with_capacity(staged.len());
    for (tmp, artifact) in staged {
        tokio::fs::rename(&tmp, &artifact.path).await?;
        info!(
            layer = %layer,
            file = %artifact.path.display(),
            rows = artifact.rows,
            "Wrote table"
        );
        events
            .emit(PipelineEvent::TableWritten {
                run_id: events.run_id,
                layer,
                path: artifact.path.clone(),
                rows: artifact.rows,
            })
            .await;
        artifacts.push(Artifact {
            path: artifact.path.clone(),
            rows: artifact.rows,
        });
    }
    Ok(artifacts)
}
