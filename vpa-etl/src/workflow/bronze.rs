//! Bronze stage: landing files → canonical tables

use super::storage;
use super::{EventSink, LayerProcessor, PendingArtifact, StageOutcome};
use crate::error::{EtlResult, ParseError};
use crate::normalizer::{normalize, SourceFile};
use crate::table::CanonicalTable;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use vpa_common::{Clock, Layer};

/// Normalize every source in order; the first malformed file aborts
///
/// Two sources that share a base name (`prints.json`, `prints.csv`) would
/// land on the same bronze table and are rejected.
pub fn normalize_sources(sources: &[SourceFile], clock: &dyn Clock) -> Result<Vec<CanonicalTable>, ParseError> {
    let mut seen = HashSet::new();
    let mut tables = Vec::with_capacity(sources.len());
    for source in sources {
        if !seen.insert(source.base_name()) {
            return Err(ParseError {
                file: source.filename.clone(),
                reason: format!("another source already provides table {:?}", source.base_name()),
            });
        }
        let table = normalize(source, clock)?;
        info!(file = %source.filename, rows = table.len(), "Normalized source");
        tables.push(table);
    }
    Ok(tables)
}

pub struct BronzeStage {
    landing: PathBuf,
    bronze: PathBuf,
    clock: Arc<dyn Clock>,
}

impl BronzeStage {
    pub fn new(landing: PathBuf, bronze: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self { landing, bronze, clock }
    }
}

#[async_trait::async_trait]
impl LayerProcessor for BronzeStage {
    fn layer(&self) -> Layer {
        Layer::Bronze
    }

    async fn process(&self, events: &EventSink) -> EtlResult<StageOutcome> {
        let sources = storage::read_sources(&self.landing).await?;
        if sources.is_empty() {
            return Ok(StageOutcome::no_data(format!(
                "no source files in {}",
                self.landing.display()
            )));
        }

        let tables = normalize_sources(&sources, self.clock.as_ref())?;

        let mut pending = Vec::with_capacity(tables.len());
        for table in &tables {
            pending.push(PendingArtifact {
                path: self.bronze.join(format!("{}.csv", table.name)),
                content: storage::table_to_csv(table)?,
                rows: table.len(),
            });
        }

        let artifacts = storage::commit(Layer::Bronze, pending, events).await?;
        Ok(StageOutcome::Completed { artifacts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::SourceFormat;
    use chrono::{TimeZone, Utc};
    use vpa_common::time::FixedClock;

    fn clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2023, 12, 10, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_normalize_sources_keeps_order() {
        let sources = vec![
            SourceFile::new("prints.json", SourceFormat::JsonLines, "{\"user_id\":1}\n"),
            SourceFile::new("pays.csv", SourceFormat::Csv, "user_id\n1\n2\n"),
        ];
        let tables = normalize_sources(&sources, &clock()).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "prints");
        assert_eq!(tables[1].name, "pays");
        assert_eq!(tables[1].len(), 2);
    }

    #[test]
    fn test_duplicate_base_name_rejected() {
        let sources = vec![
            SourceFile::new("prints.json", SourceFormat::JsonLines, ""),
            SourceFile::new("prints.csv", SourceFormat::Csv, "user_id\n"),
        ];
        let err = normalize_sources(&sources, &clock()).unwrap_err();
        assert_eq!(err.file, "prints.csv");
    }

    #[tokio::test]
    async fn test_stage_writes_stem_csv() {
        let dir = tempfile::tempdir().unwrap();
        let landing = dir.path().join("landing");
        let bronze = dir.path().join("bronze");
        std::fs::create_dir_all(&landing).unwrap();
        std::fs::write(landing.join("taps.json"), "{\"day\":\"2023-12-05\",\"user_id\":1}\n").unwrap();

        let stage = BronzeStage::new(landing, bronze.clone(), Arc::new(clock()));
        let outcome = stage.process(&EventSink::silent()).await.unwrap();

        assert_eq!(outcome.rows_written(), 1);
        let text = std::fs::read_to_string(bronze.join("taps.csv")).unwrap();
        assert_eq!(
            text,
            "day,user_id,source_file,load_timestamp\n2023-12-05,1,taps.json,2023-12-10T00:00:00.000000Z\n"
        );
    }

    #[tokio::test]
    async fn test_stage_with_empty_landing_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let stage = BronzeStage::new(dir.path().join("landing"), dir.path().join("bronze"), Arc::new(clock()));
        let outcome = stage.process(&EventSink::silent()).await.unwrap();
        assert!(outcome.is_no_data());
        assert!(!dir.path().join("bronze").exists());
    }
}
