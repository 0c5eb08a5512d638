//! Gold stage: silver table → four aggregated reports

use super::silver::JOINED_FILE;
use super::storage;
use super::{EventSink, LayerProcessor, PendingArtifact, StageOutcome};
use crate::aggregation::{aggregate, AggregationOutcome, GoldReport, TASK2_COLUMNS, TASK3_COLUMNS, TASK4_5_COLUMNS};
use crate::error::EtlResult;
use crate::window::JoinedRow;
use std::path::{Path, PathBuf};
use tracing::info;
use vpa_common::config::AggregationConfig;
use vpa_common::Layer;

pub const TASK1_FILE: &str = "task1_prints_with_clicked_parameter.json";
pub const TASK2_FILE: &str = "task_2_views_on_each_value_prop_last_3_weeks.csv";
pub const TASK3_FILE: &str = "task_3_clicks_on_each_value_prop_last_3_weeks.csv";
pub const TASK4_5_FILE: &str = "tasks_4_and_5_user_payments_summary_last_3_weeks.csv";

/// Serialize the report into the four gold files
pub fn report_artifacts(report: &GoldReport, gold: &Path) -> EtlResult<Vec<PendingArtifact>> {
    Ok(vec![
        PendingArtifact {
            path: gold.join(TASK1_FILE),
            content: storage::rows_to_json_lines(&report.click_annotations)?,
            rows: report.click_annotations.len(),
        },
        PendingArtifact {
            path: gold.join(TASK2_FILE),
            content: storage::rows_to_csv(&report.view_counts, &TASK2_COLUMNS)?,
            rows: report.view_counts.len(),
        },
        PendingArtifact {
            path: gold.join(TASK3_FILE),
            content: storage::rows_to_csv(&report.click_maps, &TASK3_COLUMNS)?,
            rows: report.click_maps.len(),
        },
        PendingArtifact {
            path: gold.join(TASK4_5_FILE),
            content: storage::rows_to_csv(&report.payment_summaries, &TASK4_5_COLUMNS)?,
            rows: report.payment_summaries.len(),
        },
    ])
}

pub struct GoldStage {
    silver: PathBuf,
    gold: PathBuf,
    aggregation: AggregationConfig,
}

impl GoldStage {
    pub fn new(silver: PathBuf, gold: PathBuf, aggregation: AggregationConfig) -> Self {
        Self {
            silver,
            gold,
            aggregation,
        }
    }
}

#[async_trait::async_trait]
impl LayerProcessor for GoldStage {
    fn layer(&self) -> Layer {
        Layer::Gold
    }

    async fn process(&self, events: &EventSink) -> EtlResult<StageOutcome> {
        let path = self.silver.join(JOINED_FILE);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(StageOutcome::no_data(format!("{} not found", path.display())));
        }

        let content = tokio::fs::read(&path).await?;
        let rows: Vec<JoinedRow> = storage::rows_from_csv(JOINED_FILE, &content)?;
        info!(rows = rows.len(), "Loaded silver table");

        let report = match aggregate(&rows, &self.aggregation) {
            AggregationOutcome::NoData => {
                return Ok(StageOutcome::no_data("silver table has no rows"));
            }
            AggregationOutcome::Report(report) => report,
        };

        let pending = report_artifacts(&report, &self.gold)?;
        let artifacts = storage::commit(Layer::Gold, pending, events).await?;
        Ok(StageOutcome::Completed { artifacts })
    }
}
