//! Pipeline orchestrator
//!
//! Runs one stage or all three in layer order. A run stops at the first
//! stage that reports no data, since the next stage would find nothing to read.
//!
//! # Example
//! ```rust,ignore
//! let pipeline = Pipeline::new(config);
//! let report = pipeline.run(LayerSelection::All).await?;
//! ```

use super::{BronzeStage, EventSink, GoldStage, LayerProcessor, SilverStage, Stage, StageOutcome};
use crate::config::PipelineConfig;
use crate::error::EtlResult;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;
use vpa_common::{Clock, Layer, PipelineEvent, SystemClock};

/// Which stages to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerSelection {
    One(Layer),
    All,
}

impl LayerSelection {
    pub fn layers(&self) -> Vec<Layer> {
        match self {
            LayerSelection::One(layer) => vec![*layer],
            LayerSelection::All => Layer::ALL.to_vec(),
        }
    }
}

impl FromStr for LayerSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(LayerSelection::All);
        }
        s.parse::<Layer>()
            .map(LayerSelection::One)
            .map_err(|_| format!("Unknown stage: {} (expected bronze, silver, gold or all)", s.trim()))
    }
}

impl fmt::Display for LayerSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerSelection::One(layer) => write!(f, "{}", layer),
            LayerSelection::All => f.write_str("all"),
        }
    }
}

/// Outcome of every stage that ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub stages: Vec<(Layer, StageOutcome)>,
}

impl RunReport {
    pub fn outcome(&self, layer: Layer) -> Option<&StageOutcome> {
        self.stages.iter().find(|(l, _)| *l == layer).map(|(_, o)| o)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    clock: Arc<dyn Clock>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            event_tx: None,
        }
    }

    /// Create pipeline with event channel for progress reporting
    pub fn with_events(config: PipelineConfig, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self {
            event_tx: Some(event_tx),
            ..Self::new(config)
        }
    }

    /// Replace the clock used for load timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stage producing `layer`, wired to its origin and destination folders
    pub fn stage(&self, layer: Layer) -> Stage {
        let paths = &self.config.paths;
        let (origin, destination) = paths.route(layer);
        match layer {
            Layer::Bronze => Stage::Bronze(BronzeStage::new(
                origin.to_path_buf(),
                destination.to_path_buf(),
                Arc::clone(&self.clock),
            )),
            Layer::Silver => Stage::Silver(SilverStage::new(
                origin.to_path_buf(),
                destination.to_path_buf(),
                paths.gold.clone(),
                self.config.window.clone(),
            )),
            Layer::Gold => Stage::Gold(GoldStage::new(
                origin.to_path_buf(),
                destination.to_path_buf(),
                self.config.aggregation,
            )),
        }
    }

    pub async fn run(&self, selection: LayerSelection) -> EtlResult<RunReport> {
        let events = EventSink::new(Uuid::new_v4(), self.event_tx.clone());
        info!(run_id = %events.run_id, selection = %selection, "Pipeline run started");

        let mut stages = Vec::new();
        for layer in selection.layers() {
            let outcome = self.run_stage(layer, &events).await?;
            let stop = outcome.is_no_data();
            stages.push((layer, outcome));
            if stop && selection == LayerSelection::All {
                warn!(layer = %layer, "Stopping run: no data for the next stage");
                break;
            }
        }

        Ok(RunReport {
            run_id: events.run_id,
            stages,
        })
    }

    async fn run_stage(&self, layer: Layer, events: &EventSink) -> EtlResult<StageOutcome> {
        let (origin, destination) = self.config.paths.route(layer);
        info!(
            layer = %layer,
            from = %origin.display(),
            to = %destination.display(),
            "Stage started"
        );
        events
            .emit(PipelineEvent::StageStarted {
                run_id: events.run_id,
                layer,
                timestamp: vpa_common::time::now(),
            })
            .await;

        let outcome = match self.stage(layer).process(events).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(layer = %layer, "Stage failed: {}", e);
                return Err(e);
            }
        };

        match &outcome {
            StageOutcome::NoData { reason } => {
                warn!(layer = %layer, reason = %reason, "No data");
                events
                    .emit(PipelineEvent::NoData {
                        run_id: events.run_id,
                        layer,
                        reason: reason.clone(),
                    })
                    .await;
            }
            StageOutcome::Completed { artifacts } => {
                info!(
                    layer = %layer,
                    tables = artifacts.len(),
                    rows = outcome.rows_written(),
                    "Stage completed"
                );
                events
                    .emit(PipelineEvent::StageCompleted {
                        run_id: events.run_id,
                        layer,
                        tables_written: artifacts.len(),
                        rows_written: outcome.rows_written(),
                        timestamp: vpa_common::time::now(),
                    })
                    .await;
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_parsing() {
        assert_eq!("all".parse::<LayerSelection>().unwrap(), LayerSelection::All);
        assert_eq!("ALL".parse::<LayerSelection>().unwrap(), LayerSelection::All);
        assert_eq!(
            "silver".parse::<LayerSelection>().unwrap(),
            LayerSelection::One(Layer::Silver)
        );
        assert!("platinum".parse::<LayerSelection>().is_err());
    }

    #[test]
    fn test_selection_layers_in_order() {
        assert_eq!(
            LayerSelection::All.layers(),
            vec![Layer::Bronze, Layer::Silver, Layer::Gold]
        );
        assert_eq!(LayerSelection::One(Layer::Gold).layers(), vec![Layer::Gold]);
    }

    #[tokio::test]
    async fn test_run_all_stops_at_first_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::for_data_root(dir.path());
        let (tx, mut rx) = mpsc::channel(16);
        let pipeline = Pipeline::with_events(config, tx);

        let report = pipeline.run(LayerSelection::All).await.unwrap();
        assert_eq!(report.stages.len(), 1);
        assert!(report.outcome(Layer::Bronze).unwrap().is_no_data());
        assert!(report.outcome(Layer::Silver).is_none());

        drop(pipeline);
        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert!(matches!(received[0], PipelineEvent::StageStarted { layer: Layer::Bronze, .. }));
        assert!(matches!(received[1], PipelineEvent::NoData { layer: Layer::Bronze, .. }));
        assert_eq!(received.len(), 2);
    }
}
