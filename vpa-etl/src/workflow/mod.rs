//! Layer stages and their orchestration
//!
//! Each stage reads its origin folder, runs the pure transforms and only
//! touches the destination folder once every output has been built in memory:
//! - **Bronze**: landing files → canonical tables with provenance columns
//! - **Silver**: bronze tables → payload extraction → windowed join
//! - **Gold**: silver table → the four aggregated reports

pub mod bronze;
pub mod gold;
pub mod pipeline;
pub mod silver;
pub mod storage;

use crate::error::EtlResult;
use std::path::PathBuf;
use tokio::sync::mpsc;
use uuid::Uuid;
use vpa_common::{Layer, PipelineEvent};

pub use bronze::BronzeStage;
pub use gold::GoldStage;
pub use pipeline::{LayerSelection, Pipeline, RunReport};
pub use silver::SilverStage;

/// File written by a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub rows: usize,
}

/// Output built in memory, not yet on disk
#[derive(Debug, Clone)]
pub struct PendingArtifact {
    pub path: PathBuf,
    pub content: Vec<u8>,
    pub rows: usize,
}

/// How a stage ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// All outputs written
    Completed { artifacts: Vec<Artifact> },
    /// Nothing to process; nothing written
    NoData { reason: String },
}

impl StageOutcome {
    pub fn no_data(reason: impl Into<String>) -> Self {
        StageOutcome::NoData {
            reason: reason.into(),
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, StageOutcome::NoData { .. })
    }

    pub fn rows_written(&self) -> usize {
        match self {
            StageOutcome::Completed { artifacts } => artifacts.iter().map(|a| a.rows).sum(),
            StageOutcome::NoData { .. } => 0,
        }
    }
}

/// Progress channel handed to stages; silent when no receiver is attached
#[derive(Debug, Clone)]
pub struct EventSink {
    pub run_id: Uuid,
    tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(run_id: Uuid, tx: Option<mpsc::Sender<PipelineEvent>>) -> Self {
        Self { run_id, tx }
    }

    /// Sink that drops every event
    pub fn silent() -> Self {
        Self::new(Uuid::new_v4(), None)
    }

    pub async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }
}

/// Shared contract of the three stages
#[async_trait::async_trait]
pub trait LayerProcessor: Send + Sync {
    /// Layer this stage produces
    fn layer(&self) -> Layer;

    /// Read the origin folder, transform, write the destination folder
    async fn process(&self, events: &EventSink) -> EtlResult<StageOutcome>;
}

/// Closed set of stages
pub enum Stage {
    Bronze(BronzeStage),
    Silver(SilverStage),
    Gold(GoldStage),
}

#[async_trait::async_trait]
impl LayerProcessor for Stage {
    fn layer(&self) -> Layer {
        match self {
            Stage::Bronze(stage) => stage.layer(),
            Stage::Silver(stage) => stage.layer(),
            Stage::Gold(stage) => stage.layer(),
        }
    }

    async fn process(&self, events: &EventSink) -> EtlResult<StageOutcome> {
        match self {
            Stage::Bronze(stage) => stage.process(events).await,
            Stage::Silver(stage) => stage.process(events).await,
            Stage::Gold(stage) => stage.process(events).await,
        }
    }
}
