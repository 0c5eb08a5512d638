//! Event types for pipeline progress reporting

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Refinement layer produced by a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Raw landing files normalized with provenance columns
    Bronze,
    /// Payloads extracted, prints joined with taps and pays
    Silver,
    /// Weekly aggregates per user and value prop
    Gold,
}

impl Layer {
    /// All layers in processing order
    pub const ALL: [Layer; 3] = [Layer::Bronze, Layer::Silver, Layer::Gold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Bronze => "bronze",
            Layer::Silver => "silver",
            Layer::Gold => "gold",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bronze" => Ok(Layer::Bronze),
            "silver" => Ok(Layer::Silver),
            "gold" => Ok(Layer::Gold),
            other => Err(format!("Unknown layer: {}", other)),
        }
    }
}

/// Pipeline event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Stage began reading its origin folder
    StageStarted {
        run_id: Uuid,
        layer: Layer,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One output table or artifact written
    TableWritten {
        run_id: Uuid,
        layer: Layer,
        path: PathBuf,
        rows: usize,
    },

    /// Stage found nothing to process
    NoData {
        run_id: Uuid,
        layer: Layer,
        reason: String,
    },

    /// Stage finished and all outputs are on disk
    StageCompleted {
        run_id: Uuid,
        layer: Layer,
        tables_written: usize,
        rows_written: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PipelineEvent {
    /// Layer the event belongs to
    pub fn layer(&self) -> Layer {
        match self {
            PipelineEvent::StageStarted { layer, .. }
            | PipelineEvent::TableWritten { layer, .. }
            | PipelineEvent::NoData { layer, .. }
            | PipelineEvent::StageCompleted { layer, .. } => *layer,
        }
    }
}
