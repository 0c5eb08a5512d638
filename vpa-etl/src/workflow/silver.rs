//! Silver stage: bronze tables → payload extraction → windowed join
//!
//! Also writes the anchor-week prints snapshot to the gold folder.

use super::storage;
use super::{EventSink, LayerProcessor, PendingArtifact, StageOutcome};
use crate::error::EtlResult;
use crate::payload::{extract_value_prop, PAYLOAD_COLUMN};
use crate::records::{engagement_events, pay_events};
use crate::table::CanonicalTable;
use crate::window::{anchor_week_prints, join, resolve_anchor, AnchorPrint, IsoWeekRef, JoinedRow, Window, JOINED_COLUMNS};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use vpa_common::config::WindowConfig;
use vpa_common::Layer;

pub const PRINTS_TABLE: &str = "prints";
pub const TAPS_TABLE: &str = "taps";
pub const PAYS_TABLE: &str = "pays";

/// Silver output file name
pub const JOINED_FILE: &str = "prints_taps_and_pays_daily.csv";

/// Anchor-week prints snapshot, written to the gold folder
pub const ANCHOR_PRINTS_FILE: &str = "task0_prints_last_3_weeks.json";

#[derive(Debug, Clone, PartialEq)]
pub struct SilverOutput {
    pub anchor: IsoWeekRef,
    pub joined: Vec<JoinedRow>,
    pub anchor_prints: Vec<AnchorPrint>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SilverOutcome {
    NoData(String),
    Joined(SilverOutput),
}

/// Extract payloads when the table carries them; pays usually already have `value_prop`
fn with_value_prop(table: CanonicalTable) -> EtlResult<CanonicalTable> {
    if table.has_column(PAYLOAD_COLUMN) {
        Ok(extract_value_prop(table)?)
    } else {
        Ok(table)
    }
}

fn optional_table(tables: &mut HashMap<String, CanonicalTable>, name: &str) -> CanonicalTable {
    tables.remove(name).unwrap_or_else(|| {
        warn!(table = name, "Bronze table missing, treating as empty");
        CanonicalTable::new(name)
    })
}

/// Build the silver table from bronze tables keyed by base name
pub fn build_silver(mut tables: HashMap<String, CanonicalTable>, config: &WindowConfig) -> EtlResult<SilverOutcome> {
    if tables.is_empty() {
        return Ok(SilverOutcome::NoData("no bronze tables".to_string()));
    }
    let prints = match tables.remove(PRINTS_TABLE) {
        Some(table) if !table.is_empty() => table,
        Some(_) => return Ok(SilverOutcome::NoData("prints table is empty".to_string())),
        None => return Ok(SilverOutcome::NoData("prints table not found".to_string())),
    };
    let taps = optional_table(&mut tables, TAPS_TABLE);
    let pays = optional_table(&mut tables, PAYS_TABLE);
    for name in tables.keys() {
        debug!(table = %name, "Ignoring unrecognized bronze table");
    }

    let prints = engagement_events(&with_value_prop(prints)?)?;
    let taps = engagement_events(&with_value_prop(taps)?)?;
    let pays = pay_events(&with_value_prop(pays)?)?;

    let Some(anchor) = resolve_anchor(&prints, config) else {
        return Ok(SilverOutcome::NoData("no prints to anchor the window".to_string()));
    };
    let window = Window::new(anchor, config.trailing_weeks)?;
    info!(
        anchor = %anchor,
        trailing_weeks = window.trailing_weeks,
        prints = prints.len(),
        taps = taps.len(),
        pays = pays.len(),
        "Joining inside window"
    );

    let joined = join(&prints, &taps, &pays, &window);
    let anchor_prints = anchor_week_prints(&prints, &window);
    if joined.is_empty() {
        warn!(anchor = %anchor, "No prints fall inside the window");
    }

    Ok(SilverOutcome::Joined(SilverOutput {
        anchor,
        joined,
        anchor_prints,
    }))
}

pub struct SilverStage {
    bronze: PathBuf,
    silver: PathBuf,
    gold: PathBuf,
    window: WindowConfig,
}

impl SilverStage {
    pub fn new(bronze: PathBuf, silver: PathBuf, gold: PathBuf, window: WindowConfig) -> Self {
        Self {
            bronze,
            silver,
            gold,
            window,
        }
    }
}

#[async_trait::async_trait]
impl LayerProcessor for SilverStage {
    fn layer(&self) -> Layer {
        Layer::Silver
    }

    async fn process(&self, events: &EventSink) -> EtlResult<StageOutcome> {
        let tables = storage::read_tables(&self.bronze).await?;
        let output = match build_silver(tables, &self.window)? {
            SilverOutcome::NoData(reason) => return Ok(StageOutcome::no_data(reason)),
            SilverOutcome::Joined(output) => output,
        };

        let pending = vec![
            PendingArtifact {
                path: self.silver.join(JOINED_FILE),
                content: storage::rows_to_csv(&output.joined, &JOINED_COLUMNS)?,
                rows: output.joined.len(),
            },
            PendingArtifact {
                path: self.gold.join(ANCHOR_PRINTS_FILE),
                content: storage::rows_to_json_lines(&output.anchor_prints)?,
                rows: output.anchor_prints.len(),
            },
        ];

        let artifacts = storage::commit(Layer::Silver, pending, events).await?;
        Ok(StageOutcome::Completed { artifacts })
    }
}
