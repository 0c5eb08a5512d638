//! vpa-etl command line
//!
//! `vpa-etl <bronze|silver|gold|all>` runs one stage, or all three in order.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};
use vpa_common::config::{AnchorSetting, ClickReduction, PaymentAggregation};
use vpa_common::PipelineEvent;
use vpa_etl::{logging, ConfigOverrides, LayerSelection, Pipeline, PipelineConfig, StageOutcome};

#[derive(Parser, Debug)]
#[command(name = "vpa-etl", version, about = "Value-proposition analytics ETL")]
struct Args {
    /// Stage to run: bronze, silver, gold or all
    stage: LayerSelection,

    /// Parent folder of landing/bronze/silver/gold
    #[arg(long, env = "VPA_DATA_ROOT")]
    data_root: Option<PathBuf>,

    /// Config file (default: <config dir>/vpa/config.toml)
    #[arg(long, env = "VPA_CONFIG")]
    config: Option<PathBuf>,

    /// Anchor ISO week number, or "latest"
    #[arg(long)]
    anchor_week: Option<AnchorSetting>,

    /// ISO year of the anchor week
    #[arg(long)]
    anchor_year: Option<i32>,

    /// distinct | exact
    #[arg(long)]
    payment_aggregation: Option<PaymentAggregation>,

    /// last_seen | any
    #[arg(long)]
    click_reduction: Option<ClickReduction>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = logging::init();

    info!(
        "Starting vpa-etl v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let overrides = ConfigOverrides {
        data_root: args.data_root,
        anchor_week: args.anchor_week,
        anchor_year: args.anchor_year,
        payment_aggregation: args.payment_aggregation,
        click_reduction: args.click_reduction,
    };
    let config =
        PipelineConfig::load(args.config.as_deref(), &overrides).context("Failed to load configuration")?;

    log_filter
        .apply(&config.logging)
        .context("Failed to apply configured log level")?;

    let (tx, mut rx) = mpsc::channel::<PipelineEvent>(64);
    let logger = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => debug!(layer = %event.layer(), event = %json, "Pipeline event"),
                Err(e) => debug!("Unserializable pipeline event: {}", e),
            }
        }
    });

    let pipeline = Pipeline::with_events(config, tx);
    let report = pipeline
        .run(args.stage)
        .await
        .with_context(|| format!("Stage {} failed", args.stage))?;
    drop(pipeline);
    logger.await.context("Event logger task failed")?;

    for (layer, outcome) in &report.stages {
        match outcome {
            StageOutcome::Completed { artifacts } => {
                for artifact in artifacts {
                    info!("{}: {} ({} rows)", layer, artifact.path.display(), artifact.rows);
                }
            }
            StageOutcome::NoData { reason } => info!("{}: no data ({})", layer, reason),
        }
    }

    Ok(())
}
