//! vpa-etl: bronze/silver/gold ETL for ad prints, taps and payments
//!
//! Pure transforms live in their own modules and take no I/O:
//! - [`normalizer`]: landing files → canonical tables with provenance
//! - [`payload`]: `event_data` → `value_prop`
//! - [`window`]: prints ⋈ taps ⟕ pays inside the trailing ISO-week window
//! - [`aggregation`]: the four gold reports
//!
//! [`workflow`] wraps them in stages that read and write the layer folders.

pub mod aggregation;
pub mod config;
pub mod error;
pub mod logging;
pub mod normalizer;
pub mod payload;
pub mod records;
pub mod table;
pub mod window;
pub mod workflow;

pub use crate::config::{ConfigOverrides, PipelineConfig};
pub use crate::error::{EtlError, EtlResult};
pub use crate::workflow::{LayerSelection, Pipeline, RunReport, StageOutcome};
