//! # VPA Common Library
//!
//! Shared code for the value-proposition analytics pipeline:
//! - Error and result types
//! - Configuration file schema and data root resolution
//! - Pipeline event types (Layer, PipelineEvent)
//! - Clock abstraction for load timestamps

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{Layer, PipelineEvent};
pub use time::{Clock, SystemClock};
