//! Tracing subscriber setup
//!
//! The subscriber is installed before the config file is read, with the
//! default level. `RUST_LOG` wins; otherwise the `[logging] level` from the
//! config replaces the default once it is known.

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};
use vpa_common::config::LoggingConfig;

/// Filter used when RUST_LOG is not set
pub fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("vpa_etl={0},vpa_common={0}", level))
}

/// Handle to swap the filter after configuration is loaded
pub struct LogFilterHandle {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
}

impl LogFilterHandle {
    /// Apply the configured level; no-op when RUST_LOG chose the filter
    pub fn apply(&self, logging: &LoggingConfig) -> Result<(), reload::Error> {
        match &self.handle {
            Some(handle) => handle.reload(default_filter(&logging.level)),
            None => Ok(()),
        }
    }
}

fn subscriber<W>(filter: EnvFilter, writer: W) -> (impl Subscriber + Send + Sync + 'static, reload::Handle<EnvFilter, Registry>)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(filter);
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer));
    (subscriber, handle)
}

/// Install the global subscriber
pub fn init() -> LogFilterHandle {
    let from_env = EnvFilter::try_from_default_env().ok();
    let reloadable = from_env.is_none();
    let filter = from_env.unwrap_or_else(|| default_filter(&LoggingConfig::default().level));

    let (subscriber, handle) = subscriber(filter, std::io::stdout);
    subscriber.init();

    LogFilterHandle {
        handle: reloadable.then_some(handle),
    }
}
