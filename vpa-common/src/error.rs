//! Common error types for VPA

use thiserror::Error;

/// Common result type for VPA operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Config file missing, unreadable or invalid
    #[error("Configuration error: {0}")]
    Config(String),
}
