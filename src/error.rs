//! # Error Types
//!
//! Host-facing failures of the NMN compiler.
//!
//! Problems in the score text itself are never errors: they are collected as
//! [`Issue`](crate::issue::Issue)s while the pipeline keeps going on a best-effort
//! reconstruction. `NmnError` only covers what the caller has to deal with,
//! such as an unreadable file or a stage contract violation inside the
//! pipeline.
//!
//! ## Usage
//! ```rust
//! use nmn::{config::ParserConfig, NmnError};
//!
//! match ParserConfig::from_yaml_str("iteration_limit: [") {
//!     Ok(_) => unreachable!(),
//!     Err(NmnError::Config(message)) => eprintln!("bad config: {}", message),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NmnError {
    /// Reading a score or configuration file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid parser configuration.
    ///
    /// # Example
    /// ```
    /// # use nmn::NmnError;
    /// let err = NmnError::Config("iteration_limit must be positive".to_string());
    /// assert_eq!(err.to_string(), "Invalid configuration: iteration_limit must be positive");
    /// ```
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Output could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialize(String),

    /// Two pipeline stages disagree about the shape of their data.
    ///
    /// This is a compiler bug, not a problem with the score.
    #[error("Internal error in {stage}: {message}")]
    Internal { stage: &'static str, message: String },
}

impl From<serde_yaml::Error> for NmnError {
    fn from(e: serde_yaml::Error) -> Self {
        NmnError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for NmnError {
    fn from(e: serde_json::Error) -> Self {
        NmnError::Serialize(e.to_string())
    }
}
