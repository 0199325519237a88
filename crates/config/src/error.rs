use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration loading.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path of the file.
        path: PathBuf,

        /// Underlying error.
        source: std::io::Error,
    },

    /// The YAML document is malformed or does not fit the schema.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// A filter pattern does not compile.
    #[error("invalid {field} pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// Name of the offending setting.
        field: &'static str,

        /// The pattern as configured.
        pattern: String,

        /// Compilation error.
        source: regex::Error,
    },

    /// `collector.concurrency` is zero.
    #[error("collector concurrency must be greater than zero")]
    InvalidConcurrency,

    /// An endpoint is empty or not a bare host name.
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    /// Any other inconsistent setting.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
