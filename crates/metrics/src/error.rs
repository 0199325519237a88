use thiserror::Error;

/// Result type for metric recording.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while recording or publishing metrics.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to bind the scrape endpoint.
    #[error("failed to bind metrics server: {0}")]
    Bind(std::io::Error),

    /// OTLP exporter setup failed.
    #[error("otlp exporter error: {0}")]
    Otlp(String),

    /// Prometheus registry or encoding error.
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),

    /// Publishing recorded metrics failed.
    #[error("failed to push metrics: {0}")]
    Push(String),

    /// A gauge could not be recorded.
    #[error("failed to record {metric}: {reason}")]
    Record {
        /// Metric name.
        metric: &'static str,

        /// What went wrong.
        reason: String,
    },

    /// HTTP client error while publishing.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// The scrape server was already started.
    #[error("metrics server already started")]
    AlreadyStarted,
}
