use thiserror::Error;

/// Result type for collection runs.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that abort a collection run.
#[derive(Debug, Error)]
pub enum Error {
    /// A data provider call failed.
    #[error(transparent)]
    Provider(#[from] ehm_providers::Error),

    /// A gauge could not be recorded.
    #[error(transparent)]
    Metrics(#[from] ehm_metrics::Error),

    /// An endpoint has no host to derive a namespace from.
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    /// A hub task ended without completing, typically by panicking.
    #[error("collection of event hub {0:?} aborted")]
    HubTaskAborted(String),

    /// The run was cancelled before it completed.
    #[error("collection cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the run failed on credentials.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Provider(error) if error.is_auth())
    }
}
