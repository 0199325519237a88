use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Prometheus listen address did not parse.
    #[error("invalid listen address: {0}")]
    Address(#[from] std::net::AddrParseError),

    /// Collection run failed.
    #[error(transparent)]
    Collector(#[from] ehm_collector::Error),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ehm_config::Error),

    /// Metric backend failed.
    #[error(transparent)]
    Metrics(#[from] ehm_metrics::Error),

    /// A name filter did not compile.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Could not set global default subscriber.
    #[error("could not set global default subscriber: {0}")]
    SetTracing(#[from] tracing::dispatcher::SetGlobalDefaultError),
}
