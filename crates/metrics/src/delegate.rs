use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::log::LogRecorder;
use crate::registry::MetricDefinition;
use crate::service::{Labels, RecordService};

/// Fans every sample out to a list of backends.
#[derive(Debug)]
pub struct DelegateRecorder {
    delegates: Vec<Box<dyn RecordService>>,
}

impl DelegateRecorder {
    /// Creates a fan-out over `delegates`. Falls back to logging gauges when
    /// the list is empty.
    #[must_use]
    pub fn new(mut delegates: Vec<Box<dyn RecordService>>) -> Self {
        if delegates.is_empty() {
            warn!("no metric exporters configured. only logging gauges");
            delegates.push(Box::new(LogRecorder));
        }

        Self { delegates }
    }

    /// Number of active backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    /// Always `false`: an empty list is replaced by the log backend.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}

#[async_trait]
impl RecordService for DelegateRecorder {
    fn record(&self, metric: &'static MetricDefinition, labels: &Labels, value: f64) -> Result<()> {
        for delegate in &self.delegates {
            delegate.record(metric, labels, value)?;
        }
        Ok(())
    }

    fn reset(&self) {
        for delegate in &self.delegates {
            delegate.reset();
        }
    }

    async fn flush(&self) -> Result<()> {
        let mut first_error = None;

        for delegate in &self.delegates {
            if let Err(e) = delegate.flush().await {
                warn!(error = %e, "metric backend flush failed");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
