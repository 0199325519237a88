use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::registry::MetricDefinition;
use crate::service::{Labels, RecordService};

/// Recorder that writes every gauge to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRecorder;

#[async_trait]
impl RecordService for LogRecorder {
    fn record(&self, metric: &'static MetricDefinition, labels: &Labels, value: f64) -> Result<()> {
        info!(metric = metric.name, ?labels, value, "recording metric");
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
