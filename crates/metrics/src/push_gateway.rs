use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::{Error, Result};
use crate::gauges::GaugeSet;
use crate::registry::{MetricDefinition, MetricRegistry};
use crate::service::{Labels, RecordService};

/// Job name the gauges are grouped under on the push gateway.
pub const PUSH_JOB: &str = "eventhub-metrics";

/// Recorder that replaces the job's metric group on a Prometheus push
/// gateway at every flush.
#[derive(Clone, Debug)]
pub struct PushGatewayRecorder {
    url: String,
    client: reqwest::Client,
    gauges: Arc<GaugeSet>,
}

impl PushGatewayRecorder {
    /// Creates a recorder pushing to `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if a definition is rejected by prometheus.
    pub fn new(base_url: &str, registry: &MetricRegistry) -> Result<Self> {
        Ok(Self {
            url: format!("{}/metrics/job/{PUSH_JOB}", base_url.trim_end_matches('/')),
            client: reqwest::Client::new(),
            gauges: Arc::new(GaugeSet::new(registry)?),
        })
    }
}

#[async_trait]
impl RecordService for PushGatewayRecorder {
    fn record(&self, metric: &'static MetricDefinition, labels: &Labels, value: f64) -> Result<()> {
        self.gauges.set(metric, labels, value)
    }

    fn reset(&self) {
        self.gauges.reset();
    }

    async fn flush(&self) -> Result<()> {
        let body = self.gauges.encode()?;

        debug!(url = %self.url, bytes = body.len(), "pushing metrics");

        let response = self
            .client
            .put(&self.url)
            .header(CONTENT_TYPE, prometheus::TEXT_FORMAT)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Push(format!("push gateway returned {status}: {text}")));
        }

        Ok(())
    }
}
