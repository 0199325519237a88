use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::registry::{MetricDefinition, MetricRegistry};
use crate::service::{Labels, RecordService};

/// Public ingestion endpoint.
pub const DEFAULT_INGESTION_URL: &str = "https://dc.services.visualstudio.com/v2/track";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    name: String,
    time: String,
    i_key: String,
    data: EnvelopeData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeData {
    base_type: &'static str,
    base_data: MetricData,
}

#[derive(Debug, Serialize)]
struct MetricData {
    ver: u8,
    metrics: Vec<DataPoint>,
    properties: Labels,
}

#[derive(Debug, Serialize)]
struct DataPoint {
    name: String,
    kind: u8,
    value: f64,
    count: u32,
}

/// Recorder tracking gauges as Application Insights metric telemetry.
///
/// Samples are buffered per series and sent as one batch on flush.
#[derive(Debug)]
pub struct AppInsightsRecorder {
    instrumentation_key: String,
    ingestion_url: String,
    prefix: String,
    client: reqwest::Client,
    pending: Mutex<BTreeMap<(&'static str, Labels), f64>>,
}

impl AppInsightsRecorder {
    /// Creates a recorder sending to the public ingestion endpoint.
    pub fn new(instrumentation_key: impl Into<String>, registry: &MetricRegistry) -> Self {
        Self::with_ingestion_url(instrumentation_key, DEFAULT_INGESTION_URL, registry)
    }

    /// Creates a recorder sending to a custom ingestion endpoint.
    pub fn with_ingestion_url(
        instrumentation_key: impl Into<String>,
        ingestion_url: impl Into<String>,
        registry: &MetricRegistry,
    ) -> Self {
        Self {
            instrumentation_key: instrumentation_key.into(),
            ingestion_url: ingestion_url.into(),
            prefix: registry.prefix().to_string(),
            client: reqwest::Client::new(),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    fn envelope(&self, metric: &str, labels: Labels, value: f64, time: &str) -> Envelope {
        Envelope {
            name: format!(
                "Microsoft.ApplicationInsights.{}.Metric",
                self.instrumentation_key.replace('-', "")
            ),
            time: time.to_string(),
            i_key: self.instrumentation_key.clone(),
            data: EnvelopeData {
                base_type: "MetricData",
                base_data: MetricData {
                    ver: 2,
                    metrics: vec![DataPoint {
                        name: format!("{}_{metric}", self.prefix),
                        kind: 0,
                        value,
                        count: 1,
                    }],
                    properties: labels,
                },
            },
        }
    }
}

#[async_trait]
impl RecordService for AppInsightsRecorder {
    fn record(&self, metric: &'static MetricDefinition, labels: &Labels, value: f64) -> Result<()> {
        self.pending
            .lock()
            .insert((metric.name, labels.clone()), value);
        Ok(())
    }

    fn reset(&self) {
        self.pending.lock().clear();
    }

    async fn flush(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return Ok(());
        }

        let time = Utc::now().to_rfc3339();
        let envelopes: Vec<Envelope> = pending
            .into_iter()
            .map(|((metric, labels), value)| self.envelope(metric, labels, value, &time))
            .collect();

        debug!(count = envelopes.len(), "tracking metrics");

        let response = self
            .client
            .post(&self.ingestion_url)
            .json(&envelopes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Push(format!(
                "application insights returned {status}: {text}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;

    use crate::registry::CONSUMER_GROUP_LAG;

    async fn serve() -> (SocketAddr, Arc<Mutex<Vec<serde_json::Value>>>) {
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let captured = bodies.clone();
        let router = Router::new().route(
            "/v2/track",
            post(move |axum::Json(body): axum::Json<serde_json::Value>| {
                let captured = captured.clone();
                async move {
                    captured.lock().push(body);
                    StatusCode::OK
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        (addr, bodies)
    }

    #[tokio::test]
    async fn test_flush_sends_latest_value_per_series() {
        let (addr, bodies) = serve().await;
        let recorder = AppInsightsRecorder::with_ingestion_url(
            "0000-1111",
            format!("http://{addr}/v2/track"),
            &MetricRegistry::standard(),
        );
        let labels = Labels::from([("consumer_group".to_string(), "billing".to_string())]);

        recorder.record(&CONSUMER_GROUP_LAG, &labels, 1.0).unwrap();
        recorder.record(&CONSUMER_GROUP_LAG, &labels, 7.0).unwrap();
        recorder.flush().await.unwrap();

        let bodies = bodies.lock();
        assert_eq!(bodies.len(), 1);
        let envelopes = bodies[0].as_array().unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(
            envelopes[0]["name"],
            "Microsoft.ApplicationInsights.00001111.Metric"
        );
        assert_eq!(envelopes[0]["iKey"], "0000-1111");
        let base = &envelopes[0]["data"]["baseData"];
        assert_eq!(base["metrics"][0]["name"], "eventhub_consumer_group_lag");
        assert_eq!(base["metrics"][0]["value"], 7.0);
        assert_eq!(base["properties"]["consumer_group"], "billing");
    }

    #[tokio::test]
    async fn test_flush_without_samples_sends_nothing() {
        let (addr, bodies) = serve().await;
        let recorder = AppInsightsRecorder::with_ingestion_url(
            "key",
            format!("http://{addr}/v2/track"),
            &MetricRegistry::standard(),
        );

        recorder.flush().await.unwrap();

        assert!(bodies.lock().is_empty());
    }

    #[tokio::test]
    async fn test_metric_name_uses_registry_prefix() {
        let (addr, bodies) = serve().await;
        let recorder = AppInsightsRecorder::with_ingestion_url(
            "key",
            format!("http://{addr}/v2/track"),
            &MetricRegistry::new("ehm", vec![&CONSUMER_GROUP_LAG]),
        );

        recorder.record(&CONSUMER_GROUP_LAG, &Labels::new(), 3.0).unwrap();
        recorder.flush().await.unwrap();

        let bodies = bodies.lock();
        let base = &bodies[0][0]["data"]["baseData"];
        assert_eq!(base["metrics"][0]["name"], "ehm_consumer_group_lag");
    }

    #[tokio::test]
    async fn test_reset_drops_unflushed_samples() {
        let (addr, bodies) = serve().await;
        let recorder = AppInsightsRecorder::with_ingestion_url(
            "key",
            format!("http://{addr}/v2/track"),
            &MetricRegistry::standard(),
        );
        let stale = Labels::from([("consumer_group".to_string(), "retired".to_string())]);
        let fresh = Labels::from([("consumer_group".to_string(), "billing".to_string())]);

        recorder.record(&CONSUMER_GROUP_LAG, &stale, 9.0).unwrap();
        recorder.reset();
        recorder.record(&CONSUMER_GROUP_LAG, &fresh, 1.0).unwrap();
        recorder.flush().await.unwrap();

        let bodies = bodies.lock();
        let envelopes = bodies[0].as_array().unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(
            envelopes[0]["data"]["baseData"]["properties"]["consumer_group"],
            "billing"
        );
    }
}
