use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Gauge, MeterProvider as _};
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::{Resource, runtime};

use crate::error::{Error, Result};
use crate::registry::{MetricDefinition, MetricRegistry};
use crate::service::{Labels, RecordService};

const SERVICE_NAME: &str = "eventhub-metrics";

/// Transport used to reach the collector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OtlpProtocol {
    /// OTLP over gRPC.
    #[default]
    Grpc,

    /// OTLP over HTTP with protobuf payloads.
    Http,
}

/// Recorder exporting gauges to an OpenTelemetry collector.
pub struct OtlpRecorder {
    provider: SdkMeterProvider,
    gauges: HashMap<&'static str, Gauge<f64>>,
}

impl fmt::Debug for OtlpRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtlpRecorder")
            .field("gauges", &self.gauges.len())
            .finish_non_exhaustive()
    }
}

fn http_metrics_endpoint(base_url: &str) -> String {
    format!("{}/v1/metrics", base_url.trim_end_matches('/'))
}

impl OtlpRecorder {
    /// Builds the exporter pipeline. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter cannot be built.
    pub fn new(base_url: &str, protocol: OtlpProtocol, registry: &MetricRegistry) -> Result<Self> {
        let exporter = match protocol {
            OtlpProtocol::Grpc => MetricExporter::builder()
                .with_tonic()
                .with_endpoint(base_url)
                .build(),
            OtlpProtocol::Http => MetricExporter::builder()
                .with_http()
                .with_endpoint(http_metrics_endpoint(base_url))
                .build(),
        }
        .map_err(|e| Error::Otlp(e.to_string()))?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                SERVICE_NAME,
            )]))
            .build();

        let meter = provider.meter(SERVICE_NAME);
        let gauges = registry
            .definitions()
            .iter()
            .map(|definition| {
                let gauge = meter
                    .f64_gauge(definition.qualified_name(registry.prefix()))
                    .with_description(definition.help)
                    .build();
                (definition.name, gauge)
            })
            .collect();

        Ok(Self { provider, gauges })
    }
}

#[async_trait]
impl RecordService for OtlpRecorder {
    fn record(&self, metric: &'static MetricDefinition, labels: &Labels, value: f64) -> Result<()> {
        let gauge = self.gauges.get(metric.name).ok_or_else(|| Error::Record {
            metric: metric.name,
            reason: "metric is not registered".to_string(),
        })?;

        let attributes: Vec<KeyValue> = labels
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect();
        gauge.record(value, &attributes);

        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.provider
            .force_flush()
            .map_err(|e| Error::Otlp(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_endpoint() {
        assert_eq!(
            http_metrics_endpoint("http://collector:4318/"),
            "http://collector:4318/v1/metrics"
        );
        assert_eq!(
            http_metrics_endpoint("http://collector:4318"),
            "http://collector:4318/v1/metrics"
        );
    }
}
