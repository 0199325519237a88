use std::net::SocketAddr;

use ehm_config::ExporterConfig;
use ehm_metrics::{
    AppInsightsRecorder, DelegateRecorder, MetricRegistry, MetricsServer, OtlpProtocol,
    OtlpRecorder, PrometheusRecorder, PushGatewayRecorder, RecordService,
};
use tracing::info;

use crate::error::Result;

/// The enabled metric backends.
pub struct Exporters {
    /// Fans every gauge out to the enabled backends.
    pub recorder: DelegateRecorder,

    /// Scrape endpoint, when prometheus is enabled.
    pub server: Option<MetricsServer>,
}

const fn otlp_protocol(protocol: ehm_config::OtlpProtocol) -> OtlpProtocol {
    match protocol {
        ehm_config::OtlpProtocol::Grpc => OtlpProtocol::Grpc,
        ehm_config::OtlpProtocol::Http => OtlpProtocol::Http,
    }
}

/// Builds every backend enabled in `config`. Must run inside the tokio
/// runtime because the OTLP reader spawns its export task.
pub fn build(config: &ExporterConfig, registry: &MetricRegistry) -> Result<Exporters> {
    let mut delegates: Vec<Box<dyn RecordService>> = Vec::new();
    let mut server = None;

    if config.prometheus.enabled {
        let recorder = PrometheusRecorder::new(registry)?;
        let address: SocketAddr = config.prometheus.address.parse()?;

        server = Some(MetricsServer::new(
            address,
            config.prometheus.read_timeout,
            recorder.clone(),
        ));
        delegates.push(Box::new(recorder));
        info!(%address, "prometheus exporter enabled");
    }

    if config.push_gateway.enabled {
        delegates.push(Box::new(PushGatewayRecorder::new(
            &config.push_gateway.base_url,
            registry,
        )?));
        info!(base_url = %config.push_gateway.base_url, "push gateway exporter enabled");
    }

    if config.otlp.enabled {
        delegates.push(Box::new(OtlpRecorder::new(
            &config.otlp.base_url,
            otlp_protocol(config.otlp.protocol),
            registry,
        )?));
        info!(base_url = %config.otlp.base_url, protocol = ?config.otlp.protocol, "otlp exporter enabled");
    }

    if config.app_insights.enabled {
        let key = config.app_insights.instrumentation_key.clone();
        let recorder = match &config.app_insights.ingestion_url {
            Some(url) => AppInsightsRecorder::with_ingestion_url(key, url.clone(), registry),
            None => AppInsightsRecorder::new(key, registry),
        };
        delegates.push(Box::new(recorder));
        info!("application insights exporter enabled");
    }

    Ok(Exporters {
        recorder: DelegateRecorder::new(delegates),
        server,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use ehm_config::Config;

    fn exporter_config(yaml: &str) -> ExporterConfig {
        Config::from_yaml_with_env(yaml, Vec::new()).unwrap().exporter
    }

    #[test]
    fn test_nothing_enabled() {
        let exporters = build(
            &exporter_config("exporter: {prometheus: {enabled: false}}"),
            &MetricRegistry::standard(),
        )
        .unwrap();

        assert!(exporters.server.is_none());
    }

    #[test]
    fn test_prometheus_push_gateway_and_app_insights() {
        let exporters = build(
            &exporter_config(
                r"
exporter:
  prometheus: {enabled: true, address: '127.0.0.1:0'}
  pushGateway: {enabled: true, baseUrl: 'http://gateway:9091'}
  appInsights: {enabled: true, instrumentationKey: 'abc-def'}
",
            ),
            &MetricRegistry::standard(),
        )
        .unwrap();

        assert!(exporters.server.is_some());
        assert_eq!(exporters.recorder.len(), 3);
    }
}
