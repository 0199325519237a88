use std::collections::HashMap;
use std::fmt;

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};
use crate::registry::{MetricDefinition, MetricRegistry};
use crate::service::Labels;

/// Prometheus gauge vectors for every registered definition.
pub(crate) struct GaugeSet {
    registry: Registry,
    gauges: HashMap<&'static str, GaugeVec>,
}

impl fmt::Debug for GaugeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GaugeSet")
            .field("gauges", &self.gauges.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl GaugeSet {
    pub(crate) fn new(metrics: &MetricRegistry) -> Result<Self> {
        let registry = Registry::new();
        let mut gauges = HashMap::with_capacity(metrics.definitions().len());

        for definition in metrics.definitions() {
            let opts = Opts::new(definition.name, definition.help).namespace(metrics.prefix());
            let gauge = GaugeVec::new(opts, definition.labels)?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(definition.name, gauge);
        }

        Ok(Self { registry, gauges })
    }

    pub(crate) fn set(
        &self,
        metric: &'static MetricDefinition,
        labels: &Labels,
        value: f64,
    ) -> Result<()> {
        let gauge = self.gauges.get(metric.name).ok_or_else(|| Error::Record {
            metric: metric.name,
            reason: "metric is not registered".to_string(),
        })?;

        let labels: HashMap<&str, &str> = labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        gauge
            .get_metric_with(&labels)
            .map_err(|e| Error::Record {
                metric: metric.name,
                reason: e.to_string(),
            })?
            .set(value);

        Ok(())
    }

    /// Removes every labelled series.
    pub(crate) fn reset(&self) {
        for gauge in self.gauges.values() {
            gauge.reset();
        }
    }

    /// Text exposition of every gauge.
    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::registry::{CONSUMER_GROUP_LAG, NAMESPACE_INFO};

    fn group_labels() -> Labels {
        Labels::from([
            ("eh_namespace".to_string(), "ns".to_string()),
            ("eventhub".to_string(), "orders".to_string()),
            ("consumer_group".to_string(), "billing".to_string()),
        ])
    }

    #[test]
    fn test_encode_contains_prefixed_sample() {
        let gauges = GaugeSet::new(&MetricRegistry::standard()).unwrap();
        gauges.set(&CONSUMER_GROUP_LAG, &group_labels(), 42.0).unwrap();

        let text = String::from_utf8(gauges.encode().unwrap()).unwrap();

        assert!(text.contains("# HELP eventhub_consumer_group_lag"));
        assert!(text.contains(
            "eventhub_consumer_group_lag{consumer_group=\"billing\",eh_namespace=\"ns\",eventhub=\"orders\"} 42"
        ));
    }

    #[test]
    fn test_reset_removes_series() {
        let gauges = GaugeSet::new(&MetricRegistry::standard()).unwrap();
        gauges.set(&CONSUMER_GROUP_LAG, &group_labels(), 42.0).unwrap();

        gauges.reset();

        let text = String::from_utf8(gauges.encode().unwrap()).unwrap();
        assert!(!text.contains("consumer_group=\"billing\""));
    }

    #[test]
    fn test_wrong_labels_rejected() {
        let gauges = GaugeSet::new(&MetricRegistry::standard()).unwrap();

        let result = gauges.set(&NAMESPACE_INFO, &group_labels(), 1.0);

        assert!(matches!(result, Err(Error::Record { metric: "namespace_info", .. })));
    }

    #[test]
    fn test_unregistered_metric_rejected() {
        let gauges =
            GaugeSet::new(&MetricRegistry::new("eventhub", vec![&NAMESPACE_INFO])).unwrap();

        let result = gauges.set(&CONSUMER_GROUP_LAG, &group_labels(), 1.0);

        assert!(result.is_err());
    }
}
