#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::registry::{
    CONSUMER_GROUP_EVENTS_SUM, CONSUMER_GROUP_INFO, CONSUMER_GROUP_LAG, CONSUMER_GROUP_OWNERS,
    CONSUMER_GROUP_PARTITION_LAG, CONSUMER_GROUP_PARTITION_OWNER, EVENTHUB_INFO,
    EVENTHUB_PARTITION_SEQUENCE_MAX, EVENTHUB_PARTITION_SEQUENCE_MIN, EVENTHUB_SEQUENCE_MAX_SUM,
    EVENTHUB_SEQUENCE_MIN_SUM, MetricDefinition, NAMESPACE_INFO,
};

/// Label set of one gauge sample.
pub type Labels = BTreeMap<String, String>;

/// A metric backend: records named gauges and publishes them on flush.
///
/// Implementations must tolerate concurrent `record` calls.
#[async_trait]
pub trait RecordService: Debug + Send + Sync + 'static {
    /// Sets the gauge `metric` with `labels` to `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the sample.
    fn record(&self, metric: &'static MetricDefinition, labels: &Labels, value: f64)
    -> Result<()>;

    /// Forgets every sample recorded since the last flush. Called before each
    /// collection run so a push never carries series an earlier failed run
    /// left behind. No-op for backends that do not buffer.
    fn reset(&self) {}

    /// Publishes everything recorded so far. No-op for pull backends.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing fails.
    async fn flush(&self) -> Result<()>;
}

fn labels<const N: usize>(pairs: [(&str, &str); N]) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Typed recording helpers over a [`RecordService`].
#[derive(Clone, Debug)]
pub struct MetricsService {
    recorder: Arc<dyn RecordService>,
}

impl MetricsService {
    /// Wraps a recorder.
    pub fn new(recorder: impl RecordService) -> Self {
        Self {
            recorder: Arc::new(recorder),
        }
    }

    /// Records `namespace_info`.
    ///
    /// # Errors
    ///
    /// Propagates recorder errors.
    pub fn record_namespace_info(&self, namespace: &str, endpoint: &str) -> Result<()> {
        self.recorder.record(
            &NAMESPACE_INFO,
            &labels([("eh_namespace", namespace), ("eh_endpoint", endpoint)]),
            1.0,
        )
    }

    /// Records `eventhub_info`.
    ///
    /// # Errors
    ///
    /// Propagates recorder errors.
    pub fn record_eventhub_info(
        &self,
        namespace: &str,
        eventhub: &str,
        partition_count: usize,
        retention_in_days: u32,
    ) -> Result<()> {
        self.recorder.record(
            &EVENTHUB_INFO,
            &labels([
                ("eh_namespace", namespace),
                ("eventhub", eventhub),
                ("partition_count", &partition_count.to_string()),
                ("retention_in_days", &retention_in_days.to_string()),
            ]),
            1.0,
        )
    }

    /// Records the beginning and last enqueued sequence numbers of a partition.
    ///
    /// # Errors
    ///
    /// Propagates recorder errors.
    pub fn record_partition_sequence_numbers(
        &self,
        namespace: &str,
        eventhub: &str,
        partition_id: &str,
        min: i64,
        max: i64,
    ) -> Result<()> {
        let labels = labels([
            ("eh_namespace", namespace),
            ("eventhub", eventhub),
            ("partition_id", partition_id),
        ]);
        self.recorder
            .record(&EVENTHUB_PARTITION_SEQUENCE_MIN, &labels, min as f64)?;
        self.recorder
            .record(&EVENTHUB_PARTITION_SEQUENCE_MAX, &labels, max as f64)
    }

    /// Records the hub level sequence number sums.
    ///
    /// # Errors
    ///
    /// Propagates recorder errors.
    pub fn record_sequence_number_sum(
        &self,
        namespace: &str,
        eventhub: &str,
        min: i64,
        max: i64,
    ) -> Result<()> {
        let labels = labels([("eh_namespace", namespace), ("eventhub", eventhub)]);
        self.recorder
            .record(&EVENTHUB_SEQUENCE_MIN_SUM, &labels, min as f64)?;
        self.recorder
            .record(&EVENTHUB_SEQUENCE_MAX_SUM, &labels, max as f64)
    }

    /// Records `consumer_group_info`: `1` when `state` is `stable`, else `0`.
    ///
    /// # Errors
    ///
    /// Propagates recorder errors.
    pub fn record_consumer_group_info(
        &self,
        namespace: &str,
        eventhub: &str,
        consumer_group: &str,
        state: &str,
    ) -> Result<()> {
        let value = if state == "stable" { 1.0 } else { 0.0 };
        self.recorder.record(
            &CONSUMER_GROUP_INFO,
            &labels([
                ("eh_namespace", namespace),
                ("eventhub", eventhub),
                ("consumer_group", consumer_group),
                ("state", state),
            ]),
            value,
        )
    }

    /// Records the active owner count of a consumer group.
    ///
    /// # Errors
    ///
    /// Propagates recorder errors.
    pub fn record_consumer_group_owners(
        &self,
        namespace: &str,
        eventhub: &str,
        consumer_group: &str,
        owners: usize,
    ) -> Result<()> {
        self.recorder.record(
            &CONSUMER_GROUP_OWNERS,
            &labels([
                ("eh_namespace", namespace),
                ("eventhub", eventhub),
                ("consumer_group", consumer_group),
            ]),
            owners as f64,
        )
    }

    /// Records the sum of committed sequence numbers of a consumer group.
    ///
    /// # Errors
    ///
    /// Propagates recorder errors.
    pub fn record_consumer_group_events(
        &self,
        namespace: &str,
        eventhub: &str,
        consumer_group: &str,
        events: i64,
    ) -> Result<()> {
        self.recorder.record(
            &CONSUMER_GROUP_EVENTS_SUM,
            &labels([
                ("eh_namespace", namespace),
                ("eventhub", eventhub),
                ("consumer_group", consumer_group),
            ]),
            events as f64,
        )
    }

    /// Records one partition ownership: `1` if active, `0` if expired.
    ///
    /// # Errors
    ///
    /// Propagates recorder errors.
    pub fn record_consumer_group_partition_owner(
        &self,
        namespace: &str,
        eventhub: &str,
        consumer_group: &str,
        partition_id: &str,
        owner: &str,
        expired: bool,
    ) -> Result<()> {
        self.recorder.record(
            &CONSUMER_GROUP_PARTITION_OWNER,
            &labels([
                ("eh_namespace", namespace),
                ("eventhub", eventhub),
                ("consumer_group", consumer_group),
                ("partition_id", partition_id),
                ("owner", owner),
            ]),
            if expired { 0.0 } else { 1.0 },
        )
    }

    /// Records the lag of a consumer group on one partition.
    ///
    /// # Errors
    ///
    /// Propagates recorder errors.
    pub fn record_consumer_group_partition_lag(
        &self,
        namespace: &str,
        eventhub: &str,
        consumer_group: &str,
        partition_id: &str,
        lag: i64,
    ) -> Result<()> {
        self.recorder.record(
            &CONSUMER_GROUP_PARTITION_LAG,
            &labels([
                ("eh_namespace", namespace),
                ("eventhub", eventhub),
                ("consumer_group", consumer_group),
                ("partition_id", partition_id),
            ]),
            lag as f64,
        )
    }

    /// Records the total lag of a consumer group.
    ///
    /// # Errors
    ///
    /// Propagates recorder errors.
    pub fn record_consumer_group_lag(
        &self,
        namespace: &str,
        eventhub: &str,
        consumer_group: &str,
        lag: i64,
    ) -> Result<()> {
        self.recorder.record(
            &CONSUMER_GROUP_LAG,
            &labels([
                ("eh_namespace", namespace),
                ("eventhub", eventhub),
                ("consumer_group", consumer_group),
            ]),
            lag as f64,
        )
    }

    /// Resets the underlying recorder before a new run.
    pub fn reset(&self) {
        self.recorder.reset();
    }

    /// Flushes the underlying recorder.
    ///
    /// # Errors
    ///
    /// Propagates the recorder's push error.
    pub async fn flush(&self) -> Result<()> {
        self.recorder.flush().await
    }
}
