//! Metric definitions and the registry handed to every backend.

/// Prefix prepended (with `_`) to every metric name by backends that export
/// flat names.
pub const METRIC_PREFIX: &str = "eventhub";

/// A gauge's stable name, help text and label keys.
#[derive(Debug, PartialEq, Eq)]
pub struct MetricDefinition {
    /// Name without prefix.
    pub name: &'static str,

    /// Help text.
    pub help: &'static str,

    /// Label keys, in the order backends declare them.
    pub labels: &'static [&'static str],
}

impl MetricDefinition {
    /// Name including the registry prefix.
    #[must_use]
    pub fn qualified_name(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.name)
    }
}

/// `1` per namespace.
pub static NAMESPACE_INFO: MetricDefinition = MetricDefinition {
    name: "namespace_info",
    help: "eventhub namespace info",
    labels: &["eh_namespace", "eh_endpoint"],
};

/// `1` per event hub.
pub static EVENTHUB_INFO: MetricDefinition = MetricDefinition {
    name: "eventhub_info",
    help: "eventhub info",
    labels: &["eh_namespace", "eventhub", "partition_count", "retention_in_days"],
};

/// Beginning sequence number per partition.
pub static EVENTHUB_PARTITION_SEQUENCE_MIN: MetricDefinition = MetricDefinition {
    name: "eventhub_partition_sequence_min",
    help: "beginning sequence number of a partition",
    labels: &["eh_namespace", "eventhub", "partition_id"],
};

/// Sum of beginning sequence numbers per event hub.
pub static EVENTHUB_SEQUENCE_MIN_SUM: MetricDefinition = MetricDefinition {
    name: "eventhub_sequence_min_sum",
    help: "sum of all the eventhub's partition beginning sequence numbers",
    labels: &["eh_namespace", "eventhub"],
};

/// Last enqueued sequence number per partition.
pub static EVENTHUB_PARTITION_SEQUENCE_MAX: MetricDefinition = MetricDefinition {
    name: "eventhub_partition_sequence_max",
    help: "last enqueued sequence number of a partition",
    labels: &["eh_namespace", "eventhub", "partition_id"],
};

/// Sum of last enqueued sequence numbers per event hub.
pub static EVENTHUB_SEQUENCE_MAX_SUM: MetricDefinition = MetricDefinition {
    name: "eventhub_sequence_max_sum",
    help: "sum of all the eventhub's partition last enqueued sequence numbers",
    labels: &["eh_namespace", "eventhub"],
};

/// `1` if the consumer group is stable, else `0`; the state is a label.
pub static CONSUMER_GROUP_INFO: MetricDefinition = MetricDefinition {
    name: "consumer_group_info",
    help: "consumer group info gauges. It will report 1 if the group is in the stable state, otherwise 0.",
    labels: &["eh_namespace", "eventhub", "consumer_group", "state"],
};

/// Active owner count per consumer group.
pub static CONSUMER_GROUP_OWNERS: MetricDefinition = MetricDefinition {
    name: "consumer_group_owners",
    help: "consumer group owner count gauges. It will report the number of owners in the consumer group",
    labels: &["eh_namespace", "eventhub", "consumer_group"],
};

/// Sum of committed sequence numbers per consumer group.
pub static CONSUMER_GROUP_EVENTS_SUM: MetricDefinition = MetricDefinition {
    name: "consumer_group_events_sum",
    help: "the sum of all committed sequence numbers across all partitions in an eventhub",
    labels: &["eh_namespace", "eventhub", "consumer_group"],
};

/// `1` for an active partition owner, `0` for an expired one.
pub static CONSUMER_GROUP_PARTITION_OWNER: MetricDefinition = MetricDefinition {
    name: "consumer_group_partition_owner",
    help: "partition owner of a consumer group. It will report 1 if the ownership is active, 0 if it expired",
    labels: &[
        "eh_namespace",
        "eventhub",
        "consumer_group",
        "partition_id",
        "owner",
    ],
};

/// Lag per consumer group and partition.
pub static CONSUMER_GROUP_PARTITION_LAG: MetricDefinition = MetricDefinition {
    name: "consumer_group_partition_lag",
    help: "the number of messages a consumer group is lagging behind the last enqueued sequence number of a partition",
    labels: &["eh_namespace", "eventhub", "consumer_group", "partition_id"],
};

/// Lag per consumer group across all partitions.
pub static CONSUMER_GROUP_LAG: MetricDefinition = MetricDefinition {
    name: "consumer_group_lag",
    help: "the number of messages a consumer group is lagging behind across all partitions in an eventhub",
    labels: &["eh_namespace", "eventhub", "consumer_group"],
};

/// The set of metrics backends register, built once at startup.
#[derive(Debug)]
pub struct MetricRegistry {
    prefix: String,
    definitions: Vec<&'static MetricDefinition>,
}

impl MetricRegistry {
    /// Registry with every gauge the collector records.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(
            METRIC_PREFIX,
            vec![
                &NAMESPACE_INFO,
                &EVENTHUB_INFO,
                &EVENTHUB_PARTITION_SEQUENCE_MIN,
                &EVENTHUB_SEQUENCE_MIN_SUM,
                &EVENTHUB_PARTITION_SEQUENCE_MAX,
                &EVENTHUB_SEQUENCE_MAX_SUM,
                &CONSUMER_GROUP_INFO,
                &CONSUMER_GROUP_OWNERS,
                &CONSUMER_GROUP_EVENTS_SUM,
                &CONSUMER_GROUP_PARTITION_OWNER,
                &CONSUMER_GROUP_PARTITION_LAG,
                &CONSUMER_GROUP_LAG,
            ],
        )
    }

    /// Registry with a custom prefix and definition list.
    pub fn new(prefix: impl Into<String>, definitions: Vec<&'static MetricDefinition>) -> Self {
        Self {
            prefix: prefix.into(),
            definitions,
        }
    }

    /// Metric name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Registered definitions in declaration order.
    #[must_use]
    pub fn definitions(&self) -> &[&'static MetricDefinition] {
        &self.definitions
    }
}
