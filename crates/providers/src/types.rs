use chrono::{DateTime, Utc};

/// A blob container inside a storage account.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StorageContainer {
    /// Storage account endpoint, e.g. `myaccount.blob.core.windows.net`.
    pub endpoint: String,

    /// Container name.
    pub container: String,
}

impl StorageContainer {
    /// Creates a new `StorageContainer`.
    pub fn new(endpoint: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            container: container.into(),
        }
    }
}

impl std::fmt::Display for StorageContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.endpoint, self.container)
    }
}

/// A consumer group whose checkpoints live in a storage container, recovered
/// from the `namespace/hub/consumerGroup` directory layout.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StoredConsumerGroup {
    /// First path segment, the fully qualified namespace.
    pub namespace: String,

    /// Event hub name.
    pub hub: String,

    /// Consumer group name.
    pub consumer_group: String,
}

impl StoredConsumerGroup {
    /// Creates a new `StoredConsumerGroup`.
    pub fn new(
        namespace: impl Into<String>,
        hub: impl Into<String>,
        consumer_group: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            hub: hub.into(),
            consumer_group: consumer_group.into(),
        }
    }
}

/// Details of an event hub as returned by the hub listing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HubDetails {
    /// Event hub name.
    pub name: String,

    /// Number of partitions.
    pub partition_count: usize,

    /// Partition identifiers in listing order.
    pub partition_ids: Vec<String>,

    /// Message retention in days.
    pub retention_in_days: u32,
}

/// Retained sequence number range of one partition.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SequenceBounds {
    /// Beginning (oldest retained) sequence number.
    pub min: i64,

    /// Last enqueued sequence number.
    pub max: i64,
}

impl SequenceBounds {
    /// Creates new bounds.
    #[must_use]
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// Element-wise sum of bounds, used for hub level gauges. Saturates at
    /// the `i64` range.
    pub fn sum<'a>(bounds: impl IntoIterator<Item = &'a Self>) -> Self {
        bounds.into_iter().fold(Self::default(), |acc, b| Self {
            min: acc.min.saturating_add(b.min),
            max: acc.max.saturating_add(b.max),
        })
    }
}

/// A consumer group's checkpoint on one partition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Checkpoint {
    /// Partition identifier.
    pub partition_id: String,

    /// Committed sequence number; `None` if never committed.
    pub sequence_number: Option<i64>,

    /// Committed offset, informational only.
    pub offset: Option<String>,
}

/// A partition ownership (lease) record of one consumer group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ownership {
    /// Partition identifier.
    pub partition_id: String,

    /// Owner identifier; empty when the lease was relinquished.
    pub owner_id: String,

    /// Last time the lease was renewed.
    pub last_modified: DateTime<Utc>,
}

/// One delimiter level of a hierarchical blob listing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DirectoryListing {
    /// Common prefixes ("directories"), each ending with `/`.
    pub prefixes: Vec<String>,

    /// Blob names directly under the listed prefix.
    pub blobs: Vec<String>,
}

/// Bearer token with its expiry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccessToken {
    /// The raw token.
    pub token: String,

    /// When the token stops being valid.
    pub expires_on: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_bounds_sum() {
        let bounds = [SequenceBounds::new(0, 100), SequenceBounds::new(5, 50)];
        assert_eq!(SequenceBounds::sum(&bounds), SequenceBounds::new(5, 150));
    }

    #[test]
    fn test_sequence_bounds_sum_saturates() {
        let bounds = [
            SequenceBounds::new(i64::MIN, i64::MAX),
            SequenceBounds::new(-1, 1),
        ];
        assert_eq!(
            SequenceBounds::sum(&bounds),
            SequenceBounds::new(i64::MIN, i64::MAX)
        );
    }

    #[test]
    fn test_sequence_bounds_sum_empty() {
        let empty: [SequenceBounds; 0] = [];
        assert_eq!(SequenceBounds::sum(&empty), SequenceBounds::default());
    }
}
