//! Pure lag and ownership arithmetic over one consumer group.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ehm_providers::{Checkpoint, Ownership, SequenceBounds};
use tracing::warn;

/// Health of a consumer group derived from its live owners.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConsumerGroupState {
    /// Every partition has a live owner.
    Stable,

    /// Some, but not all, partitions have a live owner.
    Unstable,

    /// No partition has a live owner.
    Empty,
}

impl ConsumerGroupState {
    /// Classifies `active` live owners against `partition_count` partitions.
    /// Stable takes precedence, so a hub without partitions and without
    /// owners is stable.
    #[must_use]
    pub const fn classify(active: usize, partition_count: usize) -> Self {
        if active == partition_count {
            Self::Stable
        } else if active == 0 {
            Self::Empty
        } else {
            Self::Unstable
        }
    }

    /// Label value used on the consumer group info gauge.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Unstable => "unstable",
            Self::Empty => "empty",
        }
    }
}

impl fmt::Display for ConsumerGroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lag of a consumer group on one checkpointed partition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionLag {
    /// Partition identifier.
    pub partition_id: String,

    /// Committed sequence number, if any.
    pub sequence_number: Option<i64>,

    /// Events between the checkpoint and the partition end, never negative.
    pub lag: i64,
}

/// One ownership record and whether it still counts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OwnershipStatus {
    /// Partition identifier.
    pub partition_id: String,

    /// Owner identifier.
    pub owner_id: String,

    /// Whether the lease is past the expiry window or relinquished.
    pub expired: bool,
}

/// Everything recorded for one consumer group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsumerGroupAggregate {
    /// Per-partition lag, in checkpoint order.
    pub partitions: Vec<PartitionLag>,

    /// Ownership records, in listing order.
    pub ownerships: Vec<OwnershipStatus>,

    /// Sum of per-partition lag.
    pub lag_sum: i64,

    /// Sum of committed sequence numbers.
    pub committed_sequence_sum: i64,

    /// Number of ownership records that have not expired.
    pub active_owner_count: usize,

    /// Classification of `active_owner_count`.
    pub state: ConsumerGroupState,
}

/// Whether an ownership no longer counts as a live owner.
#[must_use]
pub fn is_ownership_expired(ownership: &Ownership, expiry: Duration, now: DateTime<Utc>) -> bool {
    if ownership.owner_id.is_empty() {
        return true;
    }

    let age = now.signed_duration_since(ownership.last_modified);
    chrono::Duration::from_std(expiry).is_ok_and(|expiry| age > expiry)
}

/// Computes lag, committed sums and ownership state of one consumer group.
///
/// Only partitions with a checkpoint entry contribute to the sums. A
/// checkpoint without a sequence number lags by the partition's full end
/// sequence number; a checkpoint ahead of the partition end is clamped to
/// zero lag. Sums saturate at the `i64` range.
#[must_use]
pub fn evaluate(
    bounds: &HashMap<String, SequenceBounds>,
    checkpoints: &[Checkpoint],
    ownerships: &[Ownership],
    partition_count: usize,
    ownership_expiry: Duration,
    now: DateTime<Utc>,
) -> ConsumerGroupAggregate {
    let mut lag_sum = 0;
    let mut committed_sequence_sum = 0;

    let partitions: Vec<_> = checkpoints
        .iter()
        .map(|checkpoint| {
            let max = bounds
                .get(&checkpoint.partition_id)
                .map_or(0, |bounds| bounds.max);

            let mut lag = match checkpoint.sequence_number {
                None => max,
                Some(seq) => max.checked_sub(seq).unwrap_or_else(|| {
                    warn!(
                        partition_id = %checkpoint.partition_id,
                        sequence_number = seq,
                        max,
                        "lag overflows i64, saturating"
                    );
                    max.saturating_sub(seq)
                }),
            };
            if lag < 0 {
                warn!(
                    partition_id = %checkpoint.partition_id,
                    sequence_number = ?checkpoint.sequence_number,
                    max,
                    "checkpoint is ahead of the partition end, clamping lag to 0"
                );
                lag = 0;
            }

            lag_sum = accumulate(lag_sum, lag, "lag_sum");
            committed_sequence_sum = accumulate(
                committed_sequence_sum,
                checkpoint.sequence_number.unwrap_or_default(),
                "committed_sequence_sum",
            );

            PartitionLag {
                partition_id: checkpoint.partition_id.clone(),
                sequence_number: checkpoint.sequence_number,
                lag,
            }
        })
        .collect();

    let ownerships: Vec<_> = ownerships
        .iter()
        .map(|ownership| OwnershipStatus {
            partition_id: ownership.partition_id.clone(),
            owner_id: ownership.owner_id.clone(),
            expired: is_ownership_expired(ownership, ownership_expiry, now),
        })
        .collect();

    let active_owner_count = ownerships.iter().filter(|o| !o.expired).count();

    ConsumerGroupAggregate {
        partitions,
        ownerships,
        lag_sum,
        committed_sequence_sum,
        active_owner_count,
        state: ConsumerGroupState::classify(active_owner_count, partition_count),
    }
}

fn accumulate(total: i64, value: i64, sum: &'static str) -> i64 {
    total.checked_add(value).unwrap_or_else(|| {
        warn!(sum, total, value, "sum overflows i64, saturating");
        total.saturating_add(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use tracing_test::traced_test;

    const EXPIRY: Duration = Duration::from_secs(60);

    fn bounds(entries: &[(&str, i64, i64)]) -> HashMap<String, SequenceBounds> {
        entries
            .iter()
            .map(|(id, min, max)| ((*id).to_string(), SequenceBounds::new(*min, *max)))
            .collect()
    }

    fn checkpoint(partition_id: &str, sequence_number: Option<i64>) -> Checkpoint {
        Checkpoint {
            partition_id: partition_id.to_string(),
            sequence_number,
            offset: None,
        }
    }

    fn ownership(
        partition_id: &str,
        owner_id: &str,
        age_secs: i64,
        now: DateTime<Utc>,
    ) -> Ownership {
        Ownership {
            partition_id: partition_id.to_string(),
            owner_id: owner_id.to_string(),
            last_modified: now - chrono::Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_all_partitions_checkpointed_and_owned() {
        let now = Utc::now();
        let result = evaluate(
            &bounds(&[("0", 0, 100), ("1", 0, 50)]),
            &[checkpoint("0", Some(90)), checkpoint("1", Some(50))],
            &[ownership("0", "a", 5, now), ownership("1", "b", 5, now)],
            2,
            EXPIRY,
            now,
        );

        let lags: Vec<_> = result.partitions.iter().map(|p| p.lag).collect();
        assert_eq!(lags, vec![10, 0]);
        assert_eq!(result.lag_sum, 10);
        assert_eq!(result.committed_sequence_sum, 140);
        assert_eq!(result.active_owner_count, 2);
        assert_eq!(result.state, ConsumerGroupState::Stable);
    }

    #[test]
    fn test_uncommitted_partition_lags_by_end() {
        let now = Utc::now();
        let result = evaluate(
            &bounds(&[("0", 0, 100), ("1", 0, 50)]),
            &[checkpoint("0", Some(90)), checkpoint("1", None)],
            &[],
            2,
            EXPIRY,
            now,
        );

        let lags: Vec<_> = result.partitions.iter().map(|p| p.lag).collect();
        assert_eq!(lags, vec![10, 50]);
        assert_eq!(result.lag_sum, 60);
        assert_eq!(result.committed_sequence_sum, 90);
        assert_eq!(result.state, ConsumerGroupState::Empty);
    }

    #[test]
    #[traced_test]
    fn test_negative_lag_clamped() {
        let result = evaluate(
            &bounds(&[("0", 0, 100)]),
            &[checkpoint("0", Some(120))],
            &[],
            1,
            EXPIRY,
            Utc::now(),
        );

        assert_eq!(result.partitions[0].lag, 0);
        assert_eq!(result.lag_sum, 0);
        assert!(logs_contain("clamping lag to 0"));
    }

    #[test]
    #[traced_test]
    fn test_extreme_sequence_numbers_saturate() {
        let result = evaluate(
            &bounds(&[("0", 0, i64::MAX), ("1", 0, i64::MAX)]),
            &[checkpoint("0", Some(i64::MIN)), checkpoint("1", Some(-1))],
            &[],
            2,
            EXPIRY,
            Utc::now(),
        );

        let lags: Vec<_> = result.partitions.iter().map(|p| p.lag).collect();
        assert_eq!(lags, vec![i64::MAX, i64::MAX]);
        assert_eq!(result.lag_sum, i64::MAX);
        assert_eq!(result.committed_sequence_sum, i64::MIN);
        assert!(logs_contain("lag overflows i64, saturating"));
        assert!(logs_contain("sum overflows i64, saturating"));
    }

    #[test]
    fn test_checkpoint_without_bounds() {
        let result = evaluate(
            &HashMap::new(),
            &[checkpoint("7", None)],
            &[],
            1,
            EXPIRY,
            Utc::now(),
        );

        assert_eq!(result.partitions[0].lag, 0);
    }

    #[test]
    fn test_expired_ownerships() {
        let now = Utc::now();
        let result = evaluate(
            &bounds(&[("0", 0, 1), ("1", 0, 1), ("2", 0, 1)]),
            &[],
            &[
                ownership("0", "a", 10, now),
                ownership("1", "b", 61, now),
                ownership("2", "", 1, now),
            ],
            3,
            EXPIRY,
            now,
        );

        let expired: Vec<_> = result.ownerships.iter().map(|o| o.expired).collect();
        assert_eq!(expired, vec![false, true, true]);
        assert_eq!(result.active_owner_count, 1);
        assert_eq!(result.state, ConsumerGroupState::Unstable);
    }

    #[test]
    fn test_expiry_boundary_is_live() {
        let now = Utc::now();
        assert!(!is_ownership_expired(&ownership("0", "a", 60, now), EXPIRY, now));
        assert!(is_ownership_expired(&ownership("0", "a", 61, now), EXPIRY, now));
    }

    #[test]
    fn test_classify_without_partitions() {
        assert_eq!(ConsumerGroupState::classify(0, 0), ConsumerGroupState::Stable);
        assert_eq!(ConsumerGroupState::Stable.to_string(), "stable");
    }

    proptest! {
        #[test]
        fn prop_lag_never_negative(max in any::<i64>(), seq in proptest::option::of(any::<i64>())) {
            let result = evaluate(
                &bounds(&[("0", 0, max)]),
                &[checkpoint("0", seq)],
                &[],
                1,
                EXPIRY,
                Utc::now(),
            );

            prop_assert!(result.partitions[0].lag >= 0);
            prop_assert_eq!(result.lag_sum, result.partitions[0].lag);
        }

        #[test]
        fn prop_sums_never_wrap(
            entries in proptest::collection::vec((any::<i64>(), proptest::option::of(any::<i64>())), 1..8),
        ) {
            let ids: Vec<String> = (0..entries.len()).map(|i| i.to_string()).collect();
            let bounds: HashMap<_, _> = ids
                .iter()
                .zip(&entries)
                .map(|(id, (max, _))| (id.clone(), SequenceBounds::new(0, *max)))
                .collect();
            let checkpoints: Vec<_> = ids
                .iter()
                .zip(&entries)
                .map(|(id, (_, seq))| checkpoint(id, *seq))
                .collect();

            let result = evaluate(&bounds, &checkpoints, &[], entries.len(), EXPIRY, Utc::now());

            let exact_lag: i128 = result.partitions.iter().map(|p| i128::from(p.lag)).sum();
            prop_assert!(result.lag_sum >= 0);
            prop_assert_eq!(
                i128::from(result.lag_sum),
                exact_lag.min(i128::from(i64::MAX))
            );
            let unsaturated = entries
                .iter()
                .try_fold(0i64, |total, (_, seq)| total.checked_add(seq.unwrap_or_default()));
            if let Some(exact) = unsaturated {
                prop_assert_eq!(result.committed_sequence_sum, exact);
            }
        }

        #[test]
        fn prop_lag_is_distance_to_end(max in 0i64..1_000_000, behind in 0i64..1_000_000) {
            let seq = max - behind;
            let result = evaluate(
                &bounds(&[("0", 0, max)]),
                &[checkpoint("0", Some(seq))],
                &[],
                1,
                EXPIRY,
                Utc::now(),
            );

            prop_assert_eq!(result.partitions[0].lag, behind);
            prop_assert_eq!(result.committed_sequence_sum, seq);
        }

        #[test]
        fn prop_uncommitted_lag_is_end(max in 0i64..1_000_000) {
            let result = evaluate(
                &bounds(&[("0", 0, max)]),
                &[checkpoint("0", None)],
                &[],
                1,
                EXPIRY,
                Utc::now(),
            );

            prop_assert_eq!(result.partitions[0].lag, max);
            prop_assert_eq!(result.committed_sequence_sum, 0);
        }

        #[test]
        fn prop_classification_is_total(active in 0usize..64, partitions in 0usize..64) {
            let state = ConsumerGroupState::classify(active, partitions);
            let expected = if active == partitions {
                ConsumerGroupState::Stable
            } else if active == 0 {
                ConsumerGroupState::Empty
            } else {
                ConsumerGroupState::Unstable
            };

            prop_assert_eq!(state, expected);
        }
    }
}
