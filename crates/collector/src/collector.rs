use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use ehm_limiter::TaskLimiter;
use ehm_metrics::MetricsService;
use ehm_providers::{
    CheckpointStore, CheckpointStores, HubDetails, HubDirectory, NameFilter, SequenceBounds,
    StorageContainer, StorageListing,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn};

use crate::cancellable;
use crate::discovery::{DiscoveredStores, Discovery, StorageAccount};
use crate::error::{Error, Result};
use crate::evaluator::evaluate;
use crate::walker::{Walker, endpoint_host, resolve_namespace};

/// Tuning of a collection run.
#[derive(Clone, Copy, Debug)]
pub struct CollectorOptions {
    /// Hubs collected concurrently within one namespace.
    pub concurrency: NonZeroUsize,

    /// Age after which an ownership no longer counts as a live owner.
    pub ownership_expiry: Duration,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            concurrency: NonZeroUsize::new(8).unwrap_or(NonZeroUsize::MIN),
            ownership_expiry: Duration::from_secs(60),
        }
    }
}

/// A namespace to collect and the filters applied inside it.
#[derive(Clone, Debug)]
pub struct NamespaceTarget {
    /// Namespace endpoint, as a host or URL.
    pub endpoint: String,

    /// Filter on hub names.
    pub hub_filter: NameFilter,

    /// Filter on consumer group names. Only its exclude pattern is used.
    pub consumer_group_filter: NameFilter,
}

impl NamespaceTarget {
    /// Target collecting every hub and consumer group of `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            hub_filter: NameFilter::all(),
            consumer_group_filter: NameFilter::all(),
        }
    }

    /// Replaces the hub filter.
    #[must_use]
    pub fn with_hub_filter(mut self, filter: NameFilter) -> Self {
        self.hub_filter = filter;
        self
    }

    /// Replaces the consumer group filter.
    #[must_use]
    pub fn with_consumer_group_filter(mut self, filter: NameFilter) -> Self {
        self.consumer_group_filter = filter;
        self
    }
}

/// Counts of what one run collected.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    /// Namespaces collected.
    pub namespaces: usize,

    /// Hubs collected.
    pub hubs: usize,

    /// Consumer groups evaluated.
    pub consumer_groups: usize,

    /// Consumer groups skipped for lack of a checkpoint store.
    pub skipped_consumer_groups: usize,
}

/// Runs discovery, walks every namespace and records the gauges.
#[derive(Clone, Debug)]
pub struct Collector<H, L, C> {
    walker: Walker<H>,
    discovery: Discovery<L>,
    stores: C,
    metrics: MetricsService,
    options: CollectorOptions,
    namespaces: Vec<NamespaceTarget>,
    storage_accounts: Vec<StorageAccount>,
}

impl<H, L, C> Collector<H, L, C>
where
    H: HubDirectory,
    L: StorageListing,
    C: CheckpointStores,
{
    /// Creates a collector without targets.
    pub const fn new(
        directory: H,
        listing: L,
        stores: C,
        metrics: MetricsService,
        options: CollectorOptions,
    ) -> Self {
        Self {
            walker: Walker::new(directory),
            discovery: Discovery::new(listing),
            stores,
            metrics,
            options,
            namespaces: Vec::new(),
            storage_accounts: Vec::new(),
        }
    }

    /// Sets the namespaces to collect.
    #[must_use]
    pub fn with_namespaces(mut self, namespaces: Vec<NamespaceTarget>) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Sets the storage accounts searched for checkpoint containers.
    #[must_use]
    pub fn with_storage_accounts(mut self, storage_accounts: Vec<StorageAccount>) -> Self {
        self.storage_accounts = storage_accounts;
        self
    }

    /// Collects every namespace once.
    ///
    /// Namespaces are walked in order; hubs of one namespace run
    /// concurrently up to the configured limit. The first failure cancels
    /// the run and is returned once the running hubs have finished. The
    /// metrics service is reset first, so buffered samples of an earlier
    /// failed run are never flushed with this one.
    ///
    /// # Errors
    ///
    /// Returns the first provider or recorder error, [`Error::HubTaskAborted`]
    /// when a hub task panics, or [`Error::Cancelled`] when `cancel` fires.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<RunSummary> {
        let run = cancel.child_token();

        self.metrics.reset();

        let discovered = self
            .discovery
            .discover(&self.storage_accounts, &run)
            .await?;
        info!(
            stores = discovered.len(),
            skipped_paths = discovered.skipped().len(),
            "discovered checkpoint stores"
        );
        if discovered.is_empty() {
            warn!("no checkpoint stores found, consumer groups will be skipped");
        }

        let discovered = Arc::new(discovered);
        let mut summary = RunSummary::default();

        for target in &self.namespaces {
            self.collect_namespace(target, &discovered, &run, &mut summary)
                .await?;
            summary.namespaces += 1;
        }

        Ok(summary)
    }

    async fn collect_namespace(
        &self,
        target: &NamespaceTarget,
        discovered: &Arc<DiscoveredStores>,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let endpoint = endpoint_host(&target.endpoint)?;
        let namespace = resolve_namespace(&target.endpoint)?;

        self.metrics.record_namespace_info(&namespace, &endpoint)?;

        let hubs = self
            .walker
            .list_hubs(&endpoint, &target.hub_filter, cancel)
            .await?;

        let context = Arc::new(HubContext {
            walker: self.walker.clone(),
            stores: self.stores.clone(),
            metrics: self.metrics.clone(),
            ownership_expiry: self.options.ownership_expiry,
            discovered: Arc::clone(discovered),
            endpoint,
            namespace,
            consumer_group_filter: target.consumer_group_filter.clone(),
            evaluated: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        });

        let limiter = TaskLimiter::new(self.options.concurrency);
        let failure: Arc<Mutex<Option<Error>>> = Arc::default();
        info!(
            namespace = %context.namespace,
            hubs = hubs.len(),
            concurrency = limiter.limit().get(),
            "collecting namespace"
        );

        for hub in hubs {
            let context = Arc::clone(&context);
            let failure = Arc::clone(&failure);
            let cancel_on_failure = cancel.clone();

            let admitted = limiter
                .submit(cancel, async move {
                    let mut guard = HubTaskGuard {
                        hub: hub.name.clone(),
                        failure,
                        cancel: cancel_on_failure,
                        completed: false,
                    };
                    if let Err(err) = context.collect_hub(&hub, &guard.cancel).await {
                        guard.fail(err);
                    }
                    guard.completed = true;
                })
                .await;

            if !admitted {
                break;
            }
            summary.hubs += 1;
        }

        limiter.wait().await;

        summary.consumer_groups += context.evaluated.load(Ordering::Relaxed);
        summary.skipped_consumer_groups += context.skipped.load(Ordering::Relaxed);

        let failure = failure.lock().take();
        match failure {
            Some(err) => Err(err),
            None if cancel.is_cancelled() => Err(Error::Cancelled),
            None => Ok(()),
        }
    }
}

/// Reports a hub task's failure to its namespace. A task dropped before
/// completing, as on a panic, fails the namespace too.
struct HubTaskGuard {
    hub: String,
    failure: Arc<Mutex<Option<Error>>>,
    cancel: CancellationToken,
    completed: bool,
}

impl HubTaskGuard {
    /// Keeps the first error of the namespace and cancels its other tasks.
    fn fail(&self, err: Error) {
        {
            let mut first = self.failure.lock();
            if first.is_none() {
                error!(hub = %self.hub, error = %err, "failed to collect event hub");
                *first = Some(err);
            }
        }
        self.cancel.cancel();
    }
}

impl Drop for HubTaskGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.fail(Error::HubTaskAborted(self.hub.clone()));
        }
    }
}

/// State shared by the hub tasks of one namespace.
struct HubContext<H, C> {
    walker: Walker<H>,
    stores: C,
    metrics: MetricsService,
    ownership_expiry: Duration,
    discovered: Arc<DiscoveredStores>,
    endpoint: String,
    namespace: String,
    consumer_group_filter: NameFilter,
    evaluated: AtomicUsize,
    skipped: AtomicUsize,
}

impl<H, C> HubContext<H, C>
where
    H: HubDirectory,
    C: CheckpointStores,
{
    async fn collect_hub(&self, hub: &HubDetails, cancel: &CancellationToken) -> Result<()> {
        let consumer_groups = self
            .walker
            .list_consumer_groups(&self.endpoint, &hub.name, cancel)
            .await?;
        let bounds = self
            .walker
            .sequence_bounds(&self.endpoint, hub, cancel)
            .await?;

        self.metrics.record_eventhub_info(
            &self.namespace,
            &hub.name,
            hub.partition_count,
            hub.retention_in_days,
        )?;

        let mut partitions: Vec<_> = bounds.iter().collect();
        partitions.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (partition_id, partition) in partitions {
            self.metrics.record_partition_sequence_numbers(
                &self.namespace,
                &hub.name,
                partition_id,
                partition.min,
                partition.max,
            )?;
        }

        let sum = SequenceBounds::sum(bounds.values());
        self.metrics
            .record_sequence_number_sum(&self.namespace, &hub.name, sum.min, sum.max)?;

        let stores = self.discovered.resolve_stores(&self.endpoint, &hub.name);

        for consumer_group in consumer_groups {
            if self.consumer_group_filter.excludes(&consumer_group) {
                debug!(hub = %hub.name, %consumer_group, "skipping excluded consumer group");
                continue;
            }

            let Some(container) = stores.get(&consumer_group.to_lowercase()) else {
                warn!(
                    namespace = %self.namespace,
                    hub = %hub.name,
                    %consumer_group,
                    "no checkpoint store found for consumer group"
                );
                self.skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            self.collect_consumer_group(hub, &bounds, &consumer_group, container, cancel)
                .await?;
            self.evaluated.fetch_add(1, Ordering::Relaxed);
        }

        debug!(namespace = %self.namespace, hub = %hub.name, "collected event hub");
        Ok(())
    }

    async fn collect_consumer_group(
        &self,
        hub: &HubDetails,
        bounds: &HashMap<String, SequenceBounds>,
        consumer_group: &str,
        container: &StorageContainer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let store = self.stores.container(container);

        let checkpoints = cancellable(
            cancel,
            store.list_checkpoints(&self.endpoint, &hub.name, consumer_group),
        )
        .await?;
        let ownerships = cancellable(
            cancel,
            store.list_ownerships(&self.endpoint, &hub.name, consumer_group),
        )
        .await?;

        let aggregate = info_span!("consumer_group", hub = %hub.name, consumer_group).in_scope(|| {
            evaluate(
                bounds,
                &checkpoints,
                &ownerships,
                hub.partition_count,
                self.ownership_expiry,
                Utc::now(),
            )
        });

        let (namespace, hub) = (self.namespace.as_str(), hub.name.as_str());

        for partition in &aggregate.partitions {
            self.metrics.record_consumer_group_partition_lag(
                namespace,
                hub,
                consumer_group,
                &partition.partition_id,
                partition.lag,
            )?;
        }
        self.metrics
            .record_consumer_group_lag(namespace, hub, consumer_group, aggregate.lag_sum)?;
        self.metrics.record_consumer_group_events(
            namespace,
            hub,
            consumer_group,
            aggregate.committed_sequence_sum,
        )?;

        for ownership in &aggregate.ownerships {
            self.metrics.record_consumer_group_partition_owner(
                namespace,
                hub,
                consumer_group,
                &ownership.partition_id,
                &ownership.owner_id,
                ownership.expired,
            )?;
        }
        self.metrics.record_consumer_group_owners(
            namespace,
            hub,
            consumer_group,
            aggregate.active_owner_count,
        )?;
        self.metrics.record_consumer_group_info(
            namespace,
            hub,
            consumer_group,
            aggregate.state.as_str(),
        )?;

        debug!(
            namespace,
            hub,
            consumer_group,
            lag = aggregate.lag_sum,
            state = %aggregate.state,
            "evaluated consumer group"
        );
        Ok(())
    }
}
