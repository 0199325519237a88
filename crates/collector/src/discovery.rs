use std::collections::{BTreeMap, BTreeSet};

use ehm_providers::{NameFilter, StorageContainer, StorageListing, StoredConsumerGroup};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancellable;
use crate::error::Result;

/// Depth of a `namespace/hub/consumerGroup` directory.
const CONSUMER_GROUP_DEPTH: usize = 3;

/// A storage account to search for checkpoint containers.
#[derive(Clone, Debug)]
pub struct StorageAccount {
    /// Account endpoint, e.g. `myaccount.blob.core.windows.net`.
    pub endpoint: String,

    /// Container name filter.
    pub filter: NameFilter,
}

impl StorageAccount {
    /// Creates a new `StorageAccount`.
    pub fn new(endpoint: impl Into<String>, filter: NameFilter) -> Self {
        Self {
            endpoint: endpoint.into(),
            filter,
        }
    }
}

/// A blob path that does not fit the checkpoint layout.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SkippedPath {
    /// Container the path was found in.
    pub container: StorageContainer,

    /// The offending path.
    pub path: String,

    /// Number of non-empty segments in the path.
    pub depth: usize,
}

/// Consumer groups found per checkpoint container.
#[derive(Clone, Debug, Default)]
pub struct DiscoveredStores {
    containers: BTreeMap<StorageContainer, Vec<StoredConsumerGroup>>,
    skipped: Vec<SkippedPath>,
}

impl DiscoveredStores {
    /// Containers holding at least one consumer group, with their groups in
    /// sorted order.
    #[must_use]
    pub const fn containers(&self) -> &BTreeMap<StorageContainer, Vec<StoredConsumerGroup>> {
        &self.containers
    }

    /// Paths ignored during the walk.
    #[must_use]
    pub fn skipped(&self) -> &[SkippedPath] {
        &self.skipped
    }

    /// Number of containers holding consumer groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Whether no container holds a consumer group.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Maps each consumer group of `hub` in `namespace` to the container
    /// holding its checkpoints.
    ///
    /// `namespace` is the fully qualified namespace the checkpoints were
    /// written under. Checkpoint paths are lowercase, so the match ignores
    /// case rather than comparing names exactly: `MyNs`/`Orders` finds the
    /// checkpoints an SDK wrote under `myns`/`orders`. The returned keys are
    /// lowercase consumer group names. When two containers hold the same
    /// group, the container sorting last wins.
    #[must_use]
    pub fn resolve_stores(&self, namespace: &str, hub: &str) -> BTreeMap<String, StorageContainer> {
        let namespace = namespace.to_lowercase();
        let hub = hub.to_lowercase();
        let mut stores = BTreeMap::new();

        for (container, groups) in &self.containers {
            for group in groups {
                if group.namespace.to_lowercase() != namespace || group.hub.to_lowercase() != hub {
                    continue;
                }

                if let Some(previous) =
                    stores.insert(group.consumer_group.to_lowercase(), container.clone())
                {
                    warn!(
                        %namespace,
                        %hub,
                        consumer_group = %group.consumer_group,
                        %previous,
                        %container,
                        "consumer group has checkpoints in more than one container"
                    );
                }
            }
        }

        stores
    }
}

/// Finds checkpoint containers and the consumer groups they hold.
#[derive(Clone, Debug)]
pub struct Discovery<L> {
    listing: L,
}

impl<L> Discovery<L>
where
    L: StorageListing,
{
    /// Creates a discovery over `listing`.
    pub const fn new(listing: L) -> Self {
        Self { listing }
    }

    /// Lists the containers of every account and walks those passing the
    /// account's filter.
    ///
    /// # Errors
    ///
    /// Any provider error aborts discovery. Malformed paths never do.
    pub async fn discover(
        &self,
        accounts: &[StorageAccount],
        cancel: &CancellationToken,
    ) -> Result<DiscoveredStores> {
        let mut stores = DiscoveredStores::default();

        for account in accounts {
            let containers =
                cancellable(cancel, self.listing.list_containers(&account.endpoint)).await?;

            for name in containers {
                if !account.filter.matches(&name) {
                    debug!(endpoint = %account.endpoint, container = %name, "skipping container");
                    continue;
                }

                let container = StorageContainer::new(&account.endpoint, name);
                let groups = self.walk(&container, cancel, &mut stores.skipped).await?;

                if groups.is_empty() {
                    debug!(%container, "container holds no checkpoints");
                    continue;
                }

                info!(%container, consumer_groups = groups.len(), "found checkpoint store");
                stores.containers.insert(container, groups);
            }
        }

        Ok(stores)
    }

    async fn walk(
        &self,
        container: &StorageContainer,
        cancel: &CancellationToken,
        skipped: &mut Vec<SkippedPath>,
    ) -> Result<Vec<StoredConsumerGroup>> {
        let mut groups = BTreeSet::new();
        let mut pending = vec![(String::new(), 0)];

        while let Some((prefix, depth)) = pending.pop() {
            let listing = cancellable(
                cancel,
                self.listing
                    .list_directory(&container.endpoint, &container.container, &prefix),
            )
            .await?;

            for blob in listing.blobs {
                let depth = segments(&blob).len();
                skip(container, blob, depth, skipped);
            }

            for child in listing.prefixes {
                let child_depth = segments(&child).len();

                if child_depth != depth + 1 {
                    skip(container, child, child_depth, skipped);
                } else if child_depth == CONSUMER_GROUP_DEPTH {
                    if let [namespace, hub, consumer_group] = segments(&child)[..] {
                        groups.insert(StoredConsumerGroup::new(namespace, hub, consumer_group));
                    }
                } else {
                    pending.push((child, child_depth));
                }
            }
        }

        Ok(groups.into_iter().collect())
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn skip(container: &StorageContainer, path: String, depth: usize, skipped: &mut Vec<SkippedPath>) {
    warn!(
        endpoint = %container.endpoint,
        container = %container.container,
        path = %path,
        depth,
        "ignoring invalid checkpoint path"
    );

    skipped.push(SkippedPath {
        container: container.clone(),
        path,
        depth,
    });
}
