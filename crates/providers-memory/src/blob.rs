use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ehm_providers::layout::{
    OFFSET_KEY, OWNER_ID_KEY, SEQUENCE_NUMBER_KEY, checkpoint_prefix, ownership_prefix,
};
use ehm_providers::{
    Checkpoint, CheckpointStore, CheckpointStores, DirectoryListing, Error, Ownership, Result,
    StorageContainer, StorageListing,
};
use tokio::sync::RwLock;

/// A stored blob: its metadata and last-modified time.
#[derive(Clone, Debug)]
pub struct MemoryBlob {
    /// Blob metadata.
    pub metadata: HashMap<String, String>,

    /// Last-modified property.
    pub last_modified: DateTime<Utc>,
}

impl MemoryBlob {
    /// Blob without metadata, modified now.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            metadata: HashMap::new(),
            last_modified: Utc::now(),
        }
    }
}

type Containers = BTreeMap<String, BTreeMap<String, MemoryBlob>>;

/// In-memory blob storage: accounts, containers and blobs.
///
/// Implements both the storage listing used for discovery and the checkpoint
/// stores, laid out the way the Event Hubs SDKs write them.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlobStorage {
    accounts: Arc<RwLock<BTreeMap<String, Containers>>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

impl MemoryBlobStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a container if it does not exist yet.
    pub async fn create_container(&self, endpoint: &str, container: &str) {
        self.accounts
            .write()
            .await
            .entry(endpoint.to_string())
            .or_default()
            .entry(container.to_string())
            .or_default();
    }

    /// Stores a blob, creating its container as needed.
    pub async fn put_blob(&self, endpoint: &str, container: &str, name: &str, blob: MemoryBlob) {
        self.accounts
            .write()
            .await
            .entry(endpoint.to_string())
            .or_default()
            .entry(container.to_string())
            .or_default()
            .insert(name.to_string(), blob);
    }

    /// Stores a checkpoint blob for one partition.
    pub async fn put_checkpoint(
        &self,
        container: &StorageContainer,
        group: (&str, &str, &str),
        partition_id: &str,
        sequence_number: Option<i64>,
    ) {
        let (namespace, hub, consumer_group) = group;
        let mut metadata = HashMap::new();
        if let Some(sequence_number) = sequence_number {
            metadata.insert(SEQUENCE_NUMBER_KEY.to_string(), sequence_number.to_string());
        }

        let name = format!(
            "{}{partition_id}",
            checkpoint_prefix(namespace, hub, consumer_group)
        );
        self.put_blob(
            &container.endpoint,
            &container.container,
            &name,
            MemoryBlob {
                metadata,
                last_modified: Utc::now(),
            },
        )
        .await;
    }

    /// Stores an ownership blob for one partition.
    pub async fn put_ownership(
        &self,
        container: &StorageContainer,
        group: (&str, &str, &str),
        partition_id: &str,
        owner_id: &str,
        last_modified: DateTime<Utc>,
    ) {
        let (namespace, hub, consumer_group) = group;
        let name = format!(
            "{}{partition_id}",
            ownership_prefix(namespace, hub, consumer_group)
        );
        self.put_blob(
            &container.endpoint,
            &container.container,
            &name,
            MemoryBlob {
                metadata: HashMap::from([(OWNER_ID_KEY.to_string(), owner_id.to_string())]),
                last_modified,
            },
        )
        .await;
    }

    /// Makes every call against `endpoint` fail with a transport error.
    pub async fn fail_endpoint(&self, endpoint: &str) {
        self.failing.write().await.insert(endpoint.to_string());
    }

    async fn check(&self, endpoint: &str) -> Result<()> {
        if self.failing.read().await.contains(endpoint) {
            return Err(Error::Transport(format!("injected failure for {endpoint}")));
        }
        Ok(())
    }

    async fn blobs_with_prefix(
        &self,
        container: &StorageContainer,
        prefix: &str,
    ) -> Result<Vec<(String, MemoryBlob)>> {
        self.check(&container.endpoint).await?;

        let accounts = self.accounts.read().await;
        let blobs = accounts
            .get(&container.endpoint)
            .and_then(|containers| containers.get(&container.container))
            .ok_or_else(|| Error::Transport(format!("container {container} not found")))?;

        Ok(blobs
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, blob)| (name[prefix.len()..].to_string(), blob.clone()))
            .collect())
    }
}

#[async_trait]
impl StorageListing for MemoryBlobStorage {
    async fn list_containers(&self, endpoint: &str) -> Result<Vec<String>> {
        self.check(endpoint).await?;

        Ok(self
            .accounts
            .read()
            .await
            .get(endpoint)
            .map(|containers| containers.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_directory(
        &self,
        endpoint: &str,
        container: &str,
        prefix: &str,
    ) -> Result<DirectoryListing> {
        let entries = self
            .blobs_with_prefix(&StorageContainer::new(endpoint, container), prefix)
            .await?;

        let mut prefixes = BTreeSet::new();
        let mut blobs = BTreeSet::new();

        for (rest, _) in entries {
            match rest.find('/') {
                Some(idx) => {
                    prefixes.insert(format!("{prefix}{}", &rest[..=idx]));
                }
                None => {
                    blobs.insert(format!("{prefix}{rest}"));
                }
            }
        }

        Ok(DirectoryListing {
            prefixes: prefixes.into_iter().collect(),
            blobs: blobs.into_iter().collect(),
        })
    }
}

impl CheckpointStores for MemoryBlobStorage {
    type Store = MemoryCheckpointStore;

    fn container(&self, container: &StorageContainer) -> Self::Store {
        MemoryCheckpointStore {
            storage: self.clone(),
            container: container.clone(),
        }
    }
}

/// Checkpoint store bound to one in-memory container.
#[derive(Clone, Debug)]
pub struct MemoryCheckpointStore {
    storage: MemoryBlobStorage,
    container: StorageContainer,
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn list_checkpoints(
        &self,
        namespace: &str,
        hub: &str,
        consumer_group: &str,
    ) -> Result<Vec<Checkpoint>> {
        let prefix = checkpoint_prefix(namespace, hub, consumer_group);
        let blobs = self
            .storage
            .blobs_with_prefix(&self.container, &prefix)
            .await?;

        blobs
            .into_iter()
            .map(|(partition_id, blob)| {
                let sequence_number = blob
                    .metadata
                    .get(SEQUENCE_NUMBER_KEY)
                    .map(|value| {
                        value.parse::<i64>().map_err(|e| {
                            Error::Decode(format!("invalid sequence number {value:?}: {e}"))
                        })
                    })
                    .transpose()?;

                Ok(Checkpoint {
                    partition_id,
                    sequence_number,
                    offset: blob.metadata.get(OFFSET_KEY).cloned(),
                })
            })
            .collect()
    }

    async fn list_ownerships(
        &self,
        namespace: &str,
        hub: &str,
        consumer_group: &str,
    ) -> Result<Vec<Ownership>> {
        let prefix = ownership_prefix(namespace, hub, consumer_group);
        let blobs = self
            .storage
            .blobs_with_prefix(&self.container, &prefix)
            .await?;

        Ok(blobs
            .into_iter()
            .map(|(partition_id, blob)| Ownership {
                partition_id,
                owner_id: blob.metadata.get(OWNER_ID_KEY).cloned().unwrap_or_default(),
                last_modified: blob.last_modified,
            })
            .collect())
    }
}
