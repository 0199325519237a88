use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ehm_providers::layout::{
    OFFSET_KEY, OWNER_ID_KEY, SEQUENCE_NUMBER_KEY, checkpoint_prefix, ownership_prefix,
};
use ehm_providers::{
    Checkpoint, CheckpointStore, CheckpointStores, DirectoryListing, Error, Ownership, Result,
    StorageContainer, StorageListing, TokenProvider,
};
use url::Url;

use crate::rest::RestClient;
use crate::xml::{BlobItem, parse_blob_list, parse_container_list};

/// Token scope of the Blob service.
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

/// Blob service client used for discovery and as checkpoint store.
#[derive(Clone, Debug)]
pub struct AzureBlobStorage<T> {
    rest: RestClient<T>,
}

impl<T> AzureBlobStorage<T>
where
    T: TokenProvider,
{
    /// Creates a client authenticating with `tokens`.
    pub fn new(tokens: T) -> Self {
        Self {
            rest: RestClient::new(tokens),
        }
    }

    /// Talks plain HTTP, for emulators.
    #[must_use]
    pub fn insecure(self) -> Self {
        Self {
            rest: self.rest.with_scheme("http"),
        }
    }

    /// Follows `NextMarker` until the listing is exhausted.
    async fn list_blobs(
        &self,
        endpoint: &str,
        container: &str,
        prefix: &str,
        hierarchical: bool,
    ) -> Result<(Vec<String>, Vec<BlobItem>)> {
        let mut prefixes = Vec::new();
        let mut blobs = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = self.rest.url(endpoint, &[container])?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("restype", "container")
                    .append_pair("comp", "list")
                    .append_pair("prefix", prefix);
                if hierarchical {
                    query.append_pair("delimiter", "/");
                } else {
                    query.append_pair("include", "metadata");
                }
                if let Some(marker) = &marker {
                    query.append_pair("marker", marker);
                }
            }

            let page = parse_blob_list(&self.rest.get(url, STORAGE_SCOPE).await?)?;
            prefixes.extend(page.prefixes);
            blobs.extend(page.blobs);

            match page.next_marker {
                Some(next) if !next.is_empty() => marker = Some(next),
                _ => break,
            }
        }

        Ok((prefixes, blobs))
    }

    fn service_url(&self, endpoint: &str, marker: Option<&str>) -> Result<Url> {
        let mut url = self.rest.url(endpoint, &[])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("comp", "list");
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl<T> StorageListing for AzureBlobStorage<T>
where
    T: TokenProvider,
{
    async fn list_containers(&self, endpoint: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let url = self.service_url(endpoint, marker.as_deref())?;
            let page = parse_container_list(&self.rest.get(url, STORAGE_SCOPE).await?)?;
            names.extend(page.names);

            match page.next_marker {
                Some(next) if !next.is_empty() => marker = Some(next),
                _ => break,
            }
        }

        Ok(names)
    }

    async fn list_directory(
        &self,
        endpoint: &str,
        container: &str,
        prefix: &str,
    ) -> Result<DirectoryListing> {
        let (prefixes, blobs) = self.list_blobs(endpoint, container, prefix, true).await?;

        Ok(DirectoryListing {
            prefixes,
            blobs: blobs.into_iter().map(|blob| blob.name).collect(),
        })
    }
}

impl<T> CheckpointStores for AzureBlobStorage<T>
where
    T: TokenProvider,
{
    type Store = AzureCheckpointStore<T>;

    fn container(&self, container: &StorageContainer) -> Self::Store {
        AzureCheckpointStore {
            storage: self.clone(),
            container: container.clone(),
        }
    }
}

/// Checkpoint store over one blob container.
#[derive(Clone, Debug)]
pub struct AzureCheckpointStore<T> {
    storage: AzureBlobStorage<T>,
    container: StorageContainer,
}

impl<T> AzureCheckpointStore<T>
where
    T: TokenProvider,
{
    /// Blobs under `prefix` with the prefix stripped from their names.
    async fn entries(&self, prefix: &str) -> Result<Vec<(String, BlobItem)>> {
        let (_, blobs) = self
            .storage
            .list_blobs(&self.container.endpoint, &self.container.container, prefix, false)
            .await?;

        Ok(blobs
            .into_iter()
            .filter_map(|blob| {
                let partition_id = blob.name.strip_prefix(prefix)?.to_string();
                Some((partition_id, blob))
            })
            .collect())
    }
}

fn last_modified(blob: &BlobItem) -> Result<DateTime<Utc>> {
    let value = blob
        .last_modified
        .as_deref()
        .ok_or_else(|| Error::Decode(format!("blob {} has no Last-Modified", blob.name)))?;

    DateTime::parse_from_rfc2822(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| Error::Decode(format!("invalid Last-Modified {value:?}: {e}")))
}

#[async_trait]
impl<T> CheckpointStore for AzureCheckpointStore<T>
where
    T: TokenProvider,
{
    async fn list_checkpoints(
        &self,
        namespace: &str,
        hub: &str,
        consumer_group: &str,
    ) -> Result<Vec<Checkpoint>> {
        let prefix = checkpoint_prefix(namespace, hub, consumer_group);

        self.entries(&prefix)
            .await?
            .into_iter()
            .map(|(partition_id, blob)| {
                let sequence_number = blob
                    .metadata
                    .get(SEQUENCE_NUMBER_KEY)
                    .map(|value| {
                        value.parse::<i64>().map_err(|e| {
                            Error::Decode(format!(
                                "invalid sequence number {value:?} in {}: {e}",
                                blob.name
                            ))
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

        self.entries(&prefix)
            .await?
            .into_iter()
            .map(|(partition_id, blob)| {
                Ok(Ownership {
                    last_modified: last_modified(&blob)?,
                    owner_id: blob.metadata.get(OWNER_ID_KEY).cloned().unwrap_or_default(),
                    partition_id,
                })
            })
            .collect()
    }
}
