//! Abstract interfaces for the data sources the collector samples: event hub
//! directories, checkpoint stores, storage listings and token providers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod filter;
mod types;

pub mod layout;

pub use error::{Error, Result};
pub use filter::NameFilter;
pub use types::*;

use std::collections::HashMap;

use async_trait::async_trait;

/// Acquires bearer tokens for a scope.
#[async_trait]
pub trait TokenProvider: Clone + Send + Sync + 'static {
    /// Returns a token valid for `scope`.
    async fn get_token(&self, scope: &str) -> Result<AccessToken>;
}

/// Lists event hubs, their consumer groups and partition sequence bounds.
///
/// All methods take the namespace endpoint, e.g. `myns.servicebus.windows.net`.
#[async_trait]
pub trait HubDirectory: Clone + Send + Sync + 'static {
    /// Lists every event hub in the namespace.
    async fn list_hubs(&self, endpoint: &str) -> Result<Vec<HubDetails>>;

    /// Lists the consumer group names of one hub.
    async fn list_consumer_groups(&self, endpoint: &str, hub: &str) -> Result<Vec<String>>;

    /// Fetches the current sequence bounds of every partition of `hub`,
    /// keyed by partition id.
    async fn sequence_bounds(
        &self,
        endpoint: &str,
        hub: &HubDetails,
    ) -> Result<HashMap<String, SequenceBounds>>;
}

/// Lists storage containers and walks their blob hierarchy.
#[async_trait]
pub trait StorageListing: Clone + Send + Sync + 'static {
    /// Lists container names of a storage account.
    async fn list_containers(&self, endpoint: &str) -> Result<Vec<String>>;

    /// Lists one `/`-delimited level under `prefix` (empty for the root).
    async fn list_directory(
        &self,
        endpoint: &str,
        container: &str,
        prefix: &str,
    ) -> Result<DirectoryListing>;
}

/// Reads checkpoint and ownership records from one storage container.
///
/// `namespace` is the fully qualified namespace the records were written
/// under.
#[async_trait]
pub trait CheckpointStore: Clone + Send + Sync + 'static {
    /// Lists the checkpoints of a consumer group.
    async fn list_checkpoints(
        &self,
        namespace: &str,
        hub: &str,
        consumer_group: &str,
    ) -> Result<Vec<Checkpoint>>;

    /// Lists the ownership records of a consumer group.
    async fn list_ownerships(
        &self,
        namespace: &str,
        hub: &str,
        consumer_group: &str,
    ) -> Result<Vec<Ownership>>;
}

/// Hands out a [`CheckpointStore`] bound to a storage container.
pub trait CheckpointStores: Clone + Send + Sync + 'static {
    /// The container-bound store type.
    type Store: CheckpointStore;

    /// Returns the store for `container`.
    fn container(&self, container: &StorageContainer) -> Self::Store;
}
