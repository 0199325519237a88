//! Walks event hub namespaces and checkpoint stores and turns what it finds
//! into consumer group lag and ownership gauges.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod collector;
mod discovery;
mod error;
mod evaluator;
mod walker;

pub use collector::{Collector, CollectorOptions, NamespaceTarget, RunSummary};
pub use discovery::{DiscoveredStores, Discovery, SkippedPath, StorageAccount};
pub use error::{Error, Result};
pub use evaluator::{
    ConsumerGroupAggregate, ConsumerGroupState, OwnershipStatus, PartitionLag, evaluate,
    is_ownership_expired,
};
pub use walker::{Walker, resolve_namespace};

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Races a provider call against `cancel`.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = ehm_providers::Result<T>>,
{
    tokio::select! {
        biased;

        () = cancel.cancelled() => Err(Error::Cancelled),
        result = call => result.map_err(Error::from),
    }
}
