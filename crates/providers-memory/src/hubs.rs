use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use ehm_providers::{Error, HubDirectory, HubDetails, Result, SequenceBounds};
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
struct MemoryHub {
    details: HubDetails,
    consumer_groups: Vec<String>,
    bounds: HashMap<String, SequenceBounds>,
}

/// In-memory hub directory.
#[derive(Clone, Debug, Default)]
pub struct MemoryHubDirectory {
    namespaces: Arc<RwLock<HashMap<String, Vec<MemoryHub>>>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

impl MemoryHubDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hub with its consumer groups and per-partition bounds.
    ///
    /// The hub's partition ids and count are taken from `bounds` when
    /// `details.partition_ids` is empty.
    pub async fn add_hub<I, S>(
        &self,
        endpoint: &str,
        mut details: HubDetails,
        consumer_groups: I,
        bounds: HashMap<String, SequenceBounds>,
    ) where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if details.partition_ids.is_empty() {
            let mut ids: Vec<String> = bounds.keys().cloned().collect();
            ids.sort();
            details.partition_count = ids.len();
            details.partition_ids = ids;
        }

        self.namespaces
            .write()
            .await
            .entry(endpoint.to_string())
            .or_default()
            .push(MemoryHub {
                details,
                consumer_groups: consumer_groups.into_iter().map(Into::into).collect(),
                bounds,
            });
    }

    /// Makes every call for `endpoint`, or for `endpoint/hub` when a hub is
    /// given, fail with a transport error.
    pub async fn fail(&self, endpoint: &str, hub: Option<&str>) {
        self.failing.write().await.insert(failure_key(endpoint, hub));
    }

    async fn check(&self, endpoint: &str, hub: Option<&str>) -> Result<()> {
        let failing = self.failing.read().await;
        if failing.contains(&failure_key(endpoint, None))
            || hub.is_some_and(|_| failing.contains(&failure_key(endpoint, hub)))
        {
            return Err(Error::Transport(format!(
                "injected failure for {}",
                failure_key(endpoint, hub)
            )));
        }
        Ok(())
    }

    async fn hub(&self, endpoint: &str, hub: &str) -> Result<MemoryHub> {
        self.namespaces
            .read()
            .await
            .get(endpoint)
            .and_then(|hubs| hubs.iter().find(|h| h.details.name == hub))
            .cloned()
            .ok_or_else(|| Error::Transport(format!("hub {hub} not found in {endpoint}")))
    }
}

fn failure_key(endpoint: &str, hub: Option<&str>) -> String {
    hub.map_or_else(|| endpoint.to_string(), |hub| format!("{endpoint}/{hub}"))
}

#[async_trait]
impl HubDirectory for MemoryHubDirectory {
    async fn list_hubs(&self, endpoint: &str) -> Result<Vec<HubDetails>> {
        self.check(endpoint, None).await?;

        Ok(self
            .namespaces
            .read()
            .await
            .get(endpoint)
            .map(|hubs| hubs.iter().map(|h| h.details.clone()).collect())
            .unwrap_or_default())
    }

    async fn list_consumer_groups(&self, endpoint: &str, hub: &str) -> Result<Vec<String>> {
        self.check(endpoint, Some(hub)).await?;
        Ok(self.hub(endpoint, hub).await?.consumer_groups)
    }

    async fn sequence_bounds(
        &self,
        endpoint: &str,
        hub: &HubDetails,
    ) -> Result<HashMap<String, SequenceBounds>> {
        self.check(endpoint, Some(&hub.name)).await?;
        Ok(self.hub(endpoint, &hub.name).await?.bounds)
    }
}
