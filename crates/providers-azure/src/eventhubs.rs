use std::collections::HashMap;

use async_trait::async_trait;
use ehm_providers::{HubDetails, HubDirectory, Result, SequenceBounds, TokenProvider};
use tracing::trace;

use crate::rest::RestClient;
use crate::xml::{parse_feed, parse_partition_description};

/// API version of the Event Hubs management endpoints.
pub const EVENTHUBS_API_VERSION: &str = "2014-01";

/// Consumer group whose partition runtime information is queried.
const DEFAULT_CONSUMER_GROUP: &str = "$Default";

fn scope(endpoint: &str) -> String {
    format!("https://{endpoint}/.default")
}

/// Hub directory backed by the namespace's management API.
#[derive(Clone, Debug)]
pub struct AzureHubDirectory<T> {
    rest: RestClient<T>,
}

impl<T> AzureHubDirectory<T>
where
    T: TokenProvider,
{
    /// Creates a directory authenticating with `tokens`.
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

    async fn get(&self, endpoint: &str, segments: &[&str]) -> Result<String> {
        let mut url = self.rest.url(endpoint, segments)?;
        url.query_pairs_mut()
            .append_pair("api-version", EVENTHUBS_API_VERSION);
        self.rest.get(url, &scope(endpoint)).await
    }
}

#[async_trait]
impl<T> HubDirectory for AzureHubDirectory<T>
where
    T: TokenProvider,
{
    async fn list_hubs(&self, endpoint: &str) -> Result<Vec<HubDetails>> {
        let body = self.get(endpoint, &["$Resources", "Eventhubs"]).await?;

        Ok(parse_feed(&body)?
            .into_iter()
            .map(|entry| {
                let description = entry.description.unwrap_or_default();
                HubDetails {
                    name: entry.title,
                    partition_count: description.partition_count,
                    partition_ids: description.partition_ids,
                    retention_in_days: description.message_retention_in_days,
                }
            })
            .collect())
    }

    async fn list_consumer_groups(&self, endpoint: &str, hub: &str) -> Result<Vec<String>> {
        let body = self.get(endpoint, &[hub, "consumergroups"]).await?;

        Ok(parse_feed(&body)?
            .into_iter()
            .map(|entry| entry.title)
            .collect())
    }

    async fn sequence_bounds(
        &self,
        endpoint: &str,
        hub: &HubDetails,
    ) -> Result<HashMap<String, SequenceBounds>> {
        let mut bounds = HashMap::with_capacity(hub.partition_ids.len());

        for partition_id in &hub.partition_ids {
            let body = self
                .get(
                    endpoint,
                    &[
                        hub.name.as_str(),
                        "consumergroups",
                        DEFAULT_CONSUMER_GROUP,
                        "partitions",
                        partition_id.as_str(),
                    ],
                )
                .await?;
            let partition = parse_partition_description(&body)?;

            trace!(hub = %hub.name, partition_id, ?partition, "partition bounds");
            bounds.insert(partition_id.clone(), partition);
        }

        Ok(bounds)
    }
}
