use std::collections::HashMap;

use ehm_providers::{HubDetails, HubDirectory, NameFilter, SequenceBounds};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::cancellable;
use crate::error::{Error, Result};

/// Host of a namespace endpoint given either as a bare host
/// (`myns.servicebus.windows.net`) or as a URL (`sb://myns.servicebus.windows.net/`).
///
/// The host keeps its configured casing; lookups that must ignore case
/// lowercase on their side.
pub(crate) fn endpoint_host(endpoint: &str) -> Result<String> {
    let invalid = || Error::InvalidEndpoint(endpoint.to_string());

    let url = if endpoint.contains("://") {
        Url::parse(endpoint)
    } else {
        Url::parse(&format!("sb://{endpoint}"))
    }
    .map_err(|_| invalid())?;

    url.host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .ok_or_else(invalid)
}

/// Namespace name of an endpoint: the first DNS label of its host.
///
/// Endpoints sharing a first label report under the same name.
///
/// # Errors
///
/// Returns [`Error::InvalidEndpoint`] when the endpoint has no host.
pub fn resolve_namespace(endpoint: &str) -> Result<String> {
    let host = endpoint_host(endpoint)?;

    host.split('.')
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidEndpoint(endpoint.to_string()))
}

/// Lists hubs, consumer groups and partition bounds of a namespace.
#[derive(Clone, Debug)]
pub struct Walker<H> {
    directory: H,
}

impl<H> Walker<H>
where
    H: HubDirectory,
{
    /// Creates a walker over `directory`.
    pub const fn new(directory: H) -> Self {
        Self { directory }
    }

    /// Lists the hubs of `endpoint` that pass `filter`.
    ///
    /// # Errors
    ///
    /// Propagates provider errors and cancellation.
    pub async fn list_hubs(
        &self,
        endpoint: &str,
        filter: &NameFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<HubDetails>> {
        let hubs = cancellable(cancel, self.directory.list_hubs(endpoint)).await?;

        Ok(hubs
            .into_iter()
            .filter(|hub| {
                let keep = filter.matches(&hub.name);
                if !keep {
                    debug!(
                        endpoint,
                        hub = %hub.name,
                        include = ?filter.include_pattern(),
                        exclude = ?filter.exclude_pattern(),
                        "skipping event hub"
                    );
                }
                keep
            })
            .collect())
    }

    /// Lists the consumer groups of `hub`.
    ///
    /// # Errors
    ///
    /// Propagates provider errors and cancellation.
    pub async fn list_consumer_groups(
        &self,
        endpoint: &str,
        hub: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        cancellable(cancel, self.directory.list_consumer_groups(endpoint, hub)).await
    }

    /// Fetches the current bounds of every partition of `hub`. Bounds move
    /// between runs, so callers fetch them again on every run.
    ///
    /// # Errors
    ///
    /// Propagates provider errors and cancellation.
    pub async fn sequence_bounds(
        &self,
        endpoint: &str,
        hub: &HubDetails,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, SequenceBounds>> {
        cancellable(cancel, self.directory.sequence_bounds(endpoint, hub)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ehm_providers_memory::MemoryHubDirectory;
    use tracing_test::traced_test;

    const ENDPOINT: &str = "myns.servicebus.windows.net";

    #[test]
    fn test_resolve_namespace() {
        assert_eq!(resolve_namespace(ENDPOINT).unwrap(), "myns");
        assert_eq!(resolve_namespace("localhost:5672").unwrap(), "localhost");
    }

    #[test]
    fn test_resolve_namespace_keeps_casing() {
        assert_eq!(
            resolve_namespace("sb://MyNs.servicebus.windows.net/").unwrap(),
            "MyNs"
        );
        assert_eq!(
            resolve_namespace("MyNs.servicebus.windows.net").unwrap(),
            "MyNs"
        );
        assert_eq!(
            endpoint_host("sb://MyNs.servicebus.windows.net/").unwrap(),
            "MyNs.servicebus.windows.net"
        );
    }

    #[test]
    fn test_resolve_namespace_shared_label() {
        assert_eq!(
            resolve_namespace("orders.servicebus.windows.net").unwrap(),
            resolve_namespace("orders.servicebus.chinacloudapi.cn").unwrap()
        );
    }

    #[test]
    fn test_resolve_namespace_without_host() {
        assert!(matches!(
            resolve_namespace(""),
            Err(Error::InvalidEndpoint(_))
        ));
        assert!(matches!(
            resolve_namespace("file:///tmp/x"),
            Err(Error::InvalidEndpoint(_))
        ));
    }

    async fn directory() -> MemoryHubDirectory {
        let directory = MemoryHubDirectory::new();
        for name in ["orders", "orders-test", "billing"] {
            directory
                .add_hub(
                    ENDPOINT,
                    HubDetails {
                        name: name.to_string(),
                        ..HubDetails::default()
                    },
                    ["$Default"],
                    HashMap::from([("0".to_string(), SequenceBounds::new(0, 10))]),
                )
                .await;
        }
        directory
    }

    #[tokio::test]
    #[traced_test]
    async fn test_list_hubs_filtered() {
        let walker = Walker::new(directory().await);
        let filter = NameFilter::new(Some("^orders"), Some("-test$")).unwrap();

        let hubs = walker
            .list_hubs(ENDPOINT, &filter, &CancellationToken::new())
            .await
            .unwrap();

        let names: Vec<_> = hubs.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["orders"]);
        assert!(logs_contain("skipping event hub"));
        assert!(logs_contain("-test$"));
    }

    #[tokio::test]
    async fn test_bounds_fetched_on_every_call() {
        let directory = directory().await;
        let walker = Walker::new(directory.clone());
        let cancel = CancellationToken::new();
        let hub = HubDetails {
            name: "billing".to_string(),
            ..HubDetails::default()
        };

        walker.sequence_bounds(ENDPOINT, &hub, &cancel).await.unwrap();
        directory.fail(ENDPOINT, Some("billing")).await;

        assert!(walker.sequence_bounds(ENDPOINT, &hub, &cancel).await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_walk() {
        let walker = Walker::new(directory().await);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = walker
            .list_consumer_groups(ENDPOINT, "orders", &cancel)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
