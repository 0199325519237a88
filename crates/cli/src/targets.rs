//! Maps the loaded configuration onto collector and provider types.

use std::num::NonZeroUsize;

use ehm_collector::{CollectorOptions, NamespaceTarget, StorageAccount};
use ehm_config::{AuthConfig, AuthMode, CollectorConfig, NamespaceConfig, StorageAccountConfig};
use ehm_providers::NameFilter;
use ehm_providers_azure::AzureTokenProvider;

use crate::error::Result;

pub fn namespace_targets(namespaces: &[NamespaceConfig]) -> Result<Vec<NamespaceTarget>> {
    namespaces
        .iter()
        .map(|namespace| -> Result<NamespaceTarget> {
            Ok(NamespaceTarget::new(&namespace.endpoint)
                .with_hub_filter(NameFilter::new(
                    Some(namespace.included_event_hubs.as_str()),
                    Some(namespace.excluded_event_hubs.as_str()),
                )?)
                .with_consumer_group_filter(NameFilter::new(
                    None,
                    Some(namespace.excluded_consumer_groups.as_str()),
                )?))
        })
        .collect()
}

pub fn storage_accounts(accounts: &[StorageAccountConfig]) -> Result<Vec<StorageAccount>> {
    accounts
        .iter()
        .map(|account| -> Result<StorageAccount> {
            Ok(StorageAccount::new(
                &account.endpoint,
                NameFilter::new(
                    Some(account.included_containers.as_str()),
                    Some(account.excluded_containers.as_str()),
                )?,
            ))
        })
        .collect()
}

pub fn collector_options(config: &CollectorConfig) -> Result<CollectorOptions> {
    Ok(CollectorOptions {
        concurrency: NonZeroUsize::new(config.concurrency)
            .ok_or(ehm_config::Error::InvalidConcurrency)?,
        ownership_expiry: config.ownership_expiration_duration,
    })
}

/// Credentials are validated with the configuration, so missing values only
/// surface as authentication errors on first use.
pub fn token_provider(auth: &AuthConfig) -> AzureTokenProvider {
    let value = |field: &Option<String>| field.clone().unwrap_or_default();

    match auth.mode {
        AuthMode::Default => AzureTokenProvider::from_env(),
        AuthMode::Static => AzureTokenProvider::static_token(value(&auth.token)),
        AuthMode::ClientSecret => AzureTokenProvider::client_secret(
            value(&auth.tenant_id),
            value(&auth.client_id),
            value(&auth.client_secret),
        ),
        AuthMode::ManagedIdentity => AzureTokenProvider::managed_identity(auth.client_id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use ehm_config::Config;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r#"
namespaces:
  - endpoint: orders.servicebus.windows.net
    includedEventHubs: "^orders"
    excludedEventHubs: "-test$"
    excludedConsumerGroups: "^\\$Default$"
storageAccounts:
  - endpoint: checkpoints.blob.core.windows.net
    excludedContainers: "^archive"
collector:
  concurrency: 3
  ownershipExpirationDuration: 30s
"#;

    fn config() -> Config {
        Config::from_yaml_with_env(CONFIG, Vec::new()).unwrap()
    }

    #[test]
    fn test_namespace_filters() {
        let targets = namespace_targets(&config().namespaces).unwrap();

        assert_eq!(targets.len(), 1);
        let target = &targets[0];
        assert_eq!(target.endpoint, "orders.servicebus.windows.net");
        assert!(target.hub_filter.matches("orders-eu"));
        assert!(!target.hub_filter.matches("orders-test"));
        assert!(!target.hub_filter.matches("billing"));
        assert!(target.consumer_group_filter.excludes("$Default"));
        assert!(!target.consumer_group_filter.excludes("billing"));
    }

    #[test]
    fn test_storage_account_filters() {
        let accounts = storage_accounts(&config().storage_accounts).unwrap();

        assert_eq!(accounts[0].endpoint, "checkpoints.blob.core.windows.net");
        assert!(accounts[0].filter.matches("checkpoints"));
        assert!(!accounts[0].filter.matches("archive-2024"));
    }

    #[test]
    fn test_collector_options() {
        let options = collector_options(&config().collector).unwrap();

        assert_eq!(options.concurrency.get(), 3);
        assert_eq!(options.ownership_expiry, Duration::from_secs(30));
    }
}
