//! Configuration of the exporter: YAML file, defaults and environment
//! overrides.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod duration;
mod env;
mod error;

pub use env::ENV_PREFIX;
pub use error::{Error, Result};

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "CONFIG_FILEPATH";

/// Configuration file used when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// An Event Hubs namespace to collect from.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NamespaceConfig {
    /// Fully qualified namespace host, e.g. `myns.servicebus.windows.net`.
    pub endpoint: String,

    /// Only hubs matching this pattern are collected. Empty matches all.
    pub included_event_hubs: String,

    /// Hubs matching this pattern are skipped. Empty excludes none.
    pub excluded_event_hubs: String,

    /// Consumer groups matching this pattern are skipped.
    pub excluded_consumer_groups: String,
}

/// A storage account holding checkpoint containers.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageAccountConfig {
    /// Blob service host, e.g. `myaccount.blob.core.windows.net`.
    pub endpoint: String,

    /// Only containers matching this pattern are scanned.
    pub included_containers: String,

    /// Containers matching this pattern are skipped.
    pub excluded_containers: String,
}

/// Prometheus scrape endpoint.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrometheusConfig {
    /// Whether the endpoint is served.
    pub enabled: bool,

    /// Listen address.
    pub address: String,

    /// Request timeout.
    #[serde(with = "duration::required")]
    pub read_timeout: Duration,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:8080".to_string(),
            read_timeout: Duration::from_secs(1),
        }
    }
}

/// Prometheus push gateway.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PushGatewayConfig {
    /// Whether gauges are pushed after each run.
    pub enabled: bool,

    /// Gateway base URL.
    pub base_url: String,
}

/// OTLP transport.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    /// gRPC.
    #[default]
    Grpc,

    /// HTTP with protobuf payloads.
    Http,
}

/// OpenTelemetry collector.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OtlpConfig {
    /// Whether gauges are exported.
    pub enabled: bool,

    /// Collector base URL.
    pub base_url: String,

    /// Transport.
    pub protocol: OtlpProtocol,
}

/// Application Insights.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppInsightsConfig {
    /// Whether gauges are tracked.
    pub enabled: bool,

    /// Instrumentation key of the resource.
    pub instrumentation_key: String,

    /// Ingestion endpoint; the public one when unset.
    pub ingestion_url: Option<String>,
}

/// Metric backends.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExporterConfig {
    /// Scrape endpoint.
    pub prometheus: PrometheusConfig,

    /// Push gateway.
    pub push_gateway: PushGatewayConfig,

    /// OpenTelemetry.
    pub otlp: OtlpConfig,

    /// Application Insights.
    pub app_insights: AppInsightsConfig,
}

/// Collection behavior.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollectorConfig {
    /// Age after which an ownership counts as expired.
    #[serde(with = "duration::required")]
    pub ownership_expiration_duration: Duration,

    /// Maximum number of hubs processed at once per namespace.
    pub concurrency: usize,

    /// Pause between runs. A single run when unset.
    #[serde(with = "duration::optional")]
    pub interval: Option<Duration>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            ownership_expiration_duration: Duration::from_secs(60),
            concurrency: 8,
            interval: None,
        }
    }
}

/// Log verbosity.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug and above.
    #[serde(alias = "DEBUG")]
    Debug,

    /// Info and above.
    #[default]
    #[serde(alias = "INFO")]
    Info,

    /// Warnings and errors.
    #[serde(alias = "WARN")]
    Warn,

    /// Errors only.
    #[serde(alias = "ERROR")]
    Error,
}

/// Log line format.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    #[serde(alias = "JSON")]
    Json,

    /// Human readable lines.
    #[serde(alias = "TEXT")]
    Text,
}

/// Logging.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Verbosity.
    pub level: LogLevel,

    /// Format.
    pub format: LogFormat,
}

/// How bearer tokens are acquired.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthMode {
    /// Client secret from the `AZURE_*` variables if present, else managed
    /// identity.
    #[default]
    Default,

    /// A fixed token.
    Static,

    /// Service principal with a client secret.
    ClientSecret,

    /// Managed identity of the host.
    ManagedIdentity,
}

/// Credentials.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthConfig {
    /// Token acquisition mode.
    pub mode: AuthMode,

    /// Token for [`AuthMode::Static`].
    pub token: Option<String>,

    /// Tenant for [`AuthMode::ClientSecret`].
    pub tenant_id: Option<String>,

    /// Application id for [`AuthMode::ClientSecret`], or the user-assigned
    /// identity for [`AuthMode::ManagedIdentity`].
    pub client_id: Option<String>,

    /// Secret for [`AuthMode::ClientSecret`].
    pub client_secret: Option<String>,
}

/// The full configuration.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Namespaces to collect from, in order.
    pub namespaces: Vec<NamespaceConfig>,

    /// Storage accounts holding checkpoints.
    pub storage_accounts: Vec<StorageAccountConfig>,

    /// Metric backends.
    pub exporter: ExporterConfig,

    /// Collection behavior.
    pub collector: CollectorConfig,

    /// Logging.
    pub log: LogConfig,

    /// Credentials.
    pub auth: AuthConfig,
}

impl Config {
    /// Loads `path` over the defaults and applies `EH_METRICS_*` overrides
    /// from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// result does not validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_env(path, std::env::vars())
    }

    /// Like [`Self::load`] with an explicit set of variables.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn load_with_env<I>(path: impl AsRef<Path>, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml_with_env(&text, vars)
    }

    /// Parses a YAML document over the defaults, then applies `vars`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or validate.
    pub fn from_yaml_with_env<I>(yaml: &str, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut tree = serde_yaml::to_value(Self::default())?;
        env::merge(&mut tree, serde_yaml::from_str(yaml)?);
        env::apply(&mut tree, vars);

        let config: Self = serde_yaml::from_value(tree)?;
        config.validate()?;

        Ok(config)
    }

    /// Checks patterns, endpoints and backend settings.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.collector.concurrency == 0 {
            return Err(Error::InvalidConcurrency);
        }

        for namespace in &self.namespaces {
            validate_namespace_endpoint(&namespace.endpoint)?;
            validate_pattern("includedEventHubs", &namespace.included_event_hubs)?;
            validate_pattern("excludedEventHubs", &namespace.excluded_event_hubs)?;
            validate_pattern("excludedConsumerGroups", &namespace.excluded_consumer_groups)?;
        }

        for account in &self.storage_accounts {
            validate_endpoint(&account.endpoint)?;
            validate_pattern("includedContainers", &account.included_containers)?;
            validate_pattern("excludedContainers", &account.excluded_containers)?;
        }

        let exporter = &self.exporter;
        if exporter.prometheus.enabled {
            exporter
                .prometheus
                .address
                .parse::<SocketAddr>()
                .map_err(|e| {
                    Error::Invalid(format!(
                        "prometheus address {:?}: {e}",
                        exporter.prometheus.address
                    ))
                })?;
        }
        if exporter.push_gateway.enabled {
            validate_url("pushGateway.baseUrl", &exporter.push_gateway.base_url)?;
        }
        if exporter.otlp.enabled {
            validate_url("otlp.baseUrl", &exporter.otlp.base_url)?;
        }
        if exporter.app_insights.enabled && exporter.app_insights.instrumentation_key.is_empty() {
            return Err(Error::Invalid(
                "appInsights.instrumentationKey is required".to_string(),
            ));
        }

        self.validate_auth()
    }

    fn validate_auth(&self) -> Result<()> {
        let auth = &self.auth;
        let missing = |name: &str, value: &Option<String>| {
            if value.as_deref().is_none_or(str::is_empty) {
                Err(Error::Invalid(format!("auth.{name} is required")))
            } else {
                Ok(())
            }
        };

        match auth.mode {
            AuthMode::Static => missing("token", &auth.token),
            AuthMode::ClientSecret => {
                missing("tenantId", &auth.tenant_id)?;
                missing("clientId", &auth.client_id)?;
                missing("clientSecret", &auth.client_secret)
            }
            AuthMode::Default | AuthMode::ManagedIdentity => Ok(()),
        }
    }
}

fn validate_pattern(field: &'static str, pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Ok(());
    }

    Regex::new(pattern)
        .map(|_| ())
        .map_err(|source| Error::InvalidPattern {
            field,
            pattern: pattern.to_string(),
            source,
        })
}

/// Namespace endpoints are a bare host or a URL such as
/// `sb://ns.servicebus.windows.net/`.
fn validate_namespace_endpoint(endpoint: &str) -> Result<()> {
    if !endpoint.contains("://") {
        return validate_endpoint(endpoint);
    }

    let url = Url::parse(endpoint).map_err(|_| Error::InvalidEndpoint(endpoint.to_string()))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidEndpoint(endpoint.to_string()));
    }

    Ok(())
}

/// Storage account endpoints are a bare host.
fn validate_endpoint(endpoint: &str) -> Result<()> {
    let invalid = || Error::InvalidEndpoint(endpoint.to_string());

    if endpoint.is_empty() || endpoint.contains('/') {
        return Err(invalid());
    }

    let url = Url::parse(&format!("https://{endpoint}/")).map_err(|_| invalid())?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid());
    }

    Ok(())
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| Error::Invalid(format!("{field} {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use pretty_assertions::assert_eq;

    fn no_env() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml_with_env("{}", no_env()).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.collector.concurrency, 8);
        assert_eq!(
            config.collector.ownership_expiration_duration,
            Duration::from_secs(60)
        );
        assert_eq!(config.collector.interval, None);
        assert_eq!(config.exporter.prometheus.address, "0.0.0.0:8080");
        assert_eq!(config.exporter.otlp.protocol, OtlpProtocol::Grpc);
        assert_eq!(config.log.level, LogLevel::Info);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
namespaces:
  - endpoint: myns.servicebus.windows.net
    includedEventHubs: "^orders"
    excludedConsumerGroups: "^\\$Default$"
storageAccounts:
  - endpoint: mystorage.blob.core.windows.net
exporter:
  prometheus:
    enabled: true
    readTimeout: 5s
  pushGateway:
    enabled: true
    baseUrl: http://gateway:9091
collector:
  ownershipExpirationDuration: 2m
  concurrency: 2
  interval: 5m
log:
  level: DEBUG
  format: text
"#
        )
        .unwrap();

        let config = Config::load_with_env(file.path(), no_env()).unwrap();

        assert_eq!(config.namespaces.len(), 1);
        assert_eq!(config.namespaces[0].included_event_hubs, "^orders");
        assert_eq!(config.namespaces[0].excluded_consumer_groups, "^\\$Default$");
        assert_eq!(config.namespaces[0].excluded_event_hubs, "");
        assert_eq!(
            config.storage_accounts[0].endpoint,
            "mystorage.blob.core.windows.net"
        );
        assert!(config.exporter.prometheus.enabled);
        assert_eq!(config.exporter.prometheus.address, "0.0.0.0:8080");
        assert_eq!(config.exporter.prometheus.read_timeout, Duration::from_secs(5));
        assert_eq!(
            config.collector.ownership_expiration_duration,
            Duration::from_secs(120)
        );
        assert_eq!(config.collector.concurrency, 2);
        assert_eq!(config.collector.interval, Some(Duration::from_secs(300)));
        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn test_env_overrides_file() {
        let config = Config::from_yaml_with_env(
            "collector:\n  concurrency: 2\n",
            vec![
                ("EH_METRICS_COLLECTOR_CONCURRENCY".to_string(), "16".to_string()),
                ("EH_METRICS_COLLECTOR_INTERVAL".to_string(), "30s".to_string()),
                ("EH_METRICS_LOG_LEVEL".to_string(), "warn".to_string()),
            ],
        )
        .unwrap();

        assert_eq!(config.collector.concurrency, 16);
        assert_eq!(config.collector.interval, Some(Duration::from_secs(30)));
        assert_eq!(config.log.level, LogLevel::Warn);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load_with_env("/nonexistent/config.yaml", no_env());
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = Config::from_yaml_with_env(
            "namespaces:\n  - endpoint: ns.servicebus.windows.net\n    excludedEventHubs: '(unclosed'\n",
            no_env(),
        );

        assert!(matches!(
            result,
            Err(Error::InvalidPattern {
                field: "excludedEventHubs",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_concurrency() {
        let result = Config::from_yaml_with_env("collector: {concurrency: 0}", no_env());
        assert!(matches!(result, Err(Error::InvalidConcurrency)));
    }

    #[test]
    fn test_invalid_endpoints() {
        for endpoint in ["", "bad host", "sb:///orders", "ns.servicebus.windows.net/orders"] {
            let yaml = format!("namespaces:\n  - endpoint: '{endpoint}'\n");
            let result = Config::from_yaml_with_env(&yaml, no_env());
            assert!(
                matches!(result, Err(Error::InvalidEndpoint(_))),
                "{endpoint:?} accepted"
            );
        }
    }

    #[test]
    fn test_namespace_endpoint_as_url() {
        for endpoint in [
            "sb://ns.servicebus.windows.net/",
            "https://ns.servicebus.windows.net",
            "ns.servicebus.windows.net",
        ] {
            let yaml = format!("namespaces:\n  - endpoint: '{endpoint}'\n");
            let config = Config::from_yaml_with_env(&yaml, no_env());
            assert!(config.is_ok(), "{endpoint:?} rejected");
        }
    }

    #[test]
    fn test_storage_endpoint_must_be_host() {
        let yaml = "storageAccounts:\n  - endpoint: 'https://account.blob.core.windows.net'\n";

        let result = Config::from_yaml_with_env(yaml, no_env());

        assert!(matches!(result, Err(Error::InvalidEndpoint(_))));
    }

    #[test]
    fn test_invalid_duration() {
        let result =
            Config::from_yaml_with_env("collector: {ownershipExpirationDuration: soon}", no_env());
        assert!(matches!(result, Err(Error::Yaml(_))));
    }

    #[test]
    fn test_enabled_push_gateway_requires_url() {
        let result =
            Config::from_yaml_with_env("exporter: {pushGateway: {enabled: true}}", no_env());
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn test_client_secret_requires_credentials() {
        let result = Config::from_yaml_with_env(
            "auth: {mode: clientSecret, tenantId: t, clientId: c}",
            no_env(),
        );
        assert!(matches!(result, Err(Error::Invalid(_))));

        let config = Config::from_yaml_with_env(
            "auth: {mode: clientSecret, tenantId: t, clientId: c, clientSecret: s}",
            no_env(),
        )
        .unwrap();
        assert_eq!(config.auth.mode, AuthMode::ClientSecret);
    }
}
