use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use ehm_providers::{AccessToken, Error, Result, TokenProvider};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

static AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
static IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
static IMDS_API_VERSION: &str = "2018-02-01";

const STATIC_TOKEN_LIFETIME_HOURS: i64 = 24;

/// Margin before expiry at which cached tokens are refreshed.
const REFRESH_MARGIN_MINUTES: i64 = 5;

#[derive(Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(i64),
    Text(String),
}

impl Seconds {
    fn value(&self) -> Result<i64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s
                .parse()
                .map_err(|e| Error::Auth(format!("invalid token lifetime {s:?}: {e}"))),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Seconds,
}

#[derive(Clone, Debug)]
enum Credential {
    Static(String),
    ClientSecret {
        authority_host: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    ManagedIdentity {
        client_id: Option<String>,
    },
}

/// Azure AD token source with a per-scope cache.
#[derive(Clone, Debug)]
pub struct AzureTokenProvider {
    credential: Credential,
    client: reqwest::Client,
    cache: Arc<Mutex<HashMap<String, AccessToken>>>,
}

impl AzureTokenProvider {
    fn with_credential(credential: Credential) -> Self {
        Self {
            credential,
            client: reqwest::Client::new(),
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Uses a pre-acquired token for every scope.
    pub fn static_token(token: impl Into<String>) -> Self {
        Self::with_credential(Credential::Static(token.into()))
    }

    /// Service principal with a client secret.
    pub fn client_secret(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self::with_credential(Credential::ClientSecret {
            authority_host: AUTHORITY_HOST.to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    /// Managed identity of the host, optionally a user-assigned one.
    #[must_use]
    pub fn managed_identity(client_id: Option<String>) -> Self {
        Self::with_credential(Credential::ManagedIdentity { client_id })
    }

    /// Service principal from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
    /// `AZURE_CLIENT_SECRET` if all are set, otherwise managed identity.
    /// `AZURE_AUTHORITY_HOST` overrides the login endpoint.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        match (
            var("AZURE_TENANT_ID"),
            var("AZURE_CLIENT_ID"),
            var("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                debug!("using client secret credential");
                Self::with_credential(Credential::ClientSecret {
                    authority_host: var("AZURE_AUTHORITY_HOST")
                        .unwrap_or_else(|| AUTHORITY_HOST.to_string()),
                    tenant_id,
                    client_id,
                    client_secret,
                })
            }
            (_, client_id, _) => {
                debug!("using managed identity credential");
                Self::managed_identity(client_id)
            }
        }
    }

    fn cached(&self, scope: &str) -> Option<AccessToken> {
        let refresh_at = Utc::now() + Duration::minutes(REFRESH_MARGIN_MINUTES);
        self.cache
            .lock()
            .get(scope)
            .filter(|token| token.expires_on > refresh_at)
            .cloned()
    }

    async fn request(&self, scope: &str) -> Result<AccessToken> {
        let request = match &self.credential {
            Credential::Static(token) => {
                return Ok(AccessToken {
                    token: token.clone(),
                    expires_on: Utc::now() + Duration::hours(STATIC_TOKEN_LIFETIME_HOURS),
                });
            }
            Credential::ClientSecret {
                authority_host,
                tenant_id,
                client_id,
                client_secret,
            } => self
                .client
                .post(format!(
                    "{}/{tenant_id}/oauth2/v2.0/token",
                    authority_host.trim_end_matches('/')
                ))
                .form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("scope", scope),
                ]),
            Credential::ManagedIdentity { client_id } => {
                let resource = scope.trim_end_matches("/.default");
                let mut query = vec![("api-version", IMDS_API_VERSION), ("resource", resource)];
                if let Some(client_id) = client_id {
                    query.push(("client_id", client_id.as_str()));
                }
                self.client
                    .get(IMDS_TOKEN_URL)
                    .header("Metadata", "true")
                    .query(&query)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::Auth(format!("token request for {scope} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "token request for {scope} returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("invalid token response for {scope}: {e}")))?;

        Ok(AccessToken {
            token: token.access_token,
            expires_on: Utc::now() + Duration::seconds(token.expires_in.value()?),
        })
    }
}

#[async_trait]
impl TokenProvider for AzureTokenProvider {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        if let Some(token) = self.cached(scope) {
            return Ok(token);
        }

        let token = self.request(scope).await?;
        debug!(scope, expires_on = %token.expires_on, "acquired token");
        self.cache.lock().insert(scope.to_string(), token.clone());

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let provider = AzureTokenProvider::static_token("abc");

        let token = provider.get_token("https://storage.azure.com/.default").await.unwrap();

        assert_eq!(token.token, "abc");
        assert!(token.expires_on > Utc::now());
    }

    #[test]
    fn test_cache_respects_refresh_margin() {
        let provider = AzureTokenProvider::static_token("abc");
        provider.cache.lock().insert(
            "soon".to_string(),
            AccessToken {
                token: "old".to_string(),
                expires_on: Utc::now() + Duration::minutes(2),
            },
        );
        provider.cache.lock().insert(
            "later".to_string(),
            AccessToken {
                token: "fresh".to_string(),
                expires_on: Utc::now() + Duration::hours(1),
            },
        );

        assert!(provider.cached("soon").is_none());
        assert_eq!(provider.cached("later").unwrap().token, "fresh");
    }

    #[test]
    fn test_token_lifetime_formats() {
        let numeric: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":3599}"#).unwrap();
        let text: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":"86399"}"#).unwrap();

        assert_eq!(numeric.expires_in.value().unwrap(), 3599);
        assert_eq!(text.expires_in.value().unwrap(), 86399);
    }
}
