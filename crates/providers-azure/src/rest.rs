use ehm_providers::{Error, Result, TokenProvider};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use tracing::debug;
use url::Url;

/// Version header sent to the storage service.
pub const STORAGE_API_VERSION: &str = "2020-12-06";

/// Authenticated GET requests returning XML documents.
#[derive(Clone, Debug)]
pub(crate) struct RestClient<T> {
    http: reqwest::Client,
    tokens: T,
    scheme: &'static str,
}

impl<T> RestClient<T>
where
    T: TokenProvider,
{
    pub(crate) fn new(tokens: T) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            scheme: "https",
        }
    }

    pub(crate) const fn with_scheme(mut self, scheme: &'static str) -> Self {
        self.scheme = scheme;
        self
    }

    /// Base URL of an endpoint host, e.g. `https://ns.servicebus.windows.net/`.
    pub(crate) fn url(&self, endpoint: &str, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}://{endpoint}/", self.scheme))
            .map_err(|e| Error::Transport(format!("invalid endpoint {endpoint:?}: {e}")))?;

        url.path_segments_mut()
            .map_err(|()| Error::Transport(format!("invalid endpoint {endpoint:?}")))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    pub(crate) async fn get(&self, url: Url, scope: &str) -> Result<String> {
        let token = self.tokens.get_token(scope).await?;

        debug!(%url, "requesting");

        let response = self
            .http
            .get(url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token.token))
            .header("x-ms-version", STORAGE_API_VERSION)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%url, %status, body, "request failed");

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Error::Auth(format!("request to {url} returned {status}"))
                }
                _ => Error::Transport(format!("request to {url} returned {status}")),
            });
        }

        response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("failed to read response of {url}: {e}")))
    }
}
