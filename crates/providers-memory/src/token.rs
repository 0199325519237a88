use async_trait::async_trait;
use chrono::{Duration, Utc};
use ehm_providers::{AccessToken, Error, Result, TokenProvider};

/// Token provider that hands out a fixed token, or always fails.
#[derive(Clone, Debug)]
pub struct MemoryTokenProvider {
    token: Option<String>,
}

impl MemoryTokenProvider {
    /// Provider returning `token` for every scope.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Provider whose every call fails with an auth error.
    #[must_use]
    pub const fn failing() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenProvider for MemoryTokenProvider {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        self.token.as_ref().map_or_else(
            || Err(Error::Auth(format!("no credential for scope {scope}"))),
            |token| {
                Ok(AccessToken {
                    token: token.clone(),
                    expires_on: Utc::now() + Duration::hours(1),
                })
            },
        )
    }
}
