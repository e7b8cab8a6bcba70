use crate::error::{clip_details, BackendError};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

/// How a bearer token is obtained for the remote services.
#[derive(Debug, Clone, Default)]
pub enum TokenSource {
    /// No auth header at all (local emulators, test doubles).
    #[default]
    None,
    /// A fixed token from the environment or CLI.
    Static(String),
    /// A token URL returning `{"access_token", "expires_in"}`, fetched
    /// just-in-time and cached until shortly before expiry.
    Url(String),
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenReply {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Shared token provider. Refresh is guarded by an async mutex so that
/// concurrent first uses fetch exactly once.
pub struct TokenProvider {
    source: TokenSource,
    client: Client,
    cache: Mutex<Option<CachedToken>>,
}

// Refresh this long before the advertised expiry.
const EXPIRY_SKEW_SECONDS: i64 = 60;
const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 300;

impl TokenProvider {
    pub fn new(source: TokenSource, client: Client) -> Self {
        Self {
            source,
            client,
            cache: Mutex::new(None),
        }
    }

    /// Provider that never attaches a token, for unauthenticated backends.
    pub fn anonymous() -> Self {
        Self::new(TokenSource::None, Client::new())
    }

    pub async fn bearer_token(&self) -> Result<Option<String>, BackendError> {
        let url = match &self.source {
            TokenSource::None => return Ok(None),
            TokenSource::Static(token) => return Ok(Some(token.clone())),
            TokenSource::Url(url) => url,
        };

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(Some(cached.token.clone()));
            }
        }

        let fetched = self.fetch_token(url).await?;
        debug!(expires_at = %fetched.expires_at, "refreshed bearer token");
        let token = fetched.token.clone();
        *cache = Some(fetched);
        Ok(Some(token))
    }

    async fn fetch_token(&self, url: &str) -> Result<CachedToken, BackendError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| BackendError::Auth(error.to_string()))?;
        let status = response.status();
        let payload = response
            .text()
            .await
            .map_err(|error| BackendError::Auth(error.to_string()))?;
        if !status.is_success() {
            return Err(BackendError::Auth(format!(
                "token url returned {status}: {}",
                clip_details(&payload)
            )));
        }

        let reply: TokenReply = serde_json::from_str(&payload)
            .map_err(|error| BackendError::Auth(format!("bad token reply: {error}")))?;
        let lifetime = reply
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECONDS)
            .max(EXPIRY_SKEW_SECONDS + 1);
        Ok(CachedToken {
            token: reply.access_token,
            expires_at: Utc::now() + Duration::seconds(lifetime - EXPIRY_SKEW_SECONDS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_source_yields_no_header() {
        let provider = TokenProvider::new(TokenSource::None, Client::new());
        assert_eq!(provider.bearer_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn static_source_passes_the_token_through() {
        let provider = TokenProvider::new(TokenSource::Static("sekrit".to_string()), Client::new());
        assert_eq!(
            provider.bearer_token().await.unwrap().as_deref(),
            Some("sekrit")
        );
    }

    #[test]
    fn token_reply_tolerates_missing_expiry() {
        let reply: TokenReply = serde_json::from_str(r#"{"access_token": "abc"}"#).unwrap();
        assert_eq!(reply.access_token, "abc");
        assert_eq!(reply.expires_in, None);
    }
}
