//! Access-token caching for the bank-data provider.
//!
//! Tokens are cached with their expiry and refreshed proactively shortly
//! before they lapse, rather than being fetched once and reused for the
//! lifetime of the process.

use std::sync::Arc;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use super::ProviderError;

/// How long before expiry a cached token is considered stale.
const REFRESH_LEEWAY: Duration = Duration::seconds(60);

/// An access token and when it stops being valid.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    /// The bearer token value.
    pub secret: String,
    /// The instant the provider will stop accepting the token.
    pub expires_at: OffsetDateTime,
}

/// Exchanges long-lived credentials for a short-lived access token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Fetch a fresh token from the provider.
    async fn fetch_token(&self) -> Result<AccessToken, ProviderError>;
}

/// Caches the current access token and refreshes it near expiry.
pub struct TokenProvider {
    source: Arc<dyn TokenSource>,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenProvider {
    /// Create a provider that fetches tokens from `source` on demand.
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    /// Return a token valid for at least [REFRESH_LEEWAY] from `now`.
    ///
    /// # Errors
    /// Propagates the [ProviderError] from the underlying fetch when the
    /// cache is empty or stale and the refresh fails.
    pub async fn token(&self, now: OffsetDateTime) -> Result<String, ProviderError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref()
            && token.expires_at - REFRESH_LEEWAY > now
        {
            return Ok(token.secret.clone());
        }

        let token = self.source.fetch_token().await?;
        let secret = token.secret.clone();
        *cached = Some(token);

        Ok(secret)
    }
}
