use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::RequestBuilder;
use serde::Deserialize;
use tracing::debug;

/// Tokens are treated as expired this long before the provider says so.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_LIFETIME_SECS: u64 = 3600;
/// Longer lifetimes are cut to this; `Instant` arithmetic overflows on huge values.
const MAX_LIFETIME_SECS: u64 = 365 * 24 * 3600;

#[derive(Debug, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Clone, Debug)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Client-credentials bearer token, owned by exactly one API client.
///
/// The lock only guards the read and the replacement; it is never held
/// while a refresh is in flight, so two callers racing past an expired
/// token may both refresh. The later one wins.
#[derive(Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, now: Instant) -> Option<String> {
        let guard = self.slot.lock();
        guard
            .as_ref()
            .filter(|cached| now + SAFETY_MARGIN < cached.expires_at)
            .map(|cached| cached.token.clone())
    }

    pub fn store(&self, token: &AccessToken, now: Instant) {
        let secs = token
            .expires_in
            .unwrap_or(DEFAULT_LIFETIME_SECS)
            .min(MAX_LIFETIME_SECS);
        let expires_at = now.checked_add(Duration::from_secs(secs)).unwrap_or(now);
        *self.slot.lock() = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at,
        });
    }

    pub async fn bearer<F, Fut>(&self, refresh: F) -> Result<String, String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, String>>,
    {
        if let Some(token) = self.current(Instant::now()) {
            return Ok(token);
        }
        debug!("Refreshing client-credentials token");
        let fresh = refresh().await?;
        self.store(&fresh, Instant::now());
        Ok(fresh.access_token)
    }
}

pub async fn request_token(request: RequestBuilder) -> Result<AccessToken, String> {
    let response = request.send().await.map_err(|err| err.to_string())?;
    if !response.status().is_success() {
        return Err(format!("token endpoint returned http {}", response.status()));
    }
    response
        .json::<AccessToken>()
        .await
        .map_err(|err| format!("invalid token response: {}", err))
}
