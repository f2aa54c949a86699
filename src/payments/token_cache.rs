//! Bearer token cache for gateways that issue short-lived OAuth tokens.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::payments::error::PaymentResult;

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Holds one token and refreshes it only once it has expired.
///
/// The refresh margin treats a token as expired slightly before the gateway
/// does so that a request started with it does not race the deadline.
#[derive(Debug)]
pub struct TokenCache {
    token: Mutex<Option<CachedToken>>,
    refresh_margin: Duration,
}

impl TokenCache {
    pub fn new(refresh_margin: Duration) -> Self {
        Self {
            token: Mutex::new(None),
            refresh_margin,
        }
    }

    /// Return the cached token, or call `fetch` for a new `(token, ttl)`.
    ///
    /// Concurrent callers wait on the same lock so a burst of requests after
    /// expiry triggers a single login.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> PaymentResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PaymentResult<(String, Duration)>>,
    {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.value.clone());
            }
        }

        let (value, ttl) = fetch().await?;
        let lifetime = ttl.saturating_sub(self.refresh_margin);
        debug!(ttl_secs = ttl.as_secs(), "refreshed gateway access token");
        *guard = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn fetch_counting(
        calls: &AtomicUsize,
        ttl: Duration,
    ) -> PaymentResult<(String, Duration)> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok((format!("token-{}", n), ttl))
    }

    #[tokio::test]
    async fn reuses_token_until_expiry() {
        let cache = TokenCache::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_refresh(|| fetch_counting(&calls, Duration::from_millis(200)))
            .await
            .unwrap();
        let second = cache
            .get_or_refresh(|| fetch_counting(&calls, Duration::from_millis(200)))
            .await
            .unwrap();

        assert_eq!(first, "token-1");
        assert_eq!(second, "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(250)).await;

        let third = cache
            .get_or_refresh(|| fetch_counting(&calls, Duration::from_millis(200)))
            .await
            .unwrap();
        assert_eq!(third, "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn margin_larger_than_ttl_always_refreshes() {
        let cache = TokenCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        cache
            .get_or_refresh(|| fetch_counting(&calls, Duration::from_secs(30)))
            .await
            .unwrap();
        cache
            .get_or_refresh(|| fetch_counting(&calls, Duration::from_secs(30)))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refresh() {
        let cache = TokenCache::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);
        cache
            .get_or_refresh(|| fetch_counting(&calls, Duration::from_secs(3600)))
            .await
            .unwrap();
        cache.invalidate().await;
        let token = cache
            .get_or_refresh(|| fetch_counting(&calls, Duration::from_secs(3600)))
            .await
            .unwrap();
        assert_eq!(token, "token-2");
    }
}
