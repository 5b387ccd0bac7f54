//! Cached whitelist retrieval.
//!
//! The document is re-fetched once the cached copy is older than the TTL. If
//! the fetch fails and a previous copy exists, the stale copy keeps serving
//! for another TTL before the next attempt.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::registry::{Whitelist, WhitelistError};

/// Where the coverable-contracts document comes from.
#[derive(Debug, Clone)]
pub enum WhitelistSource {
    /// Fetched over HTTP.
    Url(String),
    /// Read from a local file.
    File(PathBuf),
    /// Fixed at construction.
    Static(Arc<Whitelist>),
}

#[derive(Debug)]
struct Cached {
    whitelist: Arc<Whitelist>,
    fetched_at: Instant,
}

/// TTL cache in front of a [`WhitelistSource`].
#[derive(Debug)]
pub struct WhitelistLoader {
    source: WhitelistSource,
    client: reqwest::Client,
    ttl: Duration,
    cache: RwLock<Option<Cached>>,
}

impl WhitelistLoader {
    /// Creates a loader. Nothing is fetched until the first call to
    /// [`WhitelistLoader::current`].
    #[must_use]
    pub fn new(source: WhitelistSource, client: reqwest::Client, ttl: Duration) -> Self {
        Self {
            source,
            client,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Loader that always returns `whitelist`.
    #[must_use]
    pub fn fixed(whitelist: Whitelist) -> Self {
        Self::new(
            WhitelistSource::Static(Arc::new(whitelist)),
            reqwest::Client::new(),
            Duration::MAX,
        )
    }

    /// The current whitelist, refreshed if the cached copy expired.
    ///
    /// # Errors
    ///
    /// Returns a [`WhitelistError`] only if the fetch fails and no earlier
    /// copy is available.
    pub async fn current(&self) -> Result<Arc<Whitelist>, WhitelistError> {
        if let WhitelistSource::Static(whitelist) = &self.source {
            return Ok(Arc::clone(whitelist));
        }
        if let Some(cached) = self.cache.read().await.as_ref()
            && cached.fetched_at.elapsed() < self.ttl
        {
            return Ok(Arc::clone(&cached.whitelist));
        }

        let mut cache = self.cache.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(cached) = cache.as_ref()
            && cached.fetched_at.elapsed() < self.ttl
        {
            return Ok(Arc::clone(&cached.whitelist));
        }

        match self.fetch().await {
            Ok(whitelist) => {
                let whitelist = Arc::new(whitelist);
                tracing::info!(contracts = whitelist.len(), "whitelist refreshed");
                *cache = Some(Cached {
                    whitelist: Arc::clone(&whitelist),
                    fetched_at: Instant::now(),
                });
                Ok(whitelist)
            }
            Err(e) => match cache.as_mut() {
                Some(stale) => {
                    tracing::warn!(error = %e, "whitelist refresh failed, serving stale copy");
                    // Next attempt only after another full TTL.
                    stale.fetched_at = Instant::now();
                    Ok(Arc::clone(&stale.whitelist))
                }
                None => Err(e),
            },
        }
    }

    async fn fetch(&self) -> Result<Whitelist, WhitelistError> {
        let document = match &self.source {
            WhitelistSource::Url(url) => self
                .client
                .get(url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| WhitelistError::Fetch(e.to_string()))?
                .text()
                .await
                .map_err(|e| WhitelistError::Fetch(e.to_string()))?,
            WhitelistSource::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| WhitelistError::Fetch(format!("{}: {e}", path.display())))?,
            WhitelistSource::Static(whitelist) => return Ok(Whitelist::clone(whitelist)),
        };
        Whitelist::from_json(&document)
    }
}
