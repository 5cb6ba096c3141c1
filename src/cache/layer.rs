//! Cache layer that orchestrates caching logic with network fetching.

use std::future::Future;
use tokio::sync::Mutex;

use super::storage::CacheStorage;
use super::traits::{CacheResult, Cacheable};
use crate::error::CacheError;

/// Cache layer that manages caching logic and network fetching.
///
/// The collection is either cached as a whole (warm) or not at all (cold).
/// Cold fetches and refreshes run under a single-flight guard so concurrent
/// callers share one upstream fetch instead of racing on the file.
pub struct CacheLayer<S: CacheStorage> {
  storage: S,
  inflight: Mutex<()>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage,
      inflight: Mutex::new(()),
    }
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Fetch the collection with a cache-first strategy.
  ///
  /// 1. Check cache - if warm, return immediately
  /// 2. Otherwise wait for the single-flight guard and check again, since
  ///    another caller may have filled the cache meanwhile
  /// 3. Fetch from network and persist the whole collection
  ///
  /// A failed fetch leaves the cache untouched.
  pub async fn fetch_collection<T, E, F, Fut>(&self, fetcher: F) -> Result<CacheResult<Vec<T>>, E>
  where
    T: Cacheable,
    E: From<CacheError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
  {
    if let Some(cached) = self.storage.read::<T>()? {
      return Ok(CacheResult::from_cache(cached.entities, cached.cached_at));
    }

    let _guard = self.inflight.lock().await;

    if let Some(cached) = self.storage.read::<T>()? {
      tracing::debug!(entity = T::entity_type(), "cache filled by concurrent fetch");
      return Ok(CacheResult::from_cache(cached.entities, cached.cached_at));
    }

    tracing::info!(entity = T::entity_type(), "cache cold, fetching from upstream");
    let data = fetcher().await?;
    self.storage.write(&data)?;
    Ok(CacheResult::from_network(data))
  }

  /// Invalidate the cache and repopulate it unconditionally.
  pub async fn refresh<T, E, F, Fut>(&self, fetcher: F) -> Result<CacheResult<Vec<T>>, E>
  where
    T: Cacheable,
    E: From<CacheError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
  {
    let _guard = self.inflight.lock().await;

    self.storage.invalidate()?;
    tracing::info!(entity = T::entity_type(), "cache invalidated, refreshing");

    let data = fetcher().await?;
    self.storage.write(&data)?;
    Ok(CacheResult::from_network(data))
  }

  /// Look up a single entity in a warm cache.
  ///
  /// Returns `None` when the cache is cold or holds no entity with `key`.
  pub fn find<T: Cacheable>(&self, key: &str) -> Result<Option<CacheResult<T>>, CacheError> {
    let Some(cached) = self.storage.read::<T>()? else {
      return Ok(None);
    };

    let cached_at = cached.cached_at;
    Ok(
      cached
        .entities
        .into_iter()
        .find(|e| e.cache_key() == key)
        .map(|e| CacheResult::from_cache(e, cached_at)),
    )
  }
}
