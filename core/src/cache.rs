//! Process-wide keyed cache of asynchronous query results.
//!
//! Values are stored as JSON so any serde type can share one cache. Every
//! entry carries a generation counter: a fetch records the generation it
//! started under and its result is only stored if no newer fetch, write or
//! cancellation happened in the meantime.

use crate::config::CacheConfig;
use crate::Result;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 64;

/// Hierarchical cache key, e.g. `favorites/ids/<user>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Whether `prefix` is this key or one of its ancestors
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Notification sent to cache subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// New data was stored under the key
    Updated(QueryKey),
    /// The key's data is stale and observers should refetch
    Invalidated(QueryKey),
    /// The key was dropped from the cache
    Removed(QueryKey),
}

#[derive(Debug, Default)]
struct Entry {
    data: Option<Value>,
    updated_at: Option<Instant>,
    invalidated: bool,
    fetching: bool,
    generation: u64,
    error: Option<String>,
}

/// Snapshot of one entry's status
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryStatus {
    pub has_data: bool,
    pub is_fetching: bool,
    pub is_stale: bool,
    /// Message of the last failed fetch, cleared by the next success
    pub error: Option<String>,
}

struct CacheInner {
    config: CacheConfig,
    entries: Mutex<HashMap<QueryKey, Entry>>,
    events: broadcast::Sender<CacheEvent>,
}

/// Shared query cache; clones refer to the same entries
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(CacheInner {
                config,
                entries: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Receive every subsequent [`CacheEvent`]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    fn notify(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    /// Cached data for `key`, fresh or stale
    pub fn get_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>> {
        let entries = self.inner.entries.lock();
        match entries.get(key).and_then(|entry| entry.data.as_ref()) {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }

    /// Store `value` under `key`, superseding any fetch in flight for it
    pub fn set_data<T: Serialize>(&self, key: &QueryKey, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        {
            let mut entries = self.inner.entries.lock();
            let entry = entries.entry(key.clone()).or_default();
            Self::store(entry, value);
        }
        self.notify(CacheEvent::Updated(key.clone()));
        Ok(())
    }

    /// Replace the data under `key` with `f(current)` in one step.
    ///
    /// Returns the previous value. Like [`QueryCache::set_data`], this
    /// supersedes any fetch in flight for the key.
    pub fn update_data<T, F>(&self, key: &QueryKey, f: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: FnOnce(Option<T>) -> T,
    {
        let previous = {
            let mut entries = self.inner.entries.lock();
            let entry = entries.entry(key.clone()).or_default();
            let previous: Option<T> = match &entry.data {
                Some(value) => Some(T::deserialize(value)?),
                None => None,
            };
            let next = serde_json::to_value(f(previous.clone()))?;
            Self::store(entry, next);
            previous
        };
        self.notify(CacheEvent::Updated(key.clone()));
        Ok(previous)
    }

    /// Like [`QueryCache::update_data`], but only when `key` already holds
    /// data. A removed or never-fetched key stays empty.
    ///
    /// Returns whether the entry was updated.
    pub fn update_existing<T, F>(&self, key: &QueryKey, f: F) -> Result<bool>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        {
            let mut entries = self.inner.entries.lock();
            let Some(entry) = entries.get_mut(key) else {
                return Ok(false);
            };
            let Some(current) = entry.data.as_ref() else {
                return Ok(false);
            };
            let next = serde_json::to_value(f(T::deserialize(current)?))?;
            Self::store(entry, next);
        }
        self.notify(CacheEvent::Updated(key.clone()));
        Ok(true)
    }

    fn store(entry: &mut Entry, value: Value) {
        entry.data = Some(value);
        entry.updated_at = Some(Instant::now());
        entry.invalidated = false;
        entry.fetching = false;
        entry.error = None;
        entry.generation += 1;
    }

    /// Abandon fetches in flight under `prefix`; their results will be dropped
    pub fn cancel_queries(&self, prefix: &QueryKey) {
        let mut entries = self.inner.entries.lock();
        for (key, entry) in entries.iter_mut() {
            if key.starts_with(prefix) && entry.fetching {
                entry.generation += 1;
                entry.fetching = false;
                debug!(%key, "cancelled in-flight fetch");
            }
        }
    }

    /// Mark every entry under `prefix` stale and tell subscribers.
    ///
    /// Returns the number of entries invalidated.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let keys: Vec<QueryKey> = {
            let mut entries = self.inner.entries.lock();
            entries
                .iter_mut()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, entry)| {
                    entry.invalidated = true;
                    key.clone()
                })
                .collect()
        };

        debug!(%prefix, count = keys.len(), "invalidated queries");
        let count = keys.len();
        for key in keys {
            self.notify(CacheEvent::Invalidated(key));
        }
        count
    }

    /// Drop every entry under `prefix`
    pub fn remove(&self, prefix: &QueryKey) {
        let keys: Vec<QueryKey> = {
            let mut entries = self.inner.entries.lock();
            let keys: Vec<QueryKey> = entries
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            for key in &keys {
                entries.remove(key);
            }
            keys
        };

        for key in keys {
            self.notify(CacheEvent::Removed(key));
        }
    }

    pub fn status(&self, key: &QueryKey) -> QueryStatus {
        let entries = self.inner.entries.lock();
        match entries.get(key) {
            Some(entry) => QueryStatus {
                has_data: entry.data.is_some(),
                is_fetching: entry.fetching,
                is_stale: !self.is_fresh(entry),
                error: entry.error.clone(),
            },
            None => QueryStatus {
                is_stale: true,
                ..QueryStatus::default()
            },
        }
    }

    fn is_fresh(&self, entry: &Entry) -> bool {
        match entry.updated_at {
            Some(updated_at) => {
                entry.data.is_some()
                    && !entry.invalidated
                    && updated_at.elapsed() < self.inner.config.stale_time()
            }
            None => false,
        }
    }

    /// Cached data for `key` if it is fresh, otherwise the result of a refetch
    pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.fresh_data(key)? {
            debug!(%key, "cache hit");
            return Ok(cached);
        }

        self.refetch(key, fetcher).await
    }

    fn fresh_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>> {
        let entries = self.inner.entries.lock();
        match entries.get(key) {
            Some(entry) if self.is_fresh(entry) => match &entry.data {
                Some(value) => Ok(Some(T::deserialize(value)?)),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Run `fetcher` with the retry policy and store its result.
    ///
    /// The result is returned to the caller either way, but it is only
    /// stored if nothing newer reached the key while it was in flight.
    pub async fn refetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let generation = self.begin_fetch(key);
        let result = self.fetch_with_retry(key, &fetcher).await;

        match &result {
            Ok(value) => {
                let value = serde_json::to_value(value)?;
                if self.complete_fetch(key, generation, value) {
                    self.notify(CacheEvent::Updated(key.clone()));
                }
            }
            Err(err) => self.fail_fetch(key, generation, err.to_string()),
        }

        result
    }

    fn begin_fetch(&self, key: &QueryKey) -> u64 {
        let mut entries = self.inner.entries.lock();
        let entry = entries.entry(key.clone()).or_default();
        entry.generation += 1;
        entry.fetching = true;
        entry.generation
    }

    fn complete_fetch(&self, key: &QueryKey, generation: u64, value: Value) -> bool {
        let mut entries = self.inner.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.generation == generation => {
                entry.data = Some(value);
                entry.updated_at = Some(Instant::now());
                entry.invalidated = false;
                entry.fetching = false;
                entry.error = None;
                true
            }
            _ => {
                debug!(%key, "discarding superseded fetch result");
                false
            }
        }
    }

    fn fail_fetch(&self, key: &QueryKey, generation: u64, message: String) {
        let mut entries = self.inner.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            if entry.generation == generation {
                entry.fetching = false;
                entry.error = Some(message);
            }
        }
    }

    async fn fetch_with_retry<T, F, Fut>(&self, key: &QueryKey, fetcher: &F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let config = &self.inner.config;
        let mut attempt = 0;
        loop {
            match fetcher().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < config.retry && err.is_retryable() => {
                    let delay = config.retry_delay(attempt);
                    warn!(%key, attempt, ?delay, error = %err, "fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn no_retry() -> CacheConfig {
        CacheConfig {
            retry: 0,
            ..CacheConfig::default()
        }
    }

    fn key(parts: &[&str]) -> QueryKey {
        QueryKey::new(parts.iter().copied())
    }

    #[test]
    fn test_key_prefix_matching() {
        let ids = key(&["favorites", "ids", "u1"]);
        assert!(ids.starts_with(&key(&["favorites"])));
        assert!(ids.starts_with(&ids));
        assert!(!ids.starts_with(&key(&["favorites", "list"])));
        assert_eq!(ids.to_string(), "favorites/ids/u1");
    }

    #[test]
    fn test_set_and_get() {
        let cache = QueryCache::new(no_retry());
        let k = key(&["categories"]);

        assert_eq!(cache.get_data::<Vec<String>>(&k).unwrap(), None);
        cache.set_data(&k, &vec!["Love".to_string()]).unwrap();
        assert_eq!(cache.get_data::<Vec<String>>(&k).unwrap(), Some(vec!["Love".to_string()]));
    }

    #[test]
    fn test_update_returns_previous() {
        let cache = QueryCache::new(no_retry());
        let k = key(&["counter"]);

        let previous = cache.update_data(&k, |current: Option<u32>| current.unwrap_or(0) + 1).unwrap();
        assert_eq!(previous, None);

        let previous = cache.update_data(&k, |current: Option<u32>| current.unwrap_or(0) + 1).unwrap();
        assert_eq!(previous, Some(1));
        assert_eq!(cache.get_data::<u32>(&k).unwrap(), Some(2));
    }

    #[test]
    fn test_update_existing_never_creates_entries() {
        let cache = QueryCache::new(no_retry());
        let k = key(&["counter"]);

        assert!(!cache.update_existing(&k, |n: u32| n + 1).unwrap());
        assert_eq!(cache.get_data::<u32>(&k).unwrap(), None);
        assert!(!cache.status(&k).has_data);

        cache.set_data(&k, &1u32).unwrap();
        assert!(cache.update_existing(&k, |n: u32| n + 1).unwrap());
        assert_eq!(cache.get_data::<u32>(&k).unwrap(), Some(2));

        cache.remove(&k);
        assert!(!cache.update_existing(&k, |n: u32| n + 1).unwrap());
        assert_eq!(cache.get_data::<u32>(&k).unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_serves_fresh_data_from_cache() {
        let cache = QueryCache::new(no_retry());
        let k = key(&["authors"]);
        let calls = AtomicU32::new(0);

        let fetcher = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(vec!["Seneca".to_string()]) }
        };

        cache.fetch(&k, &fetcher).await.unwrap();
        let second: Vec<String> = cache.fetch(&k, &fetcher).await.unwrap();

        assert_eq!(second, vec!["Seneca".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch_and_notifies() {
        let cache = QueryCache::new(no_retry());
        let mut events = cache.subscribe();
        let calls = AtomicU32::new(0);
        let fetcher = || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, Error>(n) }
        };

        let ids = key(&["favorites", "ids", "u1"]);
        let list = key(&["favorites", "list", "u1"]);
        cache.fetch(&ids, &fetcher).await.unwrap();
        cache.set_data(&list, &Vec::<String>::new()).unwrap();
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Updated(ids.clone()));
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Updated(list.clone()));

        assert_eq!(cache.invalidate(&key(&["favorites"])), 2);
        assert!(cache.status(&ids).is_stale);

        let mut invalidated = vec![events.recv().await.unwrap(), events.recv().await.unwrap()];
        invalidated.sort_by_key(|event| format!("{:?}", event));
        assert_eq!(
            invalidated,
            vec![CacheEvent::Invalidated(ids.clone()), CacheEvent::Invalidated(list)]
        );

        let value: u32 = cache.fetch(&ids, &fetcher).await.unwrap();
        assert_eq!(value, 1);
        assert!(!cache.status(&ids).is_stale);
    }

    #[tokio::test]
    async fn test_zero_stale_time_always_refetches() {
        let cache = QueryCache::new(CacheConfig {
            stale_time_secs: 0,
            retry: 0,
            ..CacheConfig::default()
        });
        let k = key(&["quotes"]);
        let calls = AtomicU32::new(0);
        let fetcher = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(true) }
        };

        cache.fetch(&k, &fetcher).await.unwrap();
        cache.fetch(&k, &fetcher).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_newer_write_supersedes_in_flight_fetch() {
        let cache = QueryCache::new(no_retry());
        let k = key(&["favorites", "ids", "u1"]);
        let gate = Arc::new(Notify::new());

        let fetch = {
            let cache = cache.clone();
            let k = k.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                cache
                    .refetch(&k, || {
                        let gate = gate.clone();
                        async move {
                            gate.notified().await;
                            Ok::<_, Error>(vec!["stale".to_string()])
                        }
                    })
                    .await
            })
        };

        tokio::task::yield_now().await;
        assert!(cache.status(&k).is_fetching);

        cache.set_data(&k, &vec!["fresh".to_string()]).unwrap();
        gate.notify_one();

        // The fetch still reports its own result...
        assert_eq!(fetch.await.unwrap().unwrap(), vec!["stale".to_string()]);
        // ...but the cache keeps the newer write
        assert_eq!(cache.get_data::<Vec<String>>(&k).unwrap(), Some(vec!["fresh".to_string()]));
    }

    #[tokio::test]
    async fn test_cancel_queries_drops_result() {
        let cache = QueryCache::new(no_retry());
        let k = key(&["favorites", "ids", "u1"]);
        let gate = Arc::new(Notify::new());

        let fetch = {
            let cache = cache.clone();
            let k = k.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                cache
                    .refetch(&k, || {
                        let gate = gate.clone();
                        async move {
                            gate.notified().await;
                            Ok::<_, Error>(1u32)
                        }
                    })
                    .await
            })
        };

        tokio::task::yield_now().await;
        cache.cancel_queries(&key(&["favorites"]));
        assert!(!cache.status(&k).is_fetching);

        gate.notify_one();
        fetch.await.unwrap().unwrap();
        assert_eq!(cache.get_data::<u32>(&k).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_retryable_errors_then_succeeds() {
        let cache = QueryCache::new(CacheConfig {
            retry: 3,
            retry_delay_ms: 10,
            ..CacheConfig::default()
        });
        let k = key(&["categories"]);
        let calls = AtomicU32::new(0);

        let value: u32 = cache
            .refetch(&k, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Error::RemoteReadFailed("timeout".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_configured_retries() {
        let cache = QueryCache::new(CacheConfig {
            retry: 2,
            retry_delay_ms: 10,
            ..CacheConfig::default()
        });
        let k = key(&["categories"]);
        let calls = AtomicU32::new(0);

        let result: Result<u32> = cache
            .refetch(&k, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::RemoteReadFailed("offline".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(Error::RemoteReadFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let status = cache.status(&k);
        assert!(!status.is_fetching);
        assert!(!status.has_data);
        assert!(status.error.is_some());
    }

    #[tokio::test]
    async fn test_non_retryable_errors_fail_immediately() {
        let cache = QueryCache::new(CacheConfig::default());
        let k = key(&["quote", "missing"]);
        let calls = AtomicU32::new(0);

        let result: Result<u32> = cache
            .refetch(&k, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::NotFound("missing".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_drops_entries_under_prefix() {
        let cache = QueryCache::new(no_retry());
        cache.set_data(&key(&["favorites", "ids", "u1"]), &1u32).unwrap();
        cache.set_data(&key(&["collections", "u1"]), &2u32).unwrap();

        cache.remove(&key(&["favorites"]));

        assert_eq!(cache.get_data::<u32>(&key(&["favorites", "ids", "u1"])).unwrap(), None);
        assert_eq!(cache.get_data::<u32>(&key(&["collections", "u1"])).unwrap(), Some(2));
        assert_eq!(Duration::from_secs(30), cache.config().stale_time());
    }
}
