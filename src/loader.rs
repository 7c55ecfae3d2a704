//! Batch Cache Loader
//!
//! Cache-aside loading for a batch of items:
//!
//! ```text
//! values ─▶ mget ─▶ all hit? ──yes──▶ return hits
//!                      │ no
//!                      ▼
//!              fetch(missed) ─▶ mset(fetched, ttl) ─▶ merge + reorder
//! ```
//!
//! The loader keeps no state between calls. Cache and fetch errors reach the
//! caller untouched; the only substitution it makes is treating an
//! undecodable cached value as a miss.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::CacheClient;
use crate::config::LoaderConfig;
use crate::error::{Error, Result};

/// One batch to load: the inputs, how to key them, and the expiry for refills.
pub struct BatchRequest<'a, T, U> {
    /// Inputs in the order results must come back in
    pub values: &'a [T],
    /// Logical key of an input
    pub value_key: &'a (dyn Fn(&T) -> String + Send + Sync),
    /// Logical key of a loaded value; must equal `value_key` of its input
    pub result_key: &'a (dyn Fn(&U) -> String + Send + Sync),
    /// Expiry for values written back to the cache
    pub ttl_seconds: u64,
}

/// Load `request.values` through `cache`, fetching misses with `fetch`.
///
/// Returns one slot per input, in input order; `None` where neither the cache
/// nor the fetch produced a value.
pub async fn batch_cache_fill<T, U, F, Fut, E>(
    cache: &dyn CacheClient,
    request: BatchRequest<'_, T, U>,
    fetch: F,
) -> std::result::Result<Vec<Option<U>>, E>
where
    T: Clone,
    U: Serialize + DeserializeOwned + Clone,
    F: FnOnce(Vec<T>) -> Fut,
    Fut: Future<Output = std::result::Result<Vec<U>, E>>,
    E: From<Error>,
{
    let BatchRequest {
        values,
        value_key,
        result_key,
        ttl_seconds,
    } = request;

    if values.is_empty() {
        return Ok(Vec::new());
    }

    // Phase 1: batched lookup
    let cached: Vec<Option<U>> = lookup(cache, values, value_key).await?;
    let hit_count = cached.iter().filter(|v| v.is_some()).count();

    // Phase 2: everything came from cache
    if hit_count == values.len() {
        debug!(requested = values.len(), "All values served from cache");
        return Ok(cached);
    }

    let hits: Vec<U> = cached.into_iter().flatten().collect();

    // Phase 3: fetch what the cache did not have
    let hit_keys: HashSet<String> = hits.iter().map(result_key).collect();
    let missed: Vec<T> = values
        .iter()
        .filter(|v| !hit_keys.contains(&value_key(*v)))
        .cloned()
        .collect();

    debug!(
        requested = values.len(),
        hits = hits.len(),
        missed = missed.len(),
        "Cache lookup complete"
    );

    let fetched: Vec<U> = if missed.is_empty() {
        Vec::new()
    } else {
        fetch(missed).await?
    };

    // Phase 4: write fetched values back
    repopulate(cache, &fetched, result_key, ttl_seconds).await?;

    // Phase 5: merge and restore input order. Hits are indexed after fetched
    // values so they win on an equal key.
    let mut by_key: HashMap<String, U> = HashMap::with_capacity(fetched.len() + hits.len());
    for value in fetched.into_iter().chain(hits) {
        by_key.insert(cache.derive_key(&result_key(&value)), value);
    }

    Ok(values
        .iter()
        .map(|v| by_key.get(&cache.derive_key(&value_key(v))).cloned())
        .collect())
}

async fn lookup<T, U>(
    cache: &dyn CacheClient,
    values: &[T],
    value_key: &(dyn Fn(&T) -> String + Send + Sync),
) -> Result<Vec<Option<U>>>
where
    U: DeserializeOwned,
{
    let keys: Vec<String> = values
        .iter()
        .map(|v| cache.derive_key(&value_key(v)))
        .collect();

    let raw = cache.mget(&keys).await?;
    if raw.len() != keys.len() {
        warn!(
            requested = keys.len(),
            returned = raw.len(),
            "mget returned a different number of values than requested"
        );
    }

    let mut raw = raw.into_iter();
    Ok(keys
        .iter()
        .map(|key| raw.next().flatten().and_then(|text| decode(key, &text)))
        .collect())
}

/// Decode a cached value; a malformed entry counts as a miss.
fn decode<U: DeserializeOwned>(key: &str, text: &str) -> Option<U> {
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            let err = Error::MalformedEntry {
                key: key.to_string(),
                reason: e.to_string(),
            };
            debug!(error = %err, "Treating cache entry as a miss");
            None
        }
    }
}

async fn repopulate<U: Serialize>(
    cache: &dyn CacheClient,
    fetched: &[U],
    result_key: &(dyn Fn(&U) -> String + Send + Sync),
    ttl_seconds: u64,
) -> Result<()> {
    let mut entries = BTreeMap::new();
    for value in fetched {
        let logical_key = result_key(value);
        match serde_json::to_string(value) {
            Ok(text) => {
                entries.insert(cache.derive_key(&logical_key), text);
            }
            Err(e) => {
                let err = Error::from(e);
                warn!(key = %logical_key, error = %err, "Skipping cache write for unserializable value");
            }
        }
    }

    if entries.is_empty() {
        return Ok(());
    }

    debug!(entries = entries.len(), ttl_seconds, "Repopulating cache");
    cache.mset(&entries, ttl_seconds).await
}

/// Batch loader bound to a cache client and a default expiry.
#[derive(Clone)]
pub struct BatchCacheLoader {
    cache: Arc<dyn CacheClient>,
    config: LoaderConfig,
}

impl BatchCacheLoader {
    /// Create a loader with the default configuration
    pub fn new(cache: Arc<dyn CacheClient>) -> Self {
        Self::with_config(cache, LoaderConfig::default())
    }

    pub fn with_config(cache: Arc<dyn CacheClient>, config: LoaderConfig) -> Self {
        Self { cache, config }
    }

    pub fn cache(&self) -> &Arc<dyn CacheClient> {
        &self.cache
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load `values` using the configured expiry.
    pub async fn load<T, U, F, Fut, E>(
        &self,
        values: &[T],
        value_key: &(dyn Fn(&T) -> String + Send + Sync),
        result_key: &(dyn Fn(&U) -> String + Send + Sync),
        fetch: F,
    ) -> std::result::Result<Vec<Option<U>>, E>
    where
        T: Clone,
        U: Serialize + DeserializeOwned + Clone,
        F: FnOnce(Vec<T>) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<U>, E>>,
        E: From<Error>,
    {
        self.load_with_ttl(values, value_key, result_key, self.config.ttl_seconds, fetch)
            .await
    }

    /// Load `values`, writing refills with `ttl_seconds`.
    pub async fn load_with_ttl<T, U, F, Fut, E>(
        &self,
        values: &[T],
        value_key: &(dyn Fn(&T) -> String + Send + Sync),
        result_key: &(dyn Fn(&U) -> String + Send + Sync),
        ttl_seconds: u64,
        fetch: F,
    ) -> std::result::Result<Vec<Option<U>>, E>
    where
        T: Clone,
        U: Serialize + DeserializeOwned + Clone,
        F: FnOnce(Vec<T>) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<U>, E>>,
        E: From<Error>,
    {
        let request = BatchRequest {
            values,
            value_key,
            result_key,
            ttl_seconds,
        };
        batch_cache_fill(self.cache.as_ref(), request, fetch).await
    }
}

impl std::fmt::Debug for BatchCacheLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCacheLoader")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEndpoint, InMemoryEndpoint, SetOptions, SplitCacheClient};
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        key: String,
        val: u32,
    }

    fn item(key: &str, val: u32) -> Item {
        Item {
            key: key.to_string(),
            val,
        }
    }

    fn input_key(s: &String) -> String {
        s.clone()
    }

    fn item_key(i: &Item) -> String {
        i.key.clone()
    }

    fn setup() -> (Arc<InMemoryEndpoint>, BatchCacheLoader) {
        let endpoint = Arc::new(InMemoryEndpoint::new());
        let client = Arc::new(SplitCacheClient::single(endpoint.clone()));
        (endpoint, BatchCacheLoader::new(client))
    }

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Backing source that numbers keys by their first byte and records calls.
    #[derive(Default)]
    struct Source {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl Source {
        async fn fetch(&self, missed: Vec<String>) -> Result<Vec<Item>> {
            self.calls.lock().push(missed.clone());
            Ok(missed
                .iter()
                .map(|k| item(k, k.as_bytes()[0] as u32))
                .collect())
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().clone()
        }
    }

    #[tokio::test]
    async fn test_empty_input_does_no_io() {
        let (endpoint, loader) = setup();
        let source = Source::default();
        let inputs: Vec<String> = Vec::new();

        let result: Vec<Option<Item>> = loader
            .load(&inputs, &input_key, &item_key, |m| source.fetch(m))
            .await
            .unwrap();

        assert!(result.is_empty());
        assert!(source.calls().is_empty());
        assert_eq!(endpoint.stats().reads, 0);
    }

    #[tokio::test]
    async fn test_cold_cache_fetches_all_and_repopulates() {
        let (endpoint, loader) = setup();
        let source = Source::default();
        let inputs = keys(&["a", "b"]);

        let result = loader
            .load(&inputs, &input_key, &item_key, |m| source.fetch(m))
            .await
            .unwrap();

        assert_eq!(result, vec![Some(item("a", 97)), Some(item("b", 98))]);
        assert_eq!(source.calls(), vec![keys(&["a", "b"])]);
        assert_eq!(endpoint.len(), 2);
        assert_eq!(endpoint.stats().transactions, 1);
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let (endpoint, loader) = setup();
        let inputs = keys(&["a", "b"]);

        let first = loader
            .load(&inputs, &input_key, &item_key, |_| async {
                Ok::<_, Error>(vec![item("a", 1), item("b", 2)])
            })
            .await
            .unwrap();

        let fetches = Mutex::new(0u32);
        let second = loader
            .load(&inputs, &input_key, &item_key, |_| async {
                *fetches.lock() += 1;
                Ok::<_, Error>(vec![])
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            second.iter().map(|v| v.as_ref().map(|i| i.val)).collect::<Vec<_>>(),
            vec![Some(1), Some(2)]
        );
        assert_eq!(*fetches.lock(), 0);
        assert_eq!(endpoint.stats().transactions, 1);
    }

    #[tokio::test]
    async fn test_only_misses_are_fetched() {
        let (_, loader) = setup();
        let cache = loader.cache().clone();
        cache
            .set(
                &cache.derive_key("b"),
                &serde_json::to_string(&item("b", 2)).unwrap(),
                SetOptions::persistent(),
            )
            .await
            .unwrap();

        let source = Source::default();
        let inputs = keys(&["a", "b", "c"]);
        let result = loader
            .load(&inputs, &input_key, &item_key, |m| source.fetch(m))
            .await
            .unwrap();

        assert_eq!(source.calls(), vec![keys(&["a", "c"])]);
        assert_eq!(
            result,
            vec![Some(item("a", 97)), Some(item("b", 2)), Some(item("c", 99))]
        );
    }

    #[tokio::test]
    async fn test_order_follows_input_not_fetch() {
        let (_, loader) = setup();
        let inputs = keys(&["x", "y", "z"]);

        // Backing source answers in reverse order.
        let result = loader
            .load(&inputs, &input_key, &item_key, |missed| async move {
                Ok::<_, Error>(
                    missed
                        .iter()
                        .rev()
                        .enumerate()
                        .map(|(i, k)| item(k, i as u32))
                        .collect(),
                )
            })
            .await
            .unwrap();

        let order: Vec<String> = result.into_iter().map(|v| v.unwrap().key).collect();
        assert_eq!(order, inputs);
    }

    #[tokio::test]
    async fn test_unresolved_input_is_none() {
        let (endpoint, loader) = setup();
        let inputs = keys(&["a", "ghost"]);

        let result = loader
            .load(&inputs, &input_key, &item_key, |_| async {
                Ok::<_, Error>(vec![item("a", 1)])
            })
            .await
            .unwrap();

        assert_eq!(result, vec![Some(item("a", 1)), None]);
        assert_eq!(endpoint.len(), 1);
    }

    #[tokio::test]
    async fn test_nothing_fetched_means_no_write() {
        let (endpoint, loader) = setup();
        let inputs = keys(&["a"]);

        let result = loader
            .load(&inputs, &input_key, &item_key, |_| async {
                Ok::<Vec<Item>, Error>(vec![])
            })
            .await
            .unwrap();

        assert_eq!(result, vec![None]);
        assert_eq!(endpoint.stats().transactions, 0);
    }

    #[tokio::test]
    async fn test_malformed_entry_is_a_miss() {
        let (endpoint, loader) = setup();
        let cache = loader.cache().clone();
        cache
            .set(&cache.derive_key("a"), "{not json", SetOptions::persistent())
            .await
            .unwrap();

        let source = Source::default();
        let inputs = keys(&["a"]);
        let result = loader
            .load(&inputs, &input_key, &item_key, |m| source.fetch(m))
            .await
            .unwrap();

        assert_eq!(result, vec![Some(item("a", 97))]);
        assert_eq!(source.calls(), vec![keys(&["a"])]);
        // Overwritten with a well-formed value.
        let stored = endpoint.get(&cache.derive_key("a")).await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<Item>(&stored).unwrap(), item("a", 97));
    }

    #[tokio::test]
    async fn test_duplicate_inputs_resolve_each_position() {
        let (_, loader) = setup();
        let source = Source::default();
        let inputs = keys(&["a", "a", "b"]);

        let result = loader
            .load(&inputs, &input_key, &item_key, |m| source.fetch(m))
            .await
            .unwrap();

        assert_eq!(
            result,
            vec![Some(item("a", 97)), Some(item("a", 97)), Some(item("b", 98))]
        );
    }

    #[tokio::test]
    async fn test_ttl_is_passed_to_store() {
        tokio::time::pause();
        let (endpoint, loader) = setup();
        let inputs = keys(&["a"]);

        loader
            .load_with_ttl(&inputs, &input_key, &item_key, 10, |_| async {
                Ok::<_, Error>(vec![item("a", 1)])
            })
            .await
            .unwrap();
        assert_eq!(endpoint.len(), 1);

        tokio::time::advance(std::time::Duration::from_secs(11)).await;
        assert_eq!(endpoint.len(), 0);
    }

    #[tokio::test]
    async fn test_max_ttl_is_accepted() {
        let (endpoint, loader) = setup();
        let source = Source::default();
        let inputs = keys(&["a"]);

        let result = loader
            .load_with_ttl(&inputs, &input_key, &item_key, u64::MAX, |m| source.fetch(m))
            .await
            .unwrap();

        assert_eq!(result, vec![Some(item("a", 97))]);
        assert_eq!(endpoint.len(), 1);
    }

    /// Value whose encoding fails when `poisoned` is set.
    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Fragile {
        key: String,
        poisoned: bool,
    }

    impl Serialize for Fragile {
        fn serialize<S: serde::Serializer>(
            &self,
            serializer: S,
        ) -> std::result::Result<S::Ok, S::Error> {
            use serde::ser::{Error as _, SerializeStruct};
            if self.poisoned {
                return Err(S::Error::custom("poisoned value"));
            }
            let mut state = serializer.serialize_struct("Fragile", 2)?;
            state.serialize_field("key", &self.key)?;
            state.serialize_field("poisoned", &self.poisoned)?;
            state.end()
        }
    }

    #[tokio::test]
    async fn test_unserializable_value_is_returned_but_not_cached() {
        let (endpoint, loader) = setup();
        let inputs = keys(&["ok", "bad"]);

        let result = loader
            .load(&inputs, &input_key, &|f: &Fragile| f.key.clone(), |_| async {
                Ok::<_, Error>(vec![
                    Fragile { key: "ok".into(), poisoned: false },
                    Fragile { key: "bad".into(), poisoned: true },
                ])
            })
            .await
            .unwrap();

        assert_eq!(result.iter().filter(|v| v.is_some()).count(), 2);
        assert_eq!(endpoint.len(), 1);
        let cache = loader.cache();
        assert!(endpoint.get(&cache.derive_key("bad")).await.unwrap().is_none());
        assert!(endpoint.get(&cache.derive_key("ok")).await.unwrap().is_some());
    }

    #[derive(Debug)]
    enum AppError {
        Cache(Error),
        Upstream(String),
    }

    impl From<Error> for AppError {
        fn from(e: Error) -> Self {
            AppError::Cache(e)
        }
    }

    #[tokio::test]
    async fn test_fetch_error_passes_through() {
        let (endpoint, loader) = setup();
        let inputs = keys(&["a"]);

        let result: std::result::Result<Vec<Option<Item>>, AppError> = loader
            .load(&inputs, &input_key, &item_key, |_| async {
                Err(AppError::Upstream("db timeout".into()))
            })
            .await;

        assert_matches!(result, Err(AppError::Upstream(msg)) if msg == "db timeout");
        assert_eq!(endpoint.stats().transactions, 0);
    }

    #[tokio::test]
    async fn test_cache_read_failure_surfaces() {
        let (endpoint, loader) = setup();
        endpoint.set_available(false);
        let source = Source::default();
        let inputs = keys(&["a"]);

        let result: std::result::Result<Vec<Option<Item>>, AppError> = loader
            .load(&inputs, &input_key, &item_key, |m| {
                let pending = source.fetch(m);
                async move { pending.await.map_err(AppError::from) }
            })
            .await;

        assert_matches!(result, Err(AppError::Cache(Error::BackendUnavailable(_))));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cache_write_failure_surfaces() {
        let primary = Arc::new(InMemoryEndpoint::named("primary"));
        let reader = Arc::new(InMemoryEndpoint::named("reader"));
        primary.set_available(false);
        let loader = BatchCacheLoader::new(Arc::new(SplitCacheClient::new(
            primary.clone(),
            reader.clone(),
        )));
        let inputs = keys(&["a"]);

        let result = loader
            .load(&inputs, &input_key, &item_key, |_| async {
                Ok::<_, Error>(vec![item("a", 1)])
            })
            .await;

        assert_matches!(result, Err(Error::BackendUnavailable(msg)) if msg.contains("primary"));
    }
}
