//! Split Cache Client
//!
//! Routes writes to a primary endpoint and reads to a reader endpoint so the
//! reader side can scale out independently. The two endpoints may or may not
//! be the same physical store.
//!
//! ```text
//!            ┌──────────────────┐
//!  set/mset  │                  │  get/mget
//!  delete ──▶│ SplitCacheClient │◀── ...
//!  flush     │                  │
//!            └───┬──────────┬───┘
//!                ▼          ▼
//!            primary     reader
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join;
use tracing::{debug, warn};

use super::client::{CacheClient, SetOptions};
use super::endpoint::{CacheCommand, CacheEndpoint};
use super::key;
use crate::error::Result;

/// Per-side routing counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitClientStats {
    /// Operations sent to the primary (writes, deletes, flushes)
    pub primary_ops: u64,
    /// Operations sent to the reader (gets, mgets)
    pub reader_ops: u64,
    /// Transactions submitted by `mset`
    pub transactions: u64,
}

/// Cache client over a primary and a reader endpoint
pub struct SplitCacheClient {
    primary: Arc<dyn CacheEndpoint>,
    reader: Arc<dyn CacheEndpoint>,
    primary_ops: AtomicU64,
    reader_ops: AtomicU64,
    transactions: AtomicU64,
}

impl SplitCacheClient {
    pub fn new(primary: Arc<dyn CacheEndpoint>, reader: Arc<dyn CacheEndpoint>) -> Self {
        Self {
            primary,
            reader,
            primary_ops: AtomicU64::new(0),
            reader_ops: AtomicU64::new(0),
            transactions: AtomicU64::new(0),
        }
    }

    /// Use one endpoint for both roles.
    pub fn single(endpoint: Arc<dyn CacheEndpoint>) -> Self {
        Self::new(endpoint.clone(), endpoint)
    }

    pub fn primary(&self) -> &Arc<dyn CacheEndpoint> {
        &self.primary
    }

    pub fn reader(&self) -> &Arc<dyn CacheEndpoint> {
        &self.reader
    }

    pub fn stats(&self) -> SplitClientStats {
        SplitClientStats {
            primary_ops: self.primary_ops.load(Ordering::Relaxed),
            reader_ops: self.reader_ops.load(Ordering::Relaxed),
            transactions: self.transactions.load(Ordering::Relaxed),
        }
    }

    fn on_primary(&self) -> &dyn CacheEndpoint {
        self.primary_ops.fetch_add(1, Ordering::Relaxed);
        self.primary.as_ref()
    }

    fn on_reader(&self) -> &dyn CacheEndpoint {
        self.reader_ops.fetch_add(1, Ordering::Relaxed);
        self.reader.as_ref()
    }
}

impl std::fmt::Debug for SplitCacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitCacheClient")
            .field("primary", &self.primary.name())
            .field("reader", &self.reader.name())
            .finish()
    }
}

#[async_trait]
impl CacheClient for SplitCacheClient {
    fn derive_key(&self, logical_key: &str) -> String {
        key::derive_key(logical_key)
    }

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<()> {
        self.on_primary().set(key, value, options).await
    }

    async fn mset(&self, entries: &BTreeMap<String, String>, ttl_seconds: u64) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        // Batched SET has no expiry argument, so each pair becomes its own
        // SET .. EX inside one MULTI/EXEC.
        let commands: Vec<CacheCommand> = entries
            .iter()
            .map(|(key, value)| CacheCommand::set_ex(key.as_str(), value.as_str(), ttl_seconds))
            .collect();

        debug!(
            endpoint = %self.primary.name(),
            commands = commands.len(),
            ttl_seconds,
            "Submitting mset transaction"
        );

        self.transactions.fetch_add(1, Ordering::Relaxed);
        self.on_primary().exec_transaction(commands).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.on_reader().get(key).await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.on_reader().mget(keys).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.on_primary().delete(key).await
    }

    async fn flush(&self) -> Result<()> {
        self.on_primary().flush().await
    }

    async fn close(&self) -> Result<()> {
        let (primary, reader) = join(self.primary.close(), self.reader.close()).await;

        match (primary, reader) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(primary_err), Err(reader_err)) => {
                warn!(
                    endpoint = %self.reader.name(),
                    error = %reader_err,
                    "Reader close failed alongside primary"
                );
                Err(primary_err)
            }
        }
    }
}
