//! In-Memory Cache Endpoint
//!
//! A process-local endpoint with per-entry expiry. Used for tests and by the
//! CLI when no real store is wired in.
//!
//! # Design
//!
//! - Single `RwLock` over the map so a transaction applies atomically
//! - Expiry checked lazily on read; expired entries are purged on write
//! - Outages can be simulated with [`InMemoryEndpoint::set_available`]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::client::SetOptions;
use super::endpoint::{CacheCommand, CacheEndpoint};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    /// A TTL past the clock's range is stored without an expiry.
    fn new(value: &str, ttl_seconds: Option<u64>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl_seconds
                .and_then(|ttl| Instant::now().checked_add(Duration::from_secs(ttl))),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Endpoint operation counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
    pub flushes: u64,
    pub transactions: u64,
    pub closes: u64,
}

/// In-memory endpoint
pub struct InMemoryEndpoint {
    name: String,
    entries: RwLock<HashMap<String, StoredValue>>,
    available: AtomicBool,
    closed: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    flushes: AtomicU64,
    transactions: AtomicU64,
    closes: AtomicU64,
}

impl Default for InMemoryEndpoint {
    fn default() -> Self {
        Self::named("memory")
    }
}

impl InMemoryEndpoint {
    /// Create a new in-memory endpoint
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an endpoint with a name used in logs and errors
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            transactions: AtomicU64::new(0),
            closes: AtomicU64::new(0),
        }
    }

    /// Simulate the store going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|v| v.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the operation counters
    pub fn stats(&self) -> EndpointStats {
        EndpointStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            transactions: self.transactions.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::unavailable(&self.name, "connection refused"));
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::unavailable(&self.name, "connection closed"));
        }
        Ok(())
    }

    fn read_live(&self, key: &str, now: Instant) -> Option<String> {
        self.entries
            .read()
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| v.value.clone())
    }

    fn purge_expired(entries: &mut HashMap<String, StoredValue>, now: Instant) {
        entries.retain(|_, v| v.is_live(now));
    }
}

impl std::fmt::Debug for InMemoryEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEndpoint")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl CacheEndpoint for InMemoryEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_ready()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.read_live(key, Instant::now()))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.ensure_ready()?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let entries = self.entries.read();
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(key)
                    .filter(|v| v.is_live(now))
                    .map(|v| v.value.clone())
            })
            .collect())
    }

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<()> {
        self.ensure_ready()?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.write();
        Self::purge_expired(&mut entries, Instant::now());
        entries.insert(key.to_string(), StoredValue::new(value, options.ttl_seconds));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_ready()?;
        self.deletes.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let mut entries = self.entries.write();
        Ok(entries.remove(key).is_some_and(|v| v.is_live(now)))
    }

    async fn flush(&self) -> Result<()> {
        self.ensure_ready()?;
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.entries.write().clear();
        Ok(())
    }

    async fn exec_transaction(&self, commands: Vec<CacheCommand>) -> Result<()> {
        self.ensure_ready()?;
        self.transactions.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.write();
        Self::purge_expired(&mut entries, Instant::now());
        for command in &commands {
            trace!(endpoint = %self.name, %command, "Applying command");
            match command {
                CacheCommand::SetEx {
                    key,
                    value,
                    ttl_seconds,
                } => {
                    entries.insert(key.clone(), StoredValue::new(value, Some(*ttl_seconds)));
                }
            }
        }
        self.writes
            .fetch_add(commands.len() as u64, Ordering::Relaxed);

        debug!(endpoint = %self.name, commands = commands.len(), "Transaction executed");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::Relaxed);
        self.closed.store(true, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::unavailable(&self.name, "close failed"));
        }
        Ok(())
    }
}
