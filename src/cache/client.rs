//! Cache Client Contract
//!
//! The capability set the batch loader needs from a cache: key derivation,
//! single and batched reads and writes, delete, flush and close.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::key;
use crate::error::Result;

/// Options for a single `set`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Expiry in seconds. `None` leaves the entry without an expiry.
    pub ttl_seconds: Option<u64>,
}

impl SetOptions {
    /// Options with an expiry.
    pub fn with_ttl(ttl_seconds: u64) -> Self {
        Self {
            ttl_seconds: Some(ttl_seconds),
        }
    }

    /// Options without an expiry.
    pub fn persistent() -> Self {
        Self::default()
    }
}

/// Cache client trait.
///
/// Absence is never an error: `get`/`mget` return `None` for missing keys and
/// `delete` returns `false`. Transport failures surface as
/// [`Error::BackendUnavailable`](crate::Error::BackendUnavailable).
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Derive the stored key for a logical key. Pure; never fails.
    fn derive_key(&self, logical_key: &str) -> String {
        key::derive_key(logical_key)
    }

    /// Upsert one entry.
    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<()>;

    /// Upsert many entries sharing one expiry, all-or-nothing.
    async fn mset(&self, entries: &BTreeMap<String, String>, ttl_seconds: u64) -> Result<()>;

    /// Read one entry.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Read many entries. The result has the same length and order as `keys`.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Remove one entry, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every entry.
    async fn flush(&self) -> Result<()>;

    /// Alias for [`flush`](CacheClient::flush).
    async fn clear(&self) -> Result<()> {
        self.flush().await
    }

    /// Release held connections. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}
