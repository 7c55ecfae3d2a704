//! Cache Endpoint Port
//!
//! One physical cache connection. The split client composes two of these, a
//! primary for writes and a reader for reads.

use async_trait::async_trait;

use super::client::SetOptions;
use crate::error::Result;

/// A single command inside a multi-command transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCommand {
    /// Set `key` to `value`, expiring after `ttl_seconds`.
    SetEx {
        key: String,
        value: String,
        ttl_seconds: u64,
    },
}

impl CacheCommand {
    pub fn set_ex(key: impl Into<String>, value: impl Into<String>, ttl_seconds: u64) -> Self {
        CacheCommand::SetEx {
            key: key.into(),
            value: value.into(),
            ttl_seconds,
        }
    }

    /// Argument list as it would go on the wire, e.g. `set k v ex 300`.
    pub fn args(&self) -> Vec<String> {
        match self {
            CacheCommand::SetEx {
                key,
                value,
                ttl_seconds,
            } => vec![
                "set".to_string(),
                key.clone(),
                value.clone(),
                "ex".to_string(),
                ttl_seconds.to_string(),
            ],
        }
    }
}

impl std::fmt::Display for CacheCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheCommand::SetEx {
                key, ttl_seconds, ..
            } => write!(f, "set {} <value> ex {}", key, ttl_seconds),
        }
    }
}

/// Cache endpoint trait
#[async_trait]
pub trait CacheEndpoint: Send + Sync {
    /// Endpoint name, used in logs and error messages
    fn name(&self) -> &str;

    /// Read one entry
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Read many entries, same length and order as `keys`
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Upsert one entry
    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<()>;

    /// Remove one entry, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every entry
    async fn flush(&self) -> Result<()>;

    /// Queue `commands` and execute them as one atomic transaction.
    ///
    /// Either every command applies or none does.
    async fn exec_transaction(&self, commands: Vec<CacheCommand>) -> Result<()>;

    /// Close the connection. Idempotent.
    async fn close(&self) -> Result<()>;
}
