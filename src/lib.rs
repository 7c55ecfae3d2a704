//! cachefill - Batched Cache-Aside Loading
//!
//! Serves a batch of requested items from a cache, fetches only the misses
//! from the source of truth in one call, writes them back with an expiry, and
//! returns everything in the caller's order.
//!
//! # Architecture
//!
//! ```text
//! BatchCacheLoader ──▶ CacheClient ──▶ SplitCacheClient ─┬─▶ primary (writes)
//!        │                                               └─▶ reader  (reads)
//!        └──▶ backing fetch (caller supplied, batched)
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Cache contract, key derivation, split client, in-memory endpoint
//! - [`loader`] - Batch cache loader
//! - [`config`] - Loader and endpoint settings
//! - [`reporting`] - Injected error reporting
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cachefill::{BatchCacheLoader, InMemoryEndpoint, SplitCacheClient};
//!
//! let primary = Arc::new(InMemoryEndpoint::named("primary"));
//! let reader = Arc::new(InMemoryEndpoint::named("reader"));
//! let loader = BatchCacheLoader::new(Arc::new(SplitCacheClient::new(primary, reader)));
//!
//! let users = loader
//!     .load(&ids, &|id: &String| id.clone(), &|u: &User| u.id.clone(), |missed| db.users(missed))
//!     .await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod loader;
pub mod reporting;

// Re-export commonly used types
pub use cache::{
    derive_key, CacheClient, CacheCommand, CacheEndpoint, InMemoryEndpoint, SetOptions,
    SplitCacheClient,
};
pub use config::{EndpointConfig, LoaderConfig};
pub use error::{Error, Result};
pub use loader::{batch_cache_fill, BatchCacheLoader, BatchRequest};
pub use reporting::{ErrorCode, ErrorReporter, ReportContext, TracingErrorReporter};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
