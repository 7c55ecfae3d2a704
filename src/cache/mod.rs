//! Cache Clients
//!
//! The cache contract the batch loader talks to, and the primary/reader split
//! implementation of it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  CacheClient (contract)                       │
//! │   derive_key │ set │ mset │ get │ mget │ delete │ flush/clear │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                     SplitCacheClient (impl)
//!                 ┌─────────────┴─────────────┐
//!                 ▼                           ▼
//!        CacheEndpoint (primary)     CacheEndpoint (reader)
//!        writes + transactions       reads
//! ```
//!
//! Keys are MD5 fingerprints of the logical key; see [`derive_key`].

mod client;
mod endpoint;
mod key;
mod memory;
mod split;

pub use client::{CacheClient, SetOptions};
pub use endpoint::{CacheCommand, CacheEndpoint};
pub use key::{derive_key, KEY_LEN};
pub use memory::{EndpointStats, InMemoryEndpoint};
pub use split::{SplitCacheClient, SplitClientStats};
