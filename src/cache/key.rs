//! Cache Key Derivation
//!
//! Every read and write path hashes logical keys through [`derive_key`]. If the
//! writer and the reader ever used different hashes, every lookup would miss
//! and nothing would report it.

use md5::{Digest, Md5};

/// Length of a derived key in hex characters.
pub const KEY_LEN: usize = 32;

/// Derive the stored cache key for a logical key (lowercase hex MD5).
pub fn derive_key(logical_key: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(logical_key.as_bytes());
    hex::encode(hasher.finalize())
}
