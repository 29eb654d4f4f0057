//! Read-through result cache
//!
//! A performance layer only. The pipeline produces the same results with the
//! cache disabled or failing.

mod key;
mod store;

pub use key::{CacheKey, KeyParts};
pub use store::{CacheBackend, CacheEntry, CacheError, CacheStats, CachedExtraction, ResultCache};
