//! # RagBench Cache
//!
//! Key/value memoization for the expensive, deterministic steps of a
//! retrieval pipeline: embeddings, search hits, rerank results, generated
//! answers and metric values.
//!
//! ## Features
//!
//! - **Deterministic keys**: [`CacheKey`] hashes an ordered field list into a
//!   namespaced SHA-256 digest that is stable across process restarts
//! - **Pluggable storage**: in-memory and on-disk backends behind [`CacheStorage`]
//! - **Two levels**: optional secondary storage with promotion on hit
//! - **Metrics**: hit/miss/store counters via [`CacheMetrics`]
//!
//! A miss is always `Ok(None)`; callers compute and populate. `set` replaces
//! the stored value wholesale and entries never expire.

pub mod cache;
pub mod error;
pub mod key;
pub mod metrics;
pub mod storage;

pub use cache::{Cache, CacheBuilder, CacheConfig};
pub use error::CacheError;
pub use key::{CacheKey, Namespace};
pub use metrics::{CacheMetrics, CacheStats};
pub use storage::{CacheEntry, CacheStorage, DiskStorage, MemoryStorage};

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, CacheError>;
