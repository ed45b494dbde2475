//! # Caching System Module
//!
//! Response caching and request deduplication for the client.
//!
//! ## Architecture
//! 1. **Key Generator**: method + endpoint + serialized body
//! 2. **Cache Store**: in-memory entries with TTL and tags, plus a sweeper task
//! 3. **Deduplicator**: single-flight execution of identical in-flight requests
//!
//! ## Usage Example
//! ```rust
//! use std::time::Duration;
//! use resilient_client::caching::{CacheConfig, CacheStore};
//! use serde_json::json;
//!
//! let cache = CacheStore::new(&CacheConfig::default());
//! cache.set("GET:/products?page=1:", json!({"id": 7}), Duration::from_secs(5), ["products"]);
//! assert_eq!(cache.get("GET:/products?page=1:"), Some(json!({"id": 7})));
//!
//! cache.clear_by_tag("products");
//! assert_eq!(cache.get("GET:/products?page=1:"), None);
//! ```

pub mod deduplication;
pub mod key_generator;
pub mod store;

pub use deduplication::RequestDeduplicator;
pub use key_generator::KeyGenerator;
pub use store::{CacheConfig, CacheEntry, CacheStats, CacheStore, CacheSweeper};
