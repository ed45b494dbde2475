//! # Cache Key Generator
//!
//! Keys are composed of method, endpoint and the serialized body, so a GET and
//! a POST to the same endpoint, or two POSTs with different bodies, never
//! share a key. The same key is used by the cache and the deduplicator.

use sha2::{Digest, Sha256};

use crate::core::types::Method;

/// Builds cache/deduplication keys
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    max_length: usize,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(250)
    }
}

impl KeyGenerator {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// `METHOD:endpoint:body`; the body is replaced by its SHA-256 digest when
    /// the plain key would exceed `max_length`
    pub fn generate(&self, method: Method, endpoint: &str, body: Option<&serde_json::Value>) -> String {
        let serialized = body.map(|b| b.to_string()).unwrap_or_default();
        let key = format!("{}:{}:{}", method, endpoint, serialized);
        if key.len() <= self.max_length {
            return key;
        }

        let digest = hex::encode(Sha256::digest(serialized.as_bytes()));
        format!("{}:{}:#{}", method, endpoint, digest)
    }
}
