//! KeyValueStore trait definition
//!
//! Byte-oriented key-value operations the aggregate store is built on. Keeping
//! this surface small lets tests run against an in-memory mock and keeps the
//! Redis adapter a thin translation layer.

use anyhow::Result;
use async_trait::async_trait;

/// Abstract interface for the primary key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Whether a key is present
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Read a single value
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Read several values; the result is aligned with `keys`
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Write all entries as one atomic batch
    async fn set_many(&self, entries: &[(String, Vec<u8>)]) -> Result<()>;

    /// Write all entries atomically, but only if `guard_key` currently holds
    /// `expected`. Returns `false` (and writes nothing) when the guard fails.
    async fn set_many_if(
        &self,
        guard_key: &str,
        expected: &[u8],
        entries: &[(String, Vec<u8>)],
    ) -> Result<bool>;

    /// Remove keys as one pipelined batch (not transactional). Returns how
    /// many keys actually existed.
    async fn delete_many(&self, keys: &[String]) -> Result<u64>;

    /// One step of a cursor scan over all keys. A returned cursor of `0`
    /// means the scan is complete. Keys may repeat across steps.
    async fn scan(&self, cursor: u64, count: usize) -> Result<(u64, Vec<String>)>;

    /// Connectivity probe
    async fn health_check(&self) -> Result<bool>;
}
