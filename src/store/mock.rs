//! In-memory mock implementation of KeyValueStore for testing without Redis.

use super::traits::KeyValueStore;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-memory mock implementation of KeyValueStore.
///
/// Keys are kept sorted; the scan cursor is an offset into the sorted key
/// list, so keys inserted between scan steps shift positions and can repeat,
/// much like a resharding Redis cluster.
pub struct MockKeyValueStore {
    pub data: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MockKeyValueStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail with an I/O-style error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("mock store: connection reset");
        }
        Ok(())
    }

    /// Sorted snapshot of all keys
    pub async fn keys(&self) -> Vec<String> {
        self.data.read().await.keys().cloned().collect()
    }
}

impl Default for MockKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MockKeyValueStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data.read().await.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let data = self.data.read().await;
        Ok(keys.iter().map(|k| data.get(k).cloned()).collect())
    }

    async fn set_many(&self, entries: &[(String, Vec<u8>)]) -> Result<()> {
        self.check_writable()?;
        let mut data = self.data.write().await;
        for (key, value) in entries {
            data.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn set_many_if(
        &self,
        guard_key: &str,
        expected: &[u8],
        entries: &[(String, Vec<u8>)],
    ) -> Result<bool> {
        self.check_writable()?;
        let mut data = self.data.write().await;
        if data.get(guard_key).map(Vec::as_slice) != Some(expected) {
            return Ok(false);
        }
        for (key, value) in entries {
            data.insert(key.clone(), value.clone());
        }
        Ok(true)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        self.check_writable()?;
        let mut data = self.data.write().await;
        Ok(keys.iter().filter(|k| data.remove(*k).is_some()).count() as u64)
    }

    async fn scan(&self, cursor: u64, count: usize) -> Result<(u64, Vec<String>)> {
        let data = self.data.read().await;
        let start = cursor as usize;
        let keys: Vec<String> = data.keys().skip(start).take(count.max(1)).cloned().collect();
        let end = start + keys.len();
        let next = if end >= data.len() { 0 } else { end as u64 };
        Ok((next, keys))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guarded_write() {
        let store = MockKeyValueStore::new();
        store
            .set_many(&[("a".into(), b"1".to_vec())])
            .await
            .unwrap();

        let applied = store
            .set_many_if("a", b"2", &[("a".into(), b"3".to_vec())])
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(store.get("a").await.unwrap(), Some(b"1".to_vec()));

        let applied = store
            .set_many_if("a", b"1", &[("a".into(), b"3".to_vec())])
            .await
            .unwrap();
        assert!(applied);
        assert_eq!(store.get("a").await.unwrap(), Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn test_scan_covers_all_keys() {
        let store = MockKeyValueStore::new();
        let entries: Vec<(String, Vec<u8>)> =
            (0..7).map(|i| (format!("k{i}"), vec![i as u8])).collect();
        store.set_many(&entries).await.unwrap();

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let (next, keys) = store.scan(cursor, 3).await.unwrap();
            seen.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 7);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let store = MockKeyValueStore::new();
        store.fail_writes(true);
        assert!(store.set_many(&[("a".into(), vec![])]).await.is_err());
        assert!(store.delete_many(&["a".into()]).await.is_err());
    }
}
