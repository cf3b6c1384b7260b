//! Redis adapter for the primary key-value store

use super::traits::KeyValueStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::sync::LazyLock;

/// Compare-and-set over a batch: KEYS[1]/ARGV[1] are the guard key and its
/// expected value, the remaining KEYS/ARGV pairs are written.
static GUARDED_SET: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        if redis.call('GET', KEYS[1]) ~= ARGV[1] then
            return 0
        end
        for i = 2, #KEYS do
            redis.call('SET', KEYS[i], ARGV[i])
        end
        return 1
        "#,
    )
});

/// Redis-backed `KeyValueStore`
///
/// Holds one `ConnectionManager` (multiplexed, auto-reconnecting) opened at
/// startup and cloned per call.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .with_context(|| format!("Invalid Redis URL {}", url))?;
        let manager = ConnectionManager::new(client)
            .await
            .with_context(|| format!("Failed to connect to Redis at {}", url))?;
        tracing::info!("Connected to Redis at {}", url);
        Ok(Self { manager })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let found: bool = conn
            .exists(key)
            .await
            .with_context(|| format!("EXISTS {} failed", key))?;
        Ok(found)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .with_context(|| format!("GET {} failed", key))?;
        Ok(value)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.manager.clone();
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .context("MGET failed")?;
        Ok(values)
    }

    async fn set_many(&self, entries: &[(String, Vec<u8>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.set(key, value.as_slice()).ignore();
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .context("MULTI/SET batch failed")?;
        Ok(())
    }

    async fn set_many_if(
        &self,
        guard_key: &str,
        expected: &[u8],
        entries: &[(String, Vec<u8>)],
    ) -> Result<bool> {
        let mut conn = self.manager.clone();
        let mut invocation = GUARDED_SET.prepare_invoke();
        invocation.key(guard_key).arg(expected);
        for (key, value) in entries {
            invocation.key(key).arg(value.as_slice());
        }
        let applied: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .with_context(|| format!("Guarded write on {} failed", guard_key))?;
        Ok(applied == 1)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.del(key);
        }
        let removed: Vec<u64> = pipe
            .query_async(&mut conn)
            .await
            .context("DEL pipeline failed")?;
        Ok(removed.into_iter().sum())
    }

    async fn scan(&self, cursor: u64, count: usize) -> Result<(u64, Vec<String>)> {
        let mut conn = self.manager.clone();
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("SCAN {} failed", cursor))?;
        Ok((next, keys))
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("PING failed")?;
        Ok(pong == "PONG")
    }
}
