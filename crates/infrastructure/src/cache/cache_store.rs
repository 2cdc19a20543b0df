//! 缓存 / 锁存储实现
//!
//! - `RedisCacheStore`: 生产环境，基于 Redis 多路复用连接
//! - `InMemoryCacheStore`: 测试与模拟盘，基于 DashMap，带过期时间

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use redis::AsyncCommands;
use tracing::{debug, error};

use rust_margin_core::cache::RedisConnectionPool;
use rust_margin_domain::traits::CacheStore;

/// Redis 缓存实现
pub struct RedisCacheStore {
    pool: RedisConnectionPool,
    key_prefix: String,
}

impl RedisCacheStore {
    pub fn new(pool: RedisConnectionPool, key_prefix: &str) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.to_string(),
        }
    }

    fn make_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn set_nx(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.pool.get_connection().await?;
        let redis_key = self.make_key(key);
        // SET key value NX EX ttl，成功返回 OK，已存在返回 nil
        let reply: Option<String> = redis::cmd("SET")
            .arg(&redis_key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis SET NX error: key={}, {:?}", redis_key, e);
                e
            })?;
        debug!("SET NX {} -> {:?}", redis_key, reply);
        Ok(reply.is_some())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.pool.get_connection().await?;
        let _: () = conn
            .set_ex(self.make_key(key), value, ttl_secs.max(1))
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get_connection().await?;
        let value: Option<String> = conn.get(self.make_key(key)).await?;
        Ok(value)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get_connection().await?;
        let _: () = conn.del(self.make_key(key)).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.pool.get_connection().await?;
        let result: bool = conn.exists(self.make_key(key)).await?;
        Ok(result)
    }
}

#[derive(Clone)]
struct CacheEntry {
    value: String,
    expire_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expire_at.map_or(false, |at| Instant::now() >= at)
    }
}

/// 内存缓存实现（使用 DashMap）
#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    map: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_for(value: &str, ttl_secs: u64) -> CacheEntry {
        CacheEntry {
            value: value.to_string(),
            expire_at: Some(Instant::now() + Duration::from_secs(ttl_secs.max(1))),
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn set_nx(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        // entry 持有分片写锁，判断与写入是原子的
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Self::entry_for(value, ttl_secs));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Self::entry_for(value, ttl_secs));
                Ok(true)
            }
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.map
            .insert(key.to_string(), Self::entry_for(value, ttl_secs));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.map.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
            // 过期则删除
            drop(entry);
            self.map.remove(key);
        }
        Ok(None)
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
