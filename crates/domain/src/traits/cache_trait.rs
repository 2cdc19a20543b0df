//! 缓存 / 分布式锁接口

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `SET key value EX ttl NX`，返回是否设置成功
    async fn set_nx(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn del(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;
}
