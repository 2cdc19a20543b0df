//! 结算幂等锁
//!
//! 基于缓存的 `SET NX EX`，同一委托同一时间只允许一个结算流程。
//! 进程崩溃时由 TTL 兜底释放。

use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use rust_margin_domain::traits::CacheStore;

pub fn settle_lock_key(entrust_id: i64) -> String {
    format!("lock:settle:entrust:{}", entrust_id)
}

pub struct IdempotencyGuard {
    cache: Arc<dyn CacheStore>,
    ttl_secs: u64,
}

impl IdempotencyGuard {
    pub fn new(cache: Arc<dyn CacheStore>, ttl_secs: u64) -> Self {
        Self {
            cache,
            ttl_secs: ttl_secs.max(1),
        }
    }

    /// 尝试获取委托的结算锁，已被占用时返回 false
    pub async fn acquire(&self, entrust_id: i64) -> Result<bool> {
        self.cache
            .set_nx(&settle_lock_key(entrust_id), "1", self.ttl_secs)
            .await
    }

    pub async fn release(&self, entrust_id: i64) {
        if let Err(e) = self.cache.del(&settle_lock_key(entrust_id)).await {
            warn!("释放结算锁失败，等待过期: entrust_id={}, error={}", entrust_id, e);
        }
    }
}
