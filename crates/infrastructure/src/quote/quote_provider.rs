//! 行情读取
//!
//! 行情由外部采集程序写入缓存，键为 `quote:{证券代码}`，值为 JSON。

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;

use rust_margin_domain::traits::{CacheStore, QuoteProvider};
use rust_margin_domain::value_objects::Quote;

pub fn quote_key(stock_code: &str) -> String {
    format!("quote:{}", stock_code)
}

/// 从缓存读取行情快照
pub struct CachedQuoteProvider {
    cache: Arc<dyn CacheStore>,
}

impl CachedQuoteProvider {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl QuoteProvider for CachedQuoteProvider {
    async fn latest(&self, stock_code: &str) -> Result<Option<Quote>> {
        let Some(raw) = self.cache.get(&quote_key(stock_code)).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<Quote>(&raw) {
            Ok(quote) => Ok(Some(quote)),
            Err(e) => {
                warn!("行情数据无法解析: stock_code={}, error={}", stock_code, e);
                Ok(None)
            }
        }
    }
}

/// 手工设置的行情，用于测试和模拟盘
#[derive(Clone, Default)]
pub struct StaticQuoteProvider {
    quotes: Arc<DashMap<String, Quote>>,
}

impl StaticQuoteProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, stock_code: &str, price: f64, pre_close: f64) {
        self.quotes
            .insert(stock_code.to_string(), Quote::new(stock_code, price, pre_close));
    }

    pub fn remove(&self, stock_code: &str) {
        self.quotes.remove(stock_code);
    }
}

#[async_trait]
impl QuoteProvider for StaticQuoteProvider {
    async fn latest(&self, stock_code: &str) -> Result<Option<Quote>> {
        Ok(self.quotes.get(stock_code).map(|q| q.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;

    #[tokio::test]
    async fn test_cached_quote_round_trip() {
        let cache = Arc::new(InMemoryCacheStore::new());
        let quote = Quote::new("600000", 10.5, 10.0);
        cache
            .set_ex(&quote_key("600000"), &serde_json::to_string(&quote).unwrap(), 60)
            .await
            .unwrap();
        cache.set_ex(&quote_key("000001"), "not-json", 60).await.unwrap();

        let provider = CachedQuoteProvider::new(cache);
        assert_eq!(provider.latest("600000").await.unwrap().unwrap().price, 10.5);
        assert!(provider.latest("000001").await.unwrap().is_none());
        assert!(provider.latest("300750").await.unwrap().is_none());
    }
}
