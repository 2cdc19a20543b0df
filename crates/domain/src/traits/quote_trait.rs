//! 行情接口
//!
//! 行情采集不在本系统内，这里只读取最新快照。

use anyhow::Result;
use async_trait::async_trait;

use crate::value_objects::Quote;

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// 最新行情，无数据时返回 `None`
    async fn latest(&self, stock_code: &str) -> Result<Option<Quote>>;
}
