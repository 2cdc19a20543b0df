//! 强平执行端口与风控缓存键

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rust_margin_domain::entities::{Contract, Position};

/// 强平执行端口，由下单服务实现
#[async_trait]
pub trait LiquidationPort: Send + Sync {
    /// 撤销合约在 `since` 之后创建的所有未终结委托，返回发起撤单的数量
    async fn cancel_open_entrusts(&self, contract_id: i64, since: DateTime<Utc>) -> Result<usize>;

    /// 以市价卖出持仓的 `amount` 股，`reference_price` 为最新价，返回委托 ID
    async fn market_sell(
        &self,
        contract: &Contract,
        position: &Position,
        amount: i64,
        reference_price: f64,
    ) -> Result<i64>;
}

/// 风控相关的缓存键
pub mod keys {
    /// 当日已强平标记
    pub fn close_flag(day_key: &str, contract_id: i64) -> String {
        format!("risk:close:{}:{}", day_key, contract_id)
    }

    /// 当日已发送警戒通知标记
    pub fn warn_flag(day_key: &str, contract_id: i64) -> String {
        format!("risk:warn:{}:{}", day_key, contract_id)
    }

    /// 禁止出金（及新开买单）标记
    pub fn withdraw_blocked(contract_id: i64) -> String {
        format!("risk:withdraw_blocked:{}", contract_id)
    }
}
