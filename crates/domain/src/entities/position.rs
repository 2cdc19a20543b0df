//! 持仓实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value_objects::round2;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    #[error("可卖数量不足: 需要 {required}, 可卖 {sellable}")]
    InsufficientSellable { required: i64, sellable: i64 },

    #[error("持仓数量不足: 需要 {required}, 持有 {amount}")]
    InsufficientAmount { required: i64, amount: i64 },

    #[error("持仓参数无效: {0}")]
    InvalidParameter(String),
}

/// 卖出结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellResult {
    /// 已实现盈亏（未扣费）
    pub profit: f64,
    /// 是否已全部卖出
    pub closed: bool,
}

/// 用户在某合约下某只股票的持仓
///
/// 不变量：`freeze_amount <= amount`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// 0 表示尚未入库
    pub id: i64,
    pub contract_id: i64,
    pub user_id: i64,
    pub stock_code: String,
    pub amount: i64,
    /// 挂单卖出冻结的股数
    pub freeze_amount: i64,
    /// 加权平均成本价
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// 首次买入建仓
    pub fn open(contract_id: i64, user_id: i64, stock_code: &str, amount: i64, price: f64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            contract_id,
            user_id,
            stock_code: stock_code.to_string(),
            amount,
            freeze_amount: 0,
            price,
            created_at: now,
            updated_at: now,
        }
    }

    /// 可卖数量
    pub fn sellable(&self) -> i64 {
        (self.amount - self.freeze_amount).max(0)
    }

    /// 持仓成本
    pub fn cost_basis(&self) -> f64 {
        self.price * self.amount as f64
    }

    /// 按市价计算的浮动盈亏
    pub fn unrealized_profit(&self, market_price: f64) -> f64 {
        (market_price - self.price) * self.amount as f64
    }

    /// 买入成交，按加权平均重算成本价
    pub fn apply_buy(&mut self, amount: i64, price: f64) -> Result<(), PositionError> {
        if amount <= 0 || !price.is_finite() || price <= 0.0 {
            return Err(PositionError::InvalidParameter(format!(
                "买入成交无效: amount={}, price={}",
                amount, price
            )));
        }
        let total = self.amount + amount;
        self.price = (self.price * self.amount as f64 + price * amount as f64) / total as f64;
        self.amount = total;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 挂卖单冻结
    pub fn freeze(&mut self, amount: i64) -> Result<(), PositionError> {
        if amount <= 0 {
            return Err(PositionError::InvalidParameter(format!("冻结数量无效: {}", amount)));
        }
        if amount > self.sellable() {
            return Err(PositionError::InsufficientSellable {
                required: amount,
                sellable: self.sellable(),
            });
        }
        self.freeze_amount += amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 解冻，最多解冻到 0
    pub fn unfreeze(&mut self, amount: i64) {
        if amount <= 0 {
            return;
        }
        self.freeze_amount = (self.freeze_amount - amount).max(0);
        self.updated_at = Utc::now();
    }

    /// 卖出成交：扣减持仓与冻结，并解冻未成交部分
    ///
    /// `frozen` 为该笔卖单下单时冻结的数量。
    pub fn apply_sell(&mut self, filled: i64, price: f64, frozen: i64) -> Result<SellResult, PositionError> {
        if filled < 0 || filled > frozen {
            return Err(PositionError::InvalidParameter(format!(
                "卖出成交数量无效: filled={}, frozen={}",
                filled, frozen
            )));
        }
        if filled > self.amount {
            return Err(PositionError::InsufficientAmount {
                required: filled,
                amount: self.amount,
            });
        }
        let profit = round2((price - self.price) * filled as f64);
        self.amount -= filled;
        self.freeze_amount = (self.freeze_amount - frozen).max(0).min(self.amount);
        self.updated_at = Utc::now();
        Ok(SellResult {
            profit,
            closed: self.amount == 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_weighted_average_price() {
        let mut position = Position::open(1, 7, "600000", 1000, 10.0);
        position.apply_buy(500, 13.0).unwrap();
        assert_eq!(position.amount, 1500);
        assert_relative_eq!(position.price, 11.0);
        assert!(position.apply_buy(0, 13.0).is_err());
    }

    #[test]
    fn test_freeze_respects_sellable() {
        let mut position = Position::open(1, 7, "600000", 1000, 10.0);
        position.freeze(600).unwrap();
        assert_eq!(position.sellable(), 400);
        assert!(matches!(
            position.freeze(500),
            Err(PositionError::InsufficientSellable { required: 500, sellable: 400 })
        ));
        position.unfreeze(1000);
        assert_eq!(position.freeze_amount, 0);
    }

    #[test]
    fn test_partial_sell_releases_unfilled_freeze() {
        let mut position = Position::open(1, 7, "600000", 1000, 10.0);
        position.freeze(600).unwrap();
        let result = position.apply_sell(400, 12.0, 600).unwrap();
        assert_relative_eq!(result.profit, 800.0);
        assert!(!result.closed);
        assert_eq!(position.amount, 600);
        assert_eq!(position.freeze_amount, 0);
    }

    #[test]
    fn test_full_sell_closes_position() {
        let mut position = Position::open(1, 7, "600000", 1000, 10.0);
        position.freeze(1000).unwrap();
        let result = position.apply_sell(1000, 9.5, 1000).unwrap();
        assert_relative_eq!(result.profit, -500.0);
        assert!(result.closed);
        assert_eq!(position.freeze_amount, 0);
    }
}
