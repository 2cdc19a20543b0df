//! 行情快照

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 单只股票的最新行情
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub stock_code: String,
    /// 最新价
    pub price: f64,
    /// 昨收价，用于计算涨跌停价
    pub pre_close: f64,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(stock_code: &str, price: f64, pre_close: f64) -> Self {
        Self {
            stock_code: stock_code.to_string(),
            price,
            pre_close,
            updated_at: Utc::now(),
        }
    }

    /// 价格是否可用
    pub fn is_valid(&self, floor: f64) -> bool {
        self.price.is_finite() && self.price >= floor
    }

    /// 涨跌停价格区间，昨收无效时返回 None
    pub fn limit_band(&self, pct: f64) -> Option<(f64, f64)> {
        if !self.pre_close.is_finite() || self.pre_close <= 0.0 {
            return None;
        }
        let low = ((self.pre_close * (1.0 - pct)) * 100.0).round() / 100.0;
        let high = ((self.pre_close * (1.0 + pct)) * 100.0).round() / 100.0;
        Some((low, high))
    }
}
