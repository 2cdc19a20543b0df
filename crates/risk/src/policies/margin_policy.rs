//! 保证金风险分级策略

use rust_margin_domain::enums::RiskLevel;

/// 保证金风险分级
///
/// 权益 = 保证金 + 浮动盈亏：
/// - 低于 `本金 * close_pct` 为平仓线
/// - 低于 `本金 * warn_pct` 为警戒线
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginPolicy {
    pub warn_pct: f64,
    pub close_pct: f64,
}

impl MarginPolicy {
    pub fn new(warn_pct: f64, close_pct: f64) -> Self {
        Self { warn_pct, close_pct }
    }

    pub fn classify(&self, money: f64, profit: f64, init_money: f64) -> RiskLevel {
        classify_risk(money, profit, init_money, self.warn_pct, self.close_pct)
    }
}

/// 纯函数，只依赖入参
///
/// 对同一组比例，权益越低风险等级只会相同或更高。
pub fn classify_risk(
    money: f64,
    profit: f64,
    init_money: f64,
    warn_pct: f64,
    close_pct: f64,
) -> RiskLevel {
    let equity = money + profit;
    if equity < init_money * close_pct {
        RiskLevel::Close
    } else if equity < init_money * warn_pct {
        RiskLevel::Warn
    } else {
        RiskLevel::Healthy
    }
}
