//! 交易费用

use serde::{Deserialize, Serialize};

use crate::enums::EntrustSide;

/// 金额保留两位小数
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 费率表
///
/// 佣金双向收取且有最低收费；印花税仅卖出收取；过户费双向收取。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub commission_rate: f64,
    pub min_commission: f64,
    pub stamp_tax_rate: f64,
    pub transfer_fee_rate: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            commission_rate: 0.0003,
            min_commission: 5.0,
            stamp_tax_rate: 0.001,
            transfer_fee_rate: 0.00002,
        }
    }
}

impl FeeSchedule {
    /// 计算一笔成交的总费用
    pub fn fee(&self, side: EntrustSide, price: f64, amount: i64) -> f64 {
        if amount <= 0 || price <= 0.0 {
            return 0.0;
        }
        let turnover = price * amount as f64;
        let commission = (turnover * self.commission_rate).max(self.min_commission);
        let transfer = turnover * self.transfer_fee_rate;
        let stamp = match side {
            EntrustSide::Buy => 0.0,
            EntrustSide::Sell => turnover * self.stamp_tax_rate,
        };
        round2(commission + transfer + stamp)
    }

    /// 买入所需资金（成交额 + 费用）
    pub fn buy_cost(&self, price: f64, amount: i64) -> f64 {
        round2(price * amount as f64 + self.fee(EntrustSide::Buy, price, amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_minimum_commission_applies() {
        let schedule = FeeSchedule::default();
        // 10000 * 0.0003 = 3 < 5，按最低 5 元；过户费 0.2
        assert_relative_eq!(schedule.fee(EntrustSide::Buy, 10.0, 1000), 5.2);
    }

    #[test]
    fn test_sell_includes_stamp_tax() {
        let schedule = FeeSchedule::default();
        // 佣金 30 + 过户费 2 + 印花税 100
        assert_relative_eq!(schedule.fee(EntrustSide::Sell, 10.0, 10_000), 132.0);
    }

    #[test]
    fn test_zero_amount_has_no_fee() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.fee(EntrustSide::Buy, 10.0, 0), 0.0);
        assert_relative_eq!(schedule.buy_cost(10.0, 1000), 10_005.2);
    }
}
