//! 多账户分单
//!
//! - 买入按资金分配：优先整单交给单个资金充足的券商，否则按优先级逐个按手数切分；
//! - 卖出按持仓分配：按手数切分，零股只分给零股余数恰好相同的券商。

use thiserror::Error;

use rust_margin_domain::enums::EntrustSide;
use rust_margin_domain::value_objects::{floor_to_lot, odd_lot, FeeSchedule};

use super::broker_pool::BrokerSnapshot;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("没有可用的券商通道")]
    NoBroker,

    #[error("通道资金不足: 需要 {required} 股, 可分配 {allocatable} 股")]
    InsufficientFunds { required: i64, allocatable: i64 },

    #[error("通道持仓不足: 需要 {required} 股, 可分配 {allocatable} 股")]
    InsufficientHoldings { required: i64, allocatable: i64 },

    #[error("分单参数无效: {0}")]
    InvalidParameter(String),
}

/// 分配给某个券商的数量
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub broker_id: i64,
    pub amount: i64,
    /// 仅供参考，结算按实际成交计费
    pub fee: f64,
}

#[derive(Debug, Clone)]
pub struct Allocator {
    lot_size: i64,
    fees: FeeSchedule,
}

impl Allocator {
    pub fn new(lot_size: i64, fees: FeeSchedule) -> Self {
        Self {
            lot_size: lot_size.max(1),
            fees,
        }
    }

    pub fn allocate(
        &self,
        side: EntrustSide,
        brokers: &[BrokerSnapshot],
        stock_code: &str,
        price: f64,
        amount: i64,
    ) -> Result<Vec<Allocation>, AllocationError> {
        if amount <= 0 || !price.is_finite() || price <= 0.0 {
            return Err(AllocationError::InvalidParameter(format!(
                "price={}, amount={}",
                price, amount
            )));
        }
        if brokers.is_empty() {
            return Err(AllocationError::NoBroker);
        }
        let mut ordered: Vec<&BrokerSnapshot> = brokers.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.broker_id.cmp(&b.broker_id)));

        match side {
            EntrustSide::Buy => self.allocate_buy(&ordered, price, amount),
            EntrustSide::Sell => self.allocate_sell(&ordered, stock_code, amount),
        }
    }

    fn allocate_buy(
        &self,
        brokers: &[&BrokerSnapshot],
        price: f64,
        amount: i64,
    ) -> Result<Vec<Allocation>, AllocationError> {
        let fee = self.fees.fee(EntrustSide::Buy, price, amount);
        let cost = price * amount as f64 + fee;

        if let Some(single) = brokers.iter().find(|b| b.available_funds > cost) {
            return Ok(vec![Allocation {
                broker_id: single.broker_id,
                amount,
                fee,
            }]);
        }

        let mut remaining = amount;
        let mut allocations = Vec::new();
        for broker in brokers {
            if remaining == 0 {
                break;
            }
            let budget = broker.available_funds - fee;
            if budget <= 0.0 {
                continue;
            }
            let affordable = floor_to_lot((budget / price).floor() as i64, self.lot_size);
            let take = affordable.min(remaining);
            if take <= 0 {
                continue;
            }
            allocations.push(Allocation {
                broker_id: broker.broker_id,
                amount: take,
                fee: 0.0,
            });
            remaining -= take;
        }

        if remaining > 0 {
            return Err(AllocationError::InsufficientFunds {
                required: amount,
                allocatable: amount - remaining,
            });
        }
        Ok(allocations)
    }

    fn allocate_sell(
        &self,
        brokers: &[&BrokerSnapshot],
        stock_code: &str,
        amount: i64,
    ) -> Result<Vec<Allocation>, AllocationError> {
        let odd = odd_lot(amount, self.lot_size);
        let mut odd_granted = odd == 0;
        let mut remaining = amount;
        let mut allocations = Vec::new();

        for broker in brokers {
            if remaining == 0 {
                break;
            }
            let sellable = broker.sellable_of(stock_code);
            if sellable <= 0 {
                continue;
            }
            let whole_remaining = floor_to_lot(remaining, self.lot_size);
            let mut take = floor_to_lot(sellable, self.lot_size).min(whole_remaining);
            // 零股只能由余数相同的券商一次卖出
            if !odd_granted && odd_lot(sellable, self.lot_size) == odd {
                take += odd;
                odd_granted = true;
            }
            if take <= 0 {
                continue;
            }
            allocations.push(Allocation {
                broker_id: broker.broker_id,
                amount: take,
                fee: 0.0,
            });
            remaining -= take;
        }

        if remaining > 0 {
            return Err(AllocationError::InsufficientHoldings {
                required: amount,
                allocatable: amount - remaining,
            });
        }
        Ok(allocations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn funds(id: i64, priority: i32, available: f64) -> BrokerSnapshot {
        BrokerSnapshot {
            broker_id: id,
            priority,
            available_funds: available,
            sellable: HashMap::new(),
        }
    }

    fn holding(id: i64, priority: i32, sellable: i64) -> BrokerSnapshot {
        let mut map = HashMap::new();
        map.insert("600000".to_string(), sellable);
        BrokerSnapshot {
            broker_id: id,
            priority,
            available_funds: 0.0,
            sellable: map,
        }
    }

    fn allocator() -> Allocator {
        Allocator::new(100, FeeSchedule::default())
    }

    fn total(allocations: &[Allocation]) -> i64 {
        allocations.iter().map(|a| a.amount).sum()
    }

    #[test]
    fn test_single_broker_takes_whole_buy() {
        let result = allocator()
            .allocate(EntrustSide::Buy, &[funds(1, 0, 100_000.0)], "600000", 10.0, 1000)
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].broker_id, 1);
        assert_eq!(result[0].amount, 1000);
        assert!(result[0].fee > 0.0);
    }

    #[test]
    fn test_any_rich_broker_beats_priority_split() {
        let brokers = [funds(1, 9, 5_000.0), funds(2, 1, 20_000.0)];
        let result = allocator()
            .allocate(EntrustSide::Buy, &brokers, "600000", 10.0, 1000)
            .unwrap();
        assert_eq!(result, vec![Allocation { broker_id: 2, amount: 1000, fee: 5.2 }]);
    }

    #[test]
    fn test_buy_split_by_priority_in_whole_lots() {
        let brokers = [funds(1, 9, 5_000.0), funds(2, 1, 8_000.0)];
        let result = allocator()
            .allocate(EntrustSide::Buy, &brokers, "600000", 10.0, 1000)
            .unwrap();
        // (5000 - 5.2) / 10 = 499 股 -> 400 股
        assert_eq!(result[0], Allocation { broker_id: 1, amount: 400, fee: 0.0 });
        assert_eq!(result[1], Allocation { broker_id: 2, amount: 600, fee: 0.0 });
        assert_eq!(total(&result), 1000);
    }

    #[test]
    fn test_buy_never_exceeds_affordable_lots() {
        let brokers = [
            funds(1, 3, 3_333.0),
            funds(2, 2, 2_950.0),
            funds(3, 1, 50_000.0),
        ];
        let price = 9.87;
        let result = allocator()
            .allocate(EntrustSide::Buy, &brokers[..2], "600000", price, 500)
            .unwrap();
        for allocation in &result {
            let broker = brokers.iter().find(|b| b.broker_id == allocation.broker_id).unwrap();
            let cap = ((broker.available_funds / price / 100.0).floor() as i64) * 100;
            assert!(allocation.amount <= cap, "{:?} cap={}", allocation, cap);
        }
        assert_eq!(total(&result), 500);
    }

    #[test]
    fn test_buy_fails_when_channels_are_short() {
        let brokers = [funds(1, 1, 3_000.0), funds(2, 0, 3_000.0)];
        let err = allocator()
            .allocate(EntrustSide::Buy, &brokers, "600000", 10.0, 1000)
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::InsufficientFunds { required: 1000, allocatable: 400 }
        );
        assert_eq!(
            allocator()
                .allocate(EntrustSide::Buy, &[], "600000", 10.0, 100)
                .unwrap_err(),
            AllocationError::NoBroker
        );
    }

    #[test]
    fn test_sell_grants_odd_lot_to_matching_remainder() {
        let brokers = [holding(1, 9, 300), holding(2, 5, 250)];
        let result = allocator()
            .allocate(EntrustSide::Sell, &brokers, "600000", 10.0, 450)
            .unwrap();
        assert_eq!(result[0], Allocation { broker_id: 1, amount: 300, fee: 0.0 });
        assert_eq!(result[1], Allocation { broker_id: 2, amount: 150, fee: 0.0 });
    }

    #[test]
    fn test_sell_without_matching_odd_lot_fails() {
        let brokers = [holding(1, 9, 300), holding(2, 5, 230)];
        let err = allocator()
            .allocate(EntrustSide::Sell, &brokers, "600000", 10.0, 450)
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::InsufficientHoldings { required: 450, allocatable: 400 }
        );
    }

    #[test]
    fn test_sell_skips_brokers_without_the_stock() {
        let brokers = [funds(1, 9, 1_000_000.0), holding(2, 1, 1000)];
        let result = allocator()
            .allocate(EntrustSide::Sell, &brokers, "600000", 10.0, 800)
            .unwrap();
        assert_eq!(result, vec![Allocation { broker_id: 2, amount: 800, fee: 0.0 }]);
    }
}
