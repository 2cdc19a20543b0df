//! 模拟盘内部撮合
//!
//! 不走券商通道的委托按最新价撮合：市价单直接成交；
//! 限价买单在最新价不高于委托价时成交，限价卖单在最新价不低于委托价时成交，
//! 成交价均为最新价，整笔成交。

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error};

use rust_margin_domain::entities::{Entrust, EntrustOutcome};
use rust_margin_domain::enums::{EntrustSide, EntrustStatus, PriceType};
use rust_margin_domain::traits::{EntrustRepository, QuoteProvider};

use super::idempotency_guard::IdempotencyGuard;
use super::settlement_engine::{SettlementEngine, SettlementReport};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchSummary {
    pub checked: usize,
    pub filled: usize,
    pub no_quote: usize,
}

/// 是否满足撮合条件
pub fn crosses(entrust: &Entrust, market_price: f64) -> bool {
    match (entrust.price_type, entrust.side) {
        (PriceType::Market, _) => true,
        (PriceType::Limit, EntrustSide::Buy) => market_price <= entrust.price,
        (PriceType::Limit, EntrustSide::Sell) => market_price >= entrust.price,
    }
}

pub struct AutoMatcher {
    entrusts: Arc<dyn EntrustRepository>,
    quotes: Arc<dyn QuoteProvider>,
    settlement: Arc<SettlementEngine>,
    guard: Arc<IdempotencyGuard>,
    price_floor: f64,
}

impl AutoMatcher {
    pub fn new(
        entrusts: Arc<dyn EntrustRepository>,
        quotes: Arc<dyn QuoteProvider>,
        settlement: Arc<SettlementEngine>,
        guard: Arc<IdempotencyGuard>,
        price_floor: f64,
    ) -> Self {
        Self {
            entrusts,
            quotes,
            settlement,
            guard,
            price_floor,
        }
    }

    pub async fn run_once(&self) -> Result<MatchSummary> {
        let mut summary = MatchSummary::default();
        let open = self.entrusts.find_open_local_entrusts().await?;
        for entrust in open
            .iter()
            .filter(|e| e.status == EntrustStatus::Unfilled)
        {
            summary.checked += 1;
            let quote = self
                .quotes
                .latest(&entrust.stock_code)
                .await?
                .filter(|q| q.is_valid(self.price_floor));
            let Some(quote) = quote else {
                summary.no_quote += 1;
                continue;
            };
            if !crosses(entrust, quote.price) {
                continue;
            }

            if !self.guard.acquire(entrust.id).await? {
                continue;
            }
            let result = self
                .settlement
                .settle(entrust, &EntrustOutcome::filled(entrust.amount, quote.price))
                .await;
            self.guard.release(entrust.id).await;

            match result {
                Ok(SettlementReport::Applied { .. }) => summary.filled += 1,
                Ok(SettlementReport::AlreadyTerminal) => {
                    debug!("委托已终结，跳过撮合: entrust_id={}", entrust.id)
                }
                Err(e) => error!("内部撮合结算失败: entrust_id={}, error={}", entrust.id, e),
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_margin_domain::entities::NewEntrust;

    fn entrust(side: EntrustSide, price_type: PriceType, price: f64) -> Entrust {
        Entrust::new(NewEntrust {
            contract_id: 1,
            user_id: 1,
            stock_code: "600000".to_string(),
            side,
            price_type,
            price,
            amount: 100,
            fee: 5.0,
            is_broker_entrust: false,
            position_id: Some(3),
        })
        .unwrap()
    }

    #[test]
    fn test_limit_orders_cross_on_the_right_side() {
        let buy = entrust(EntrustSide::Buy, PriceType::Limit, 10.0);
        assert!(crosses(&buy, 9.99));
        assert!(crosses(&buy, 10.0));
        assert!(!crosses(&buy, 10.01));

        let sell = entrust(EntrustSide::Sell, PriceType::Limit, 10.0);
        assert!(crosses(&sell, 10.01));
        assert!(!crosses(&sell, 9.99));

        let market = entrust(EntrustSide::Sell, PriceType::Market, 10.0);
        assert!(crosses(&market, 1.0));
    }
}
