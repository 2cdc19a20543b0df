//! 模拟盘流程：内部撮合、校验、撤单与强平

mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use chrono::{Duration, Utc};

use common::Engine;
use rust_margin_core::config::RiskConfig;
use rust_margin_domain::entities::{Contract, Entrust, EntrustError};
use rust_margin_domain::enums::{EntrustSide, EntrustStatus, LedgerKind, PriceType};
use rust_margin_domain::traits::{CacheStore, EntrustRepository, LedgerRepository, PositionRepository};
use rust_margin_execution::{OrderError, PlaceOrderRequest, WithdrawResult};
use rust_margin_risk::monitor::keys;
use rust_margin_risk::{ContractRiskMonitor, RiskAction};

fn request(
    contract_id: i64,
    stock_code: &str,
    side: EntrustSide,
    price_type: PriceType,
    price: f64,
    amount: i64,
) -> PlaceOrderRequest {
    PlaceOrderRequest {
        contract_id,
        stock_code: stock_code.to_string(),
        side,
        price_type,
        price,
        amount,
    }
}

fn limit_buy(contract_id: i64, price: f64, amount: i64) -> PlaceOrderRequest {
    request(contract_id, "600000", EntrustSide::Buy, PriceType::Limit, price, amount)
}

fn limit_sell(contract_id: i64, price: f64, amount: i64) -> PlaceOrderRequest {
    request(contract_id, "600000", EntrustSide::Sell, PriceType::Limit, price, amount)
}

async fn load(engine: &Engine, id: i64) -> Entrust {
    EntrustRepository::find_by_id(&engine.store, id)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_local_buy_waits_for_price_then_fills() {
    let engine = Engine::new(false).await;
    let contract_id = engine.seed_contract().await;
    engine.quotes.set_price("600000", 10.0, 10.0);

    let placed = engine.orders.place(limit_buy(contract_id, 10.0, 1000)).await.unwrap();
    assert_eq!(placed.status, EntrustStatus::Unfilled);
    assert_relative_eq!(engine.contract(contract_id).await.val_money, 489_994.8, epsilon = 1e-6);

    engine.quotes.set_price("600000", 10.2, 10.0);
    let summary = engine.matcher.run_once().await.unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.filled, 0);

    engine.quotes.set_price("600000", 9.9, 10.0);
    assert_eq!(engine.matcher.run_once().await.unwrap().filled, 1);

    let entrust = load(&engine, placed.entrust_id).await;
    assert_eq!(entrust.status, EntrustStatus::Filled);
    assert_relative_eq!(entrust.deal_price, 9.9);

    let positions = engine.store.find_by_contract(contract_id).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].amount, 1000);
    assert_relative_eq!(positions[0].price, 9.9);

    let contract = engine.contract(contract_id).await;
    assert_relative_eq!(contract.money, 99_994.8, epsilon = 1e-6);
    assert_relative_eq!(contract.val_money, 490_094.8, epsilon = 1e-6);

    // 已终结的委托不再参与撮合
    assert_eq!(engine.matcher.run_once().await.unwrap().checked, 0);
}

#[tokio::test]
async fn test_local_sell_books_fee_and_profit() {
    let engine = Engine::new(false).await;
    let contract_id = engine.seed_contract().await;
    let position_id = engine.seed_position(contract_id, "600000", 1000, 10.0).await;
    engine.quotes.set_price("600000", 10.5, 10.0);

    let placed = engine.orders.place(limit_sell(contract_id, 11.0, 500)).await.unwrap();
    assert_eq!(placed.status, EntrustStatus::Unfilled);
    let position = PositionRepository::find_by_id(&engine.store, position_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.freeze_amount, 500);
    assert_eq!(engine.matcher.run_once().await.unwrap().filled, 0);

    engine.quotes.set_price("600000", 11.0, 10.0);
    assert_eq!(engine.matcher.run_once().await.unwrap().filled, 1);

    let position = PositionRepository::find_by_id(&engine.store, position_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.amount, 500);
    assert_eq!(position.freeze_amount, 0);

    let contract = engine.contract(contract_id).await;
    assert_relative_eq!(contract.money, 100_489.39, epsilon = 1e-6);

    let fees = engine.store.find_fees_by_contract(contract_id).await.unwrap();
    let sell_fee = fees.iter().find(|f| f.kind == LedgerKind::SellFee).unwrap();
    assert_relative_eq!(sell_fee.amount, -10.61, epsilon = 1e-9);
    let profit = fees.iter().find(|f| f.kind == LedgerKind::Profit).unwrap();
    assert_relative_eq!(profit.amount, 500.0);
}

#[tokio::test]
async fn test_selling_whole_position_closes_it() {
    let engine = Engine::new(false).await;
    let contract_id = engine.seed_contract().await;
    engine.seed_position(contract_id, "600000", 1000, 10.0).await;
    engine.quotes.set_price("600000", 10.0, 10.0);

    engine.orders.place(limit_sell(contract_id, 10.0, 1000)).await.unwrap();
    assert_eq!(engine.matcher.run_once().await.unwrap().filled, 1);
    assert!(engine.store.find_by_contract(contract_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_local_withdraw_releases_frozen_shares() {
    let engine = Engine::new(false).await;
    let contract_id = engine.seed_contract().await;
    let position_id = engine.seed_position(contract_id, "600000", 1000, 10.0).await;
    engine.quotes.set_price("600000", 10.0, 10.0);

    let placed = engine.orders.place(limit_sell(contract_id, 10.5, 600)).await.unwrap();
    let result = engine.orders.withdraw(placed.entrust_id).await.unwrap();
    assert_eq!(result, WithdrawResult::Withdrawn);
    assert_eq!(load(&engine, placed.entrust_id).await.status, EntrustStatus::Withdrawn);

    let position = PositionRepository::find_by_id(&engine.store, position_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.freeze_amount, 0);

    let again = engine.orders.withdraw(placed.entrust_id).await;
    assert!(matches!(
        again,
        Err(OrderError::Entrust(EntrustError::AlreadyTerminal(EntrustStatus::Withdrawn)))
    ));
}

#[tokio::test]
async fn test_rejected_orders_leave_no_entrust() {
    let engine = Engine::new(false).await;
    let contract_id = engine.seed_contract().await;
    engine.seed_position(contract_id, "600000", 1050, 10.0).await;
    engine.quotes.set_price("600000", 10.0, 10.0);

    let cases = vec![
        (limit_buy(contract_id, 10.0, 150), "odd lot buy"),
        (limit_buy(contract_id, 10.0, 0), "zero amount"),
        (limit_buy(contract_id, 12.0, 100), "above band"),
        (limit_buy(contract_id, 10.0, 100_000), "insufficient funds"),
        (limit_sell(contract_id, 10.0, 50), "odd lot sell"),
        (limit_sell(contract_id, 10.0, 1100), "oversell"),
        (
            request(contract_id, "000001", EntrustSide::Sell, PriceType::Limit, 10.0, 100),
            "no position",
        ),
        (
            request(contract_id, "000002", EntrustSide::Buy, PriceType::Market, 0.0, 100),
            "no quote",
        ),
        (limit_buy(contract_id + 1, 10.0, 100), "unknown contract"),
    ];
    for (req, name) in cases {
        let result = engine.orders.place(req).await;
        assert!(result.is_err(), "{} should be rejected", name);
    }

    assert!(matches!(
        engine.orders.place(limit_buy(contract_id, 12.0, 100)).await,
        Err(OrderError::PriceOutOfBand { .. })
    ));
    assert!(matches!(
        engine.orders.place(limit_buy(contract_id, 10.0, 100_000)).await,
        Err(OrderError::InsufficientFunds { .. })
    ));
    assert!(matches!(
        engine.orders.place(limit_sell(contract_id, 10.0, 1100)).await,
        Err(OrderError::InsufficientSellable {
            required: 1100,
            sellable: 1050
        })
    ));
    assert!(matches!(
        engine
            .orders
            .place(request(contract_id, "000002", EntrustSide::Buy, PriceType::Market, 0.0, 100))
            .await,
        Err(OrderError::QuoteUnavailable(_))
    ));

    let since = Utc::now() - Duration::days(1);
    assert!(engine.store.find_since(since).await.unwrap().is_empty());
    assert_relative_eq!(engine.contract(contract_id).await.val_money, 500_000.0);

    // 零股只能一次卖完
    let placed = engine.orders.place(limit_sell(contract_id, 10.0, 1050)).await.unwrap();
    assert_eq!(placed.status, EntrustStatus::Unfilled);
}

#[tokio::test]
async fn test_blocked_contract_can_only_sell() {
    let engine = Engine::new(false).await;
    let contract_id = engine.seed_contract().await;
    engine.seed_position(contract_id, "600000", 1000, 10.0).await;
    engine.quotes.set_price("600000", 10.0, 10.0);
    engine
        .cache
        .set_ex(&keys::withdraw_blocked(contract_id), "1", 3600)
        .await
        .unwrap();

    assert!(matches!(
        engine.orders.place(limit_buy(contract_id, 10.0, 100)).await,
        Err(OrderError::BuyBlocked(id)) if id == contract_id
    ));
    assert!(engine.orders.place(limit_sell(contract_id, 10.0, 100)).await.is_ok());
}

#[tokio::test]
async fn test_forced_liquidation_cancels_and_sells_everything() {
    let engine = Engine::new(false).await;
    let contract_id = engine
        .store
        .insert_contract(Contract::new(0, 7, 10_000.0, 4.0))
        .await;
    engine.seed_position(contract_id, "600000", 2000, 10.0).await;
    engine.seed_position(contract_id, "000001", 1000, 20.0).await;
    engine.quotes.set_price("600000", 10.0, 10.0);
    engine.quotes.set_price("000001", 20.0, 20.0);

    let open_buy = engine
        .orders
        .place(request(contract_id, "000001", EntrustSide::Buy, PriceType::Limit, 19.5, 100))
        .await
        .unwrap();
    assert_eq!(open_buy.status, EntrustStatus::Unfilled);

    let monitor = ContractRiskMonitor::new(
        Arc::new(engine.store.clone()),
        Arc::new(engine.store.clone()),
        Arc::new(engine.quotes.clone()),
        engine.cache.clone(),
        Arc::new(engine.store.clone()),
        engine.orders.clone(),
        &RiskConfig {
            warn_pct: 0.5,
            close_pct: 0.3,
            close_flag_ttl_hours: 6,
        },
        0.01,
    );

    // 权益 = 10,000 + (6 - 10) * 2,000 = 2,000，低于平仓线 3,000
    engine.quotes.set_price("600000", 6.0, 6.5);
    let contract = engine.contract(contract_id).await;
    let action = monitor.check_contract(&contract, Utc::now()).await.unwrap();
    assert_eq!(
        action,
        RiskAction::Liquidated {
            cancelled: 1,
            sells: 2
        }
    );
    assert_eq!(load(&engine, open_buy.entrust_id).await.status, EntrustStatus::Withdrawn);
    assert!(monitor.is_withdraw_blocked(contract_id).await.unwrap());
    assert!(matches!(
        engine.orders.place(limit_buy(contract_id, 6.0, 100)).await,
        Err(OrderError::BuyBlocked(_))
    ));

    let sells: Vec<Entrust> = engine
        .store
        .find_open_local_entrusts()
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.contract_id == contract_id)
        .collect();
    assert_eq!(sells.len(), 2);
    assert!(sells
        .iter()
        .all(|e| e.side == EntrustSide::Sell && e.price_type == PriceType::Market));

    let contract = engine.contract(contract_id).await;
    assert_eq!(
        monitor.check_contract(&contract, Utc::now()).await.unwrap(),
        RiskAction::AlreadyFlagged
    );

    assert_eq!(engine.matcher.run_once().await.unwrap().filled, 2);
    assert!(engine.store.find_by_contract(contract_id).await.unwrap().is_empty());

    // 亏损 8,000，卖出手续费 17.24 + 26.40
    let contract = engine.contract(contract_id).await;
    assert_relative_eq!(contract.money, 1_956.36, epsilon = 1e-6);
}
