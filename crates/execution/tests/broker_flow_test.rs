//! 券商通道流程：分单、报单、对账、结算、补偿、撤单

mod common;

use approx::assert_relative_eq;

use common::Engine;
use rust_margin_domain::entities::{Entrust, EntrustOutcome};
use rust_margin_domain::enums::{
    BrokerEntrustStatus, EntrustSide, EntrustStatus, LedgerKind, NotificationKind, PriceType,
};
use rust_margin_domain::traits::{EntrustRepository, LedgerRepository, PositionRepository};
use rust_margin_execution::{PlaceOrderRequest, SettlementReport, WithdrawResult};

fn buy(contract_id: i64, price: f64, amount: i64) -> PlaceOrderRequest {
    PlaceOrderRequest {
        contract_id,
        stock_code: "600000".to_string(),
        side: EntrustSide::Buy,
        price_type: PriceType::Limit,
        price,
        amount,
    }
}

async fn load(engine: &Engine, id: i64) -> Entrust {
    EntrustRepository::find_by_id(&engine.store, id)
        .await
        .unwrap()
        .unwrap()
}

fn child_amount(entrust: &Entrust, broker_id: i64) -> i64 {
    entrust
        .broker_entrusts
        .iter()
        .filter(|c| c.broker_id == broker_id)
        .map(|c| c.amount)
        .sum()
}

fn entrust_no(entrust: &Entrust, broker_id: i64) -> String {
    entrust
        .broker_entrusts
        .iter()
        .find(|c| c.broker_id == broker_id)
        .and_then(|c| c.entrust_no.clone())
        .unwrap()
}

/// 两个券商：1 号优先级高、资金 5,000；2 号资金 8,000
async fn split_engine() -> (Engine, i64) {
    let engine = Engine::new(true).await;
    let contract_id = engine.seed_contract().await;
    engine.register_broker(1, 9, 5_000.0).await;
    engine.register_broker(2, 1, 8_000.0).await;
    assert_eq!(engine.pool.reconnect().await.unwrap().connected, 2);
    engine.quotes.set_price("600000", 10.0, 10.0);
    (engine, contract_id)
}

#[tokio::test]
async fn test_single_broker_takes_whole_order() {
    let engine = Engine::new(true).await;
    let contract_id = engine.seed_contract().await;
    engine.register_broker(1, 10, 100_000.0).await;
    engine.pool.reconnect().await.unwrap();
    engine.quotes.set_price("600000", 10.0, 10.0);

    let placed = engine.orders.place(buy(contract_id, 10.0, 1000)).await.unwrap();
    assert_eq!(placed.status, EntrustStatus::Reported);

    let entrust = load(&engine, placed.entrust_id).await;
    assert_eq!(entrust.broker_entrusts.len(), 1);
    let child = &entrust.broker_entrusts[0];
    assert_eq!(child.broker_id, 1);
    assert_eq!(child.amount, 1000);
    assert_eq!(child.status, BrokerEntrustStatus::Reported);
    assert!(child.entrust_no.is_some());

    let sent = engine.gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.holder, "A1");
    assert_eq!(sent[0].1.amount, 1000);

    // 10,000 + 手续费 5.2 已从可用资金占用
    assert_relative_eq!(engine.contract(contract_id).await.val_money, 489_994.8, epsilon = 1e-6);
}

#[tokio::test]
async fn test_order_split_across_brokers_sums_to_order() {
    let (engine, contract_id) = split_engine().await;

    let placed = engine.orders.place(buy(contract_id, 10.0, 1000)).await.unwrap();
    assert_eq!(placed.status, EntrustStatus::Reported);

    let entrust = load(&engine, placed.entrust_id).await;
    assert_eq!(child_amount(&entrust, 1), 400);
    assert_eq!(child_amount(&entrust, 2), 600);
    assert_eq!(entrust.broker_entrusts.iter().map(|c| c.amount).sum::<i64>(), 1000);
}

#[tokio::test]
async fn test_failing_broker_is_evicted_and_skipped_by_allocator() {
    let engine = Engine::new(true).await;
    let contract_id = engine.seed_contract().await;
    engine.register_broker(1, 1, 100_000.0).await;
    engine.register_broker(2, 9, 100_000.0).await;
    engine.pool.reconnect().await.unwrap();
    engine.quotes.set_price("600000", 10.0, 10.0);

    engine.gateway.fail_queries(2, true);
    let mut evicted = 0;
    for _ in 0..4 {
        evicted += engine.reconciler.run_once().await.unwrap().evicted;
    }
    assert_eq!(evicted, 1);
    assert!(!engine.pool.contains(2).await);
    assert_eq!(engine.pool.len().await, 1);

    let placed = engine.orders.place(buy(contract_id, 10.0, 1000)).await.unwrap();
    let entrust = load(&engine, placed.entrust_id).await;
    assert_eq!(entrust.broker_entrusts.len(), 1);
    assert_eq!(entrust.broker_entrusts[0].broker_id, 1);

    // 查询仍失败时重连不会放回连接池
    assert_eq!(engine.pool.reconnect().await.unwrap().failed, 1);
    engine.gateway.fail_queries(2, false);
    assert_eq!(engine.pool.reconnect().await.unwrap().connected, 1);
    assert!(engine.pool.contains(2).await);
}

#[tokio::test]
async fn test_fill_settles_once_after_every_child_is_terminal() {
    let (engine, contract_id) = split_engine().await;
    let position_id = engine.seed_position(contract_id, "600000", 1000, 9.0).await;

    let placed = engine.orders.place(buy(contract_id, 10.0, 1000)).await.unwrap();
    let entrust = load(&engine, placed.entrust_id).await;
    let (no1, no2) = (entrust_no(&entrust, 1), entrust_no(&entrust, 2));

    engine.gateway.report(&no1, "已成", 400, 10.0);
    let first = engine.reconciler.run_once().await.unwrap();
    assert_eq!(first.children_updated, 1);
    assert_eq!(first.waiting, 1);
    assert_eq!(first.settled, 0);
    assert_eq!(load(&engine, placed.entrust_id).await.status, EntrustStatus::Reported);

    engine.gateway.report(&no2, "已成", 600, 10.02);
    let second = engine.reconciler.run_once().await.unwrap();
    assert_eq!(second.settled, 1);

    let settled = load(&engine, placed.entrust_id).await;
    assert_eq!(settled.status, EntrustStatus::Filled);
    assert_eq!(settled.deal_amount, 1000);
    assert_eq!(settled.deal_amount, settled.children_deal_amount());
    // 买入取最高成交价
    assert_relative_eq!(settled.deal_price, 10.02);

    let position = PositionRepository::find_by_id(&engine.store, position_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.amount, 2000);
    assert_relative_eq!(position.price, 9.51, epsilon = 1e-9);

    let contract = engine.contract(contract_id).await;
    assert_relative_eq!(contract.money, 99_994.8, epsilon = 1e-6);
    assert_relative_eq!(contract.val_money, 480_974.8, epsilon = 1e-6);

    let fees = engine.store.find_fees_by_contract(contract_id).await.unwrap();
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].kind, LedgerKind::BuyFee);

    // 再次对账不会重复结算
    assert_eq!(engine.reconciler.run_once().await.unwrap().settled, 0);
    let report = engine
        .settlement
        .settle(&settled, &EntrustOutcome::filled(1000, 10.02))
        .await
        .unwrap();
    assert_eq!(report, SettlementReport::AlreadyTerminal);
    assert_eq!(engine.store.find_fees_by_contract(contract_id).await.unwrap().len(), 1);
    let position = PositionRepository::find_by_id(&engine.store, position_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.amount, 2000);
}

#[tokio::test]
async fn test_split_sell_with_odd_lot_fills_and_closes_position() {
    let engine = Engine::new(true).await;
    let contract_id = engine.seed_contract().await;
    let position_id = engine.seed_position(contract_id, "600000", 450, 10.0).await;
    engine.register_broker(1, 9, 0.0).await;
    engine.register_broker(2, 1, 0.0).await;
    engine.gateway.set_holding(1, "600000", 300);
    engine.gateway.set_holding(2, "600000", 150);
    assert_eq!(engine.pool.reconnect().await.unwrap().connected, 2);
    engine.quotes.set_price("600000", 10.8, 10.0);

    let placed = engine
        .orders
        .place(PlaceOrderRequest {
            contract_id,
            stock_code: "600000".to_string(),
            side: EntrustSide::Sell,
            price_type: PriceType::Limit,
            price: 10.8,
            amount: 450,
        })
        .await
        .unwrap();
    assert_eq!(placed.status, EntrustStatus::Reported);

    // 整手给 1 号，零股 50 随 2 号的 150 一起卖出
    let entrust = load(&engine, placed.entrust_id).await;
    assert_eq!(child_amount(&entrust, 1), 300);
    assert_eq!(child_amount(&entrust, 2), 150);
    let position = PositionRepository::find_by_id(&engine.store, position_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.freeze_amount, 450);

    engine.gateway.report(&entrust_no(&entrust, 1), "已成", 300, 10.85);
    engine.gateway.report(&entrust_no(&entrust, 2), "已成", 150, 10.82);
    assert_eq!(engine.reconciler.run_once().await.unwrap().settled, 1);

    let settled = load(&engine, placed.entrust_id).await;
    assert_eq!(settled.status, EntrustStatus::Filled);
    assert_eq!(settled.deal_amount, 450);
    assert_eq!(settled.deal_amount, settled.children_deal_amount());
    // 卖出取最低成交价
    assert_relative_eq!(settled.deal_price, 10.82);
    assert_relative_eq!(settled.fee, 9.97, epsilon = 1e-9);

    assert!(PositionRepository::find_by_id(&engine.store, position_id)
        .await
        .unwrap()
        .is_none());

    let fees = engine.store.find_fees_by_contract(contract_id).await.unwrap();
    assert_eq!(fees.len(), 2);
    assert_eq!(fees[0].kind, LedgerKind::SellFee);
    assert_relative_eq!(fees[0].amount, -9.97, epsilon = 1e-9);
    assert_eq!(fees[1].kind, LedgerKind::Profit);
    assert_relative_eq!(fees[1].amount, 369.0, epsilon = 1e-9);

    let contract = engine.contract(contract_id).await;
    assert_relative_eq!(contract.money, 100_359.03, epsilon = 1e-6);
    assert_relative_eq!(contract.val_money, 500_359.03, epsilon = 1e-6);
}

#[tokio::test]
async fn test_partial_fill_ignores_prices_below_floor() {
    let (engine, contract_id) = split_engine().await;
    let placed = engine.orders.place(buy(contract_id, 10.0, 1000)).await.unwrap();
    let entrust = load(&engine, placed.entrust_id).await;

    engine.gateway.report(&entrust_no(&entrust, 1), "已成", 400, 10.0);
    engine.gateway.report(&entrust_no(&entrust, 2), "部撤", 200, 0.001);
    assert_eq!(engine.reconciler.run_once().await.unwrap().settled, 1);

    let settled = load(&engine, placed.entrust_id).await;
    assert_eq!(settled.status, EntrustStatus::PartFilledPartWithdrawn);
    assert_eq!(settled.deal_amount, 600);
    assert_eq!(settled.deal_amount, settled.children_deal_amount());
    assert_relative_eq!(settled.deal_price, 10.0);

    let positions = engine.store.find_by_contract(contract_id).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].amount, 600);
}

#[tokio::test]
async fn test_all_children_rejected_cancels_and_releases_funds() {
    let (engine, contract_id) = split_engine().await;
    let placed = engine.orders.place(buy(contract_id, 10.0, 1000)).await.unwrap();
    let entrust = load(&engine, placed.entrust_id).await;

    engine.gateway.report(&entrust_no(&entrust, 1), "废单", 0, 0.0);
    engine.gateway.report(&entrust_no(&entrust, 2), "废单", 0, 0.0);
    engine.reconciler.run_once().await.unwrap();

    let settled = load(&engine, placed.entrust_id).await;
    assert_eq!(settled.status, EntrustStatus::Cancelled);
    assert_eq!(settled.deal_amount, 0);
    assert_relative_eq!(engine.contract(contract_id).await.val_money, 500_000.0);
}

#[tokio::test]
async fn test_commit_failure_leaves_entrust_for_next_tick() {
    let (engine, contract_id) = split_engine().await;
    let placed = engine.orders.place(buy(contract_id, 10.0, 1000)).await.unwrap();
    let entrust = load(&engine, placed.entrust_id).await;
    engine.gateway.report(&entrust_no(&entrust, 1), "已成", 400, 10.0);
    engine.gateway.report(&entrust_no(&entrust, 2), "已成", 600, 10.0);

    engine.store.set_fail_commits(true);
    assert_eq!(engine.reconciler.run_once().await.unwrap().settled, 0);
    assert_eq!(load(&engine, placed.entrust_id).await.status, EntrustStatus::Reported);
    assert!(engine.store.find_by_contract(contract_id).await.unwrap().is_empty());

    engine.store.set_fail_commits(false);
    assert_eq!(engine.reconciler.run_once().await.unwrap().settled, 1);
    assert_eq!(load(&engine, placed.entrust_id).await.status, EntrustStatus::Filled);
}

#[tokio::test]
async fn test_allocation_failure_cancels_and_restores_funds() {
    let engine = Engine::new(true).await;
    let contract_id = engine.seed_contract().await;
    engine.register_broker(1, 1, 1_000.0).await;
    engine.pool.reconnect().await.unwrap();
    engine.quotes.set_price("600000", 10.0, 10.0);

    let placed = engine.orders.place(buy(contract_id, 10.0, 1000)).await.unwrap();
    assert_eq!(placed.status, EntrustStatus::Cancelled);
    assert!(placed.remark.unwrap().contains("分单失败"));
    assert!(engine.gateway.sent().is_empty());
    assert_eq!(load(&engine, placed.entrust_id).await.status, EntrustStatus::Cancelled);
    assert_relative_eq!(engine.contract(contract_id).await.val_money, 500_000.0);
}

#[tokio::test]
async fn test_submission_failure_unfreezes_sell_and_logs_error() {
    let engine = Engine::new(true).await;
    let contract_id = engine.seed_contract().await;
    let position_id = engine.seed_position(contract_id, "600000", 1000, 10.0).await;
    engine.register_broker(1, 1, 0.0).await;
    engine.gateway.set_holding(1, "600000", 1000);
    engine.gateway.fail_sends(1);
    engine.pool.reconnect().await.unwrap();
    engine.quotes.set_price("600000", 10.0, 10.0);

    let placed = engine
        .orders
        .place(PlaceOrderRequest {
            contract_id,
            stock_code: "600000".to_string(),
            side: EntrustSide::Sell,
            price_type: PriceType::Limit,
            price: 10.0,
            amount: 500,
        })
        .await
        .unwrap();
    assert_eq!(placed.status, EntrustStatus::Cancelled);
    assert!(placed.remark.unwrap().contains("报单失败"));

    let position = PositionRepository::find_by_id(&engine.store, position_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.freeze_amount, 0);
    assert_eq!(position.amount, 1000);

    let logs = engine.store.error_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "send_order");
    assert_eq!(logs[0].entrust_id, Some(placed.entrust_id));

    let entrust = load(&engine, placed.entrust_id).await;
    assert_eq!(entrust.broker_entrusts.len(), 1);
    assert_eq!(entrust.broker_entrusts[0].status, BrokerEntrustStatus::Rejected);
}

#[tokio::test]
async fn test_failure_mid_batch_revokes_submitted_children() {
    let (engine, contract_id) = split_engine().await;
    engine.gateway.fail_sends(2);

    let placed = engine.orders.place(buy(contract_id, 10.0, 1000)).await.unwrap();
    assert_eq!(placed.status, EntrustStatus::Cancelled);

    let sent = engine.gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(engine.gateway.cancels(), vec![(1, sent[0].2.clone())]);

    let entrust = load(&engine, placed.entrust_id).await;
    assert!(entrust.broker_entrusts.iter().all(|c| c.is_terminal()));
    assert_relative_eq!(engine.contract(contract_id).await.val_money, 500_000.0);
}

#[tokio::test]
async fn test_broker_withdraw_is_confirmed_by_reconciliation() {
    let engine = Engine::new(true).await;
    let contract_id = engine.seed_contract().await;
    engine.register_broker(1, 1, 100_000.0).await;
    engine.pool.reconnect().await.unwrap();
    engine.quotes.set_price("600000", 10.0, 10.0);
    let placed = engine.orders.place(buy(contract_id, 10.0, 1000)).await.unwrap();

    let result = engine.orders.withdraw(placed.entrust_id).await.unwrap();
    assert_eq!(
        result,
        WithdrawResult::Withdrawing {
            cancel_sent: 1,
            cancel_failed: 0
        }
    );
    assert_eq!(load(&engine, placed.entrust_id).await.status, EntrustStatus::Withdrawing);

    let again = engine.orders.withdraw(placed.entrust_id).await.unwrap();
    assert_eq!(again, WithdrawResult::AlreadyWithdrawing);
    assert_eq!(engine.gateway.cancels().len(), 1);
    assert_eq!(load(&engine, placed.entrust_id).await.status, EntrustStatus::Withdrawing);

    assert_eq!(engine.reconciler.run_once().await.unwrap().settled, 1);
    assert_eq!(load(&engine, placed.entrust_id).await.status, EntrustStatus::Withdrawn);
    assert_relative_eq!(engine.contract(contract_id).await.val_money, 500_000.0);

    let notifications = engine.store.find_notifications_by_user(7).await.unwrap();
    assert!(notifications
        .iter()
        .any(|n| n.kind == NotificationKind::EntrustWithdrawn));
}
