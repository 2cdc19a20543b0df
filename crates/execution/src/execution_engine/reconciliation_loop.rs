//! 券商委托对账
//!
//! 每个周期：
//! 1. 逐个券商查询资金、持仓与当日委托，失败计数达到上限的券商移出连接池；
//! 2. 按委托编号把回报匹配到子委托并保存；
//! 3. 只有全部子委托都已终结的委托才交给结算，且在结算锁保护下进行。

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use rust_margin_domain::entities::Entrust;
use rust_margin_domain::enums::EntrustStatus;
use rust_margin_domain::traits::{EntrustRepository, GatewayError, TradeGateway};
use rust_margin_domain::value_objects::{ExternalOrderRecord, FundsSnapshot, HoldingRecord};

use super::idempotency_guard::IdempotencyGuard;
use super::settlement_engine::{SettlementEngine, SettlementReport};
use crate::broker_pool::BrokerPool;

/// 报单中的委托超过该时长仍没有子委托，视为路由中断并作废
const ROUTING_GRACE_SECS: i64 = 300;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileSummary {
    pub polled: usize,
    pub failed: usize,
    pub evicted: usize,
    pub children_updated: usize,
    pub settled: usize,
    pub waiting: usize,
}

struct BrokerReport {
    funds: FundsSnapshot,
    holdings: Vec<HoldingRecord>,
    orders: Vec<ExternalOrderRecord>,
}

pub struct ReconciliationLoop {
    pool: Arc<BrokerPool>,
    gateway: Arc<dyn TradeGateway>,
    entrusts: Arc<dyn EntrustRepository>,
    settlement: Arc<SettlementEngine>,
    guard: Arc<IdempotencyGuard>,
    price_floor: f64,
}

impl ReconciliationLoop {
    pub fn new(
        pool: Arc<BrokerPool>,
        gateway: Arc<dyn TradeGateway>,
        entrusts: Arc<dyn EntrustRepository>,
        settlement: Arc<SettlementEngine>,
        guard: Arc<IdempotencyGuard>,
        price_floor: f64,
    ) -> Self {
        Self {
            pool,
            gateway,
            entrusts,
            settlement,
            guard,
            price_floor,
        }
    }

    pub async fn run_once(&self) -> Result<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        if self.pool.is_empty().await {
            return Ok(summary);
        }

        let records = self.poll_brokers(&mut summary).await;
        let open = self.entrusts.find_open_broker_entrusts().await?;
        for entrust in open {
            if let Err(e) = self.reconcile_entrust(entrust, &records, &mut summary).await {
                error!("委托对账失败，下个周期重试: {}", e);
            }
        }

        if summary.settled > 0 || summary.evicted > 0 {
            info!(
                "对账完成: polled={}, failed={}, evicted={}, children_updated={}, settled={}, waiting={}",
                summary.polled,
                summary.failed,
                summary.evicted,
                summary.children_updated,
                summary.settled,
                summary.waiting
            );
        }
        Ok(summary)
    }

    /// 查询所有已连接券商，返回 broker_id -> (委托编号 -> 回报)
    async fn poll_brokers(
        &self,
        summary: &mut ReconcileSummary,
    ) -> HashMap<i64, HashMap<String, ExternalOrderRecord>> {
        let _cycle = self.pool.lock_cycle().await;
        let connected = self.pool.connected().await;

        let results = join_all(connected.iter().map(|(broker, client_id)| async move {
            (broker.id, self.query_broker(client_id).await)
        }))
        .await;

        let mut records = HashMap::with_capacity(results.len());
        for (broker_id, result) in results {
            match result {
                Ok(report) => {
                    summary.polled += 1;
                    let by_no: HashMap<String, ExternalOrderRecord> = report
                        .orders
                        .into_iter()
                        .map(|r| (r.entrust_no.clone(), r))
                        .collect();
                    self.pool
                        .record_success(broker_id, report.funds, report.holdings)
                        .await;
                    records.insert(broker_id, by_no);
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!("券商查询失败，本周期跳过: broker_id={}, error={}", broker_id, e);
                    if self.pool.record_failure(broker_id).await {
                        summary.evicted += 1;
                    }
                }
            }
        }
        records
    }

    async fn query_broker(&self, client_id: &str) -> Result<BrokerReport, GatewayError> {
        let funds = self.gateway.query_funds(client_id).await?;
        let holdings = self.gateway.query_holdings(client_id).await?;
        let orders = self.gateway.query_today_orders(client_id).await?;
        Ok(BrokerReport {
            funds,
            holdings,
            orders,
        })
    }

    async fn reconcile_entrust(
        &self,
        mut entrust: Entrust,
        records: &HashMap<i64, HashMap<String, ExternalOrderRecord>>,
        summary: &mut ReconcileSummary,
    ) -> Result<()> {
        if entrust.status == EntrustStatus::Unfilled {
            let routing_age = Utc::now() - entrust.created_at;
            if !entrust.broker_entrusts.is_empty() || routing_age < Duration::seconds(ROUTING_GRACE_SECS) {
                return Ok(());
            }
            warn!("报单中断的券商委托将被作废: entrust_id={}", entrust.id);
        }

        let mut changed = Vec::new();
        for child in entrust.broker_entrusts.iter_mut() {
            let Some(entrust_no) = child.entrust_no.as_deref() else {
                continue;
            };
            let Some(record) = records
                .get(&child.broker_id)
                .and_then(|by_no| by_no.get(entrust_no))
            else {
                continue;
            };
            if child.apply_external(record) {
                changed.push(child.clone());
            }
        }
        if !changed.is_empty() {
            summary.children_updated += changed.len();
            self.entrusts.save_broker_entrusts(&changed).await?;
        }

        let Some(outcome) = entrust.resolve_broker_outcome(self.price_floor) else {
            summary.waiting += 1;
            return Ok(());
        };

        if !self.guard.acquire(entrust.id).await? {
            debug!("委托正在结算中，跳过: entrust_id={}", entrust.id);
            return Ok(());
        }
        let result = self.settlement.settle(&entrust, &outcome).await;
        self.guard.release(entrust.id).await;

        match result {
            Ok(SettlementReport::Applied { .. }) => summary.settled += 1,
            Ok(SettlementReport::AlreadyTerminal) => {}
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "结算失败: entrust_id={}, error={}",
                    entrust.id,
                    e
                ))
            }
        }
        Ok(())
    }
}
