//! 券商连接池
//!
//! 维护当前已登录的券商账户及其资金、持仓快照，负责重连与熔断。
//!
//! 锁约定：
//! - `cycle`：重连周期与对账轮询整体串行，持有期间可以调用网关；
//! - `sessions`：只在读写内存快照时短暂持有，持有期间不调用网关，也不获取 `cycle`。
//!
//! 先 `cycle` 后 `sessions`，两把锁不会反向获取。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use rust_margin_domain::entities::{Broker, GatewayErrorLog};
use rust_margin_domain::enums::EntrustSide;
use rust_margin_domain::traits::{BrokerRepository, GatewayError, LedgerRepository, TradeGateway};
use rust_margin_domain::value_objects::{round2, FundsSnapshot, HoldingRecord};

/// 一个已登录的券商会话
#[derive(Debug, Clone)]
pub struct BrokerSession {
    pub broker: Broker,
    pub client_id: String,
    pub funds: FundsSnapshot,
    pub holdings: Vec<HoldingRecord>,
    /// 连续查询失败次数
    pub failures: u32,
}

/// 分单使用的券商快照
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSnapshot {
    pub broker_id: i64,
    pub priority: i32,
    pub available_funds: f64,
    /// 证券代码 -> 可卖数量
    pub sellable: HashMap<String, i64>,
}

impl BrokerSnapshot {
    pub fn sellable_of(&self, stock_code: &str) -> i64 {
        self.sellable.get(stock_code).copied().unwrap_or(0)
    }
}

impl From<&BrokerSession> for BrokerSnapshot {
    fn from(session: &BrokerSession) -> Self {
        let mut sellable = HashMap::with_capacity(session.holdings.len());
        for holding in &session.holdings {
            *sellable.entry(holding.stock_code.clone()).or_insert(0) += holding.sellable();
        }
        Self {
            broker_id: session.broker.id,
            priority: session.broker.priority,
            available_funds: session.funds.available,
            sellable,
        }
    }
}

/// 一次重连周期的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconnectSummary {
    pub connected: usize,
    pub failed: usize,
    pub already_connected: usize,
}

pub struct BrokerPool {
    gateway: Arc<dyn TradeGateway>,
    brokers: Arc<dyn BrokerRepository>,
    ledger: Arc<dyn LedgerRepository>,
    max_failures: u32,
    cycle: Mutex<()>,
    sessions: Mutex<BTreeMap<i64, BrokerSession>>,
}

impl BrokerPool {
    pub fn new(
        gateway: Arc<dyn TradeGateway>,
        brokers: Arc<dyn BrokerRepository>,
        ledger: Arc<dyn LedgerRepository>,
        max_failures: u32,
    ) -> Self {
        Self {
            gateway,
            brokers,
            ledger,
            max_failures: max_failures.max(1),
            cycle: Mutex::new(()),
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    /// 独占一次重连或对账周期
    pub async fn lock_cycle(&self) -> MutexGuard<'_, ()> {
        self.cycle.lock().await
    }

    /// 登录所有启用但尚未连接的券商账户
    pub async fn reconnect(&self) -> Result<ReconnectSummary> {
        let _cycle = self.lock_cycle().await;
        let enabled = self.brokers.find_enabled().await?;
        let mut summary = ReconnectSummary::default();

        for broker in enabled {
            if self.contains(broker.id).await {
                summary.already_connected += 1;
                continue;
            }
            match self.connect(&broker).await {
                Ok(session) => {
                    info!(
                        "券商账户已连接: broker_id={}, name={}, available={}",
                        broker.id, broker.name, session.funds.available
                    );
                    self.sessions.lock().await.insert(broker.id, session);
                    summary.connected += 1;
                }
                Err((action, e)) => {
                    warn!(
                        "券商账户连接失败，下个周期重试: broker_id={}, action={}, error={}",
                        broker.id, action, e
                    );
                    let log = GatewayErrorLog::new(
                        broker.id,
                        None,
                        action,
                        format!("{:?}", broker),
                        e.to_string(),
                    );
                    if let Err(log_err) = self.ledger.append_error_log(&log).await {
                        warn!("写入网关错误日志失败: {}", log_err);
                    }
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn connect(
        &self,
        broker: &Broker,
    ) -> std::result::Result<BrokerSession, (&'static str, GatewayError)> {
        let client_id = self.gateway.login(broker).await.map_err(|e| ("login", e))?;
        let funds = self
            .gateway
            .query_funds(&client_id)
            .await
            .map_err(|e| ("query_funds", e))?;
        let holdings = self
            .gateway
            .query_holdings(&client_id)
            .await
            .map_err(|e| ("query_holdings", e))?;
        Ok(BrokerSession {
            broker: broker.clone(),
            client_id,
            funds,
            holdings,
            failures: 0,
        })
    }

    pub async fn contains(&self, broker_id: i64) -> bool {
        self.sessions.lock().await.contains_key(&broker_id)
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// 已连接的券商及其 client_id，按优先级降序
    pub async fn connected(&self) -> Vec<(Broker, String)> {
        let sessions = self.sessions.lock().await;
        let mut list: Vec<(Broker, String)> = sessions
            .values()
            .map(|s| (s.broker.clone(), s.client_id.clone()))
            .collect();
        list.sort_by(|a, b| b.0.priority.cmp(&a.0.priority).then(a.0.id.cmp(&b.0.id)));
        list
    }

    pub async fn session(&self, broker_id: i64) -> Option<(Broker, String)> {
        self.sessions
            .lock()
            .await
            .get(&broker_id)
            .map(|s| (s.broker.clone(), s.client_id.clone()))
    }

    /// 分单快照，按优先级降序
    pub async fn snapshots(&self) -> Vec<BrokerSnapshot> {
        let sessions = self.sessions.lock().await;
        let mut list: Vec<BrokerSnapshot> = sessions.values().map(BrokerSnapshot::from).collect();
        list.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.broker_id.cmp(&b.broker_id)));
        list
    }

    /// 查询成功：刷新快照并清零失败计数
    pub async fn record_success(
        &self,
        broker_id: i64,
        funds: FundsSnapshot,
        holdings: Vec<HoldingRecord>,
    ) {
        if let Some(session) = self.sessions.lock().await.get_mut(&broker_id) {
            session.funds = funds;
            session.holdings = holdings;
            session.failures = 0;
        }
    }

    /// 查询失败：累计失败次数，达到上限时移出连接池，返回是否被移出
    pub async fn record_failure(&self, broker_id: i64) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&broker_id) else {
            return false;
        };
        session.failures += 1;
        if session.failures >= self.max_failures {
            warn!(
                "券商连续失败 {} 次，移出连接池: broker_id={}",
                session.failures, broker_id
            );
            sessions.remove(&broker_id);
            return true;
        }
        debug!(
            "券商查询失败: broker_id={}, failures={}",
            broker_id, session.failures
        );
        false
    }

    /// 报单成功后先行扣减快照，避免下次轮询前重复分配同一笔资金或持仓
    pub async fn apply_submitted(
        &self,
        broker_id: i64,
        side: EntrustSide,
        stock_code: &str,
        amount: i64,
        cost: f64,
    ) {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&broker_id) else {
            return;
        };
        match side {
            EntrustSide::Buy => {
                session.funds.available = round2((session.funds.available - cost).max(0.0));
            }
            EntrustSide::Sell => {
                let mut remaining = amount;
                for holding in session
                    .holdings
                    .iter_mut()
                    .filter(|h| h.stock_code == stock_code)
                {
                    let take = holding.sellable().min(remaining);
                    holding.frozen += take;
                    remaining -= take;
                    if remaining == 0 {
                        break;
                    }
                }
            }
        }
    }

    pub async fn remove(&self, broker_id: i64) -> bool {
        self.sessions.lock().await.remove(&broker_id).is_some()
    }
}
