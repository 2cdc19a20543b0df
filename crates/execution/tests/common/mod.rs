//! 集成测试公共设施：内存存储、内存缓存、静态行情与脚本化券商网关

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use rust_margin_core::config::TradingConfig;
use rust_margin_domain::entities::{Broker, Contract, Position};
use rust_margin_domain::enums::Exchange;
use rust_margin_domain::traits::{ContractRepository, GatewayError, GatewayOrder, TradeGateway};
use rust_margin_domain::value_objects::{ExternalOrderRecord, FundsSnapshot, HoldingRecord};
use rust_margin_execution::order_manager::fee_schedule;
use rust_margin_execution::{
    AutoMatcher, BrokerPool, ContractFundsService, IdempotencyGuard, OrderService, OrderSettings,
    ReconciliationLoop, SettlementEngine,
};
use rust_margin_infrastructure::{InMemoryCacheStore, InMemoryStore, StaticQuoteProvider};

#[derive(Default)]
struct MockState {
    funds: HashMap<i64, f64>,
    holdings: HashMap<i64, Vec<HoldingRecord>>,
    orders: HashMap<i64, Vec<ExternalOrderRecord>>,
    failing_queries: HashSet<i64>,
    failing_sends: HashSet<i64>,
    failing_logins: HashSet<i64>,
    sent: Vec<(i64, GatewayOrder, String)>,
    cancels: Vec<(i64, String)>,
    next_no: u64,
}

/// 按脚本返回结果的券商网关，client_id 形如 `client-{broker_id}`
#[derive(Default)]
pub struct MockTradeGateway {
    state: Mutex<MockState>,
}

fn broker_of(client_id: &str) -> i64 {
    client_id
        .trim_start_matches("client-")
        .parse()
        .unwrap_or_default()
}

impl MockTradeGateway {
    pub fn set_funds(&self, broker_id: i64, available: f64) {
        self.state.lock().unwrap().funds.insert(broker_id, available);
    }

    pub fn set_holding(&self, broker_id: i64, stock_code: &str, amount: i64) {
        self.state
            .lock()
            .unwrap()
            .holdings
            .entry(broker_id)
            .or_default()
            .push(HoldingRecord {
                stock_code: stock_code.to_string(),
                amount,
                frozen: 0,
            });
    }

    pub fn fail_queries(&self, broker_id: i64, fail: bool) {
        let mut state = self.state.lock().unwrap();
        if fail {
            state.failing_queries.insert(broker_id);
        } else {
            state.failing_queries.remove(&broker_id);
        }
    }

    pub fn fail_sends(&self, broker_id: i64) {
        self.state.lock().unwrap().failing_sends.insert(broker_id);
    }

    pub fn fail_logins(&self, broker_id: i64) {
        self.state.lock().unwrap().failing_logins.insert(broker_id);
    }

    /// 修改券商回报：状态文本、成交数量、成交价
    pub fn report(&self, entrust_no: &str, raw_status: &str, deal_amount: i64, deal_price: f64) {
        let mut state = self.state.lock().unwrap();
        for record in state.orders.values_mut().flatten() {
            if record.entrust_no == entrust_no {
                record.raw_status = raw_status.to_string();
                record.deal_amount = deal_amount;
                record.deal_price = deal_price;
            }
        }
    }

    /// 已报出的委托：(broker_id, 委托, 委托编号)
    pub fn sent(&self) -> Vec<(i64, GatewayOrder, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn cancels(&self) -> Vec<(i64, String)> {
        self.state.lock().unwrap().cancels.clone()
    }
}

#[async_trait]
impl TradeGateway for MockTradeGateway {
    async fn login(&self, broker: &Broker) -> Result<String, GatewayError> {
        if self.state.lock().unwrap().failing_logins.contains(&broker.id) {
            return Err(GatewayError::Rejected("登录失败".to_string()));
        }
        Ok(format!("client-{}", broker.id))
    }

    async fn send_order(&self, client_id: &str, order: &GatewayOrder) -> Result<String, GatewayError> {
        let broker_id = broker_of(client_id);
        let mut state = self.state.lock().unwrap();
        if state.failing_sends.contains(&broker_id) {
            return Err(GatewayError::Timeout {
                action: "send_order".to_string(),
            });
        }
        state.next_no += 1;
        let entrust_no = format!("E{:04}", state.next_no);
        state.orders.entry(broker_id).or_default().push(ExternalOrderRecord {
            entrust_no: entrust_no.clone(),
            stock_code: order.stock_code.clone(),
            raw_status: "已报".to_string(),
            deal_amount: 0,
            deal_price: 0.0,
        });
        state.sent.push((broker_id, order.clone(), entrust_no.clone()));
        Ok(entrust_no)
    }

    async fn query_funds(&self, client_id: &str) -> Result<FundsSnapshot, GatewayError> {
        let broker_id = broker_of(client_id);
        let state = self.state.lock().unwrap();
        if state.failing_queries.contains(&broker_id) {
            return Err(GatewayError::Timeout {
                action: "query".to_string(),
            });
        }
        let available = state.funds.get(&broker_id).copied().unwrap_or(0.0);
        Ok(FundsSnapshot {
            available,
            total_assets: available,
        })
    }

    async fn query_holdings(&self, client_id: &str) -> Result<Vec<HoldingRecord>, GatewayError> {
        let broker_id = broker_of(client_id);
        let state = self.state.lock().unwrap();
        if state.failing_queries.contains(&broker_id) {
            return Err(GatewayError::Timeout {
                action: "query".to_string(),
            });
        }
        Ok(state.holdings.get(&broker_id).cloned().unwrap_or_default())
    }

    async fn query_today_orders(
        &self,
        client_id: &str,
    ) -> Result<Vec<ExternalOrderRecord>, GatewayError> {
        let broker_id = broker_of(client_id);
        let state = self.state.lock().unwrap();
        if state.failing_queries.contains(&broker_id) {
            return Err(GatewayError::Timeout {
                action: "query".to_string(),
            });
        }
        Ok(state.orders.get(&broker_id).cloned().unwrap_or_default())
    }

    async fn cancel_order(
        &self,
        client_id: &str,
        _exchange: Exchange,
        entrust_no: &str,
    ) -> Result<(), GatewayError> {
        let broker_id = broker_of(client_id);
        let mut state = self.state.lock().unwrap();
        state.cancels.push((broker_id, entrust_no.to_string()));
        for record in state.orders.values_mut().flatten() {
            if record.entrust_no == entrust_no && record.deal_amount == 0 {
                record.raw_status = "已撤".to_string();
            }
        }
        Ok(())
    }
}

pub fn trading_config(broker_routing_enabled: bool) -> TradingConfig {
    TradingConfig {
        broker_routing_enabled,
        lot_size: 100,
        commission_rate: 0.0003,
        min_commission: 5.0,
        stamp_tax_rate: 0.001,
        transfer_fee_rate: 0.00002,
        price_floor: 0.01,
        price_limit_pct: 0.10,
        max_broker_failures: 3,
        settle_lock_ttl_secs: 60,
    }
}

pub fn broker(id: i64, priority: i32) -> Broker {
    Broker {
        id,
        name: format!("券商{}", id),
        ip: "127.0.0.1".to_string(),
        port: 7708,
        version: "6.0".to_string(),
        branch_no: "1".to_string(),
        fund_account: format!("F{}", id),
        trade_account: format!("T{}", id),
        trade_password: "secret".to_string(),
        tx_password: "secret".to_string(),
        sh_holder: format!("A{}", id),
        sz_holder: format!("0{}", id),
        priority,
        enabled: true,
    }
}

pub struct Engine {
    pub store: InMemoryStore,
    pub cache: Arc<InMemoryCacheStore>,
    pub quotes: StaticQuoteProvider,
    pub gateway: Arc<MockTradeGateway>,
    pub pool: Arc<BrokerPool>,
    pub funds: Arc<ContractFundsService>,
    pub settlement: Arc<SettlementEngine>,
    pub guard: Arc<IdempotencyGuard>,
    pub orders: Arc<OrderService>,
    pub reconciler: ReconciliationLoop,
    pub matcher: AutoMatcher,
}

impl Engine {
    pub async fn new(broker_routing_enabled: bool) -> Self {
        let config = trading_config(broker_routing_enabled);
        let store = InMemoryStore::new();
        let cache = Arc::new(InMemoryCacheStore::new());
        let quotes = StaticQuoteProvider::new();
        let gateway = Arc::new(MockTradeGateway::default());

        let pool = Arc::new(BrokerPool::new(
            gateway.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            config.max_broker_failures,
        ));
        let funds = Arc::new(ContractFundsService::new(Arc::new(store.clone())));
        let settlement = Arc::new(SettlementEngine::new(
            Arc::new(store.clone()),
            funds.clone(),
            fee_schedule(&config),
        ));
        let guard = Arc::new(IdempotencyGuard::new(cache.clone(), config.settle_lock_ttl_secs));
        let orders = Arc::new(
            OrderService::new(
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(quotes.clone()),
                cache.clone(),
                settlement.clone(),
                OrderSettings::from_config(&config),
            )
            .with_broker_routing(pool.clone(), gateway.clone()),
        );
        let reconciler = ReconciliationLoop::new(
            pool.clone(),
            gateway.clone(),
            Arc::new(store.clone()),
            settlement.clone(),
            guard.clone(),
            config.price_floor,
        );
        let matcher = AutoMatcher::new(
            Arc::new(store.clone()),
            Arc::new(quotes.clone()),
            settlement.clone(),
            guard.clone(),
            config.price_floor,
        );

        Self {
            store,
            cache,
            quotes,
            gateway,
            pool,
            funds,
            settlement,
            guard,
            orders,
            reconciler,
            matcher,
        }
    }

    /// 本金 100,000，4 倍杠杆
    pub async fn seed_contract(&self) -> i64 {
        self.store
            .insert_contract(Contract::new(0, 7, 100_000.0, 4.0))
            .await
    }

    pub async fn seed_position(&self, contract_id: i64, stock_code: &str, amount: i64, price: f64) -> i64 {
        self.store
            .insert_position(Position::open(contract_id, 7, stock_code, amount, price))
            .await
    }

    /// 登记券商并设置其资金，之后需调用 `pool.reconnect()` 建立连接
    pub async fn register_broker(&self, id: i64, priority: i32, available: f64) {
        self.store.insert_broker(broker(id, priority)).await;
        self.gateway.set_funds(id, available);
    }

    pub async fn contract(&self, id: i64) -> Contract {
        ContractRepository::find_by_id(&self.store, id)
            .await
            .unwrap()
            .unwrap()
    }
}
