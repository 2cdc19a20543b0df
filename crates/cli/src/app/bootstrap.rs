//! # 应用启动引导模块
//!
//! 显式装配仓储、缓存、行情、网关与各个服务，不使用全局单例。

use std::sync::Arc;

use sqlx::{MySql, Pool};

use rust_margin_core::config::AppConfig;
use rust_margin_domain::traits::{
    BrokerRepository, CacheStore, ContractRepository, EntrustRepository, LedgerRepository,
    PositionRepository, QuoteProvider, TradeGateway, UnitOfWorkFactory,
};
use rust_margin_execution::order_manager::fee_schedule;
use rust_margin_execution::{
    AutoMatcher, BrokerPool, ContractFundsService, EodUnfreezeJob, IdempotencyGuard, InterestJob,
    OrderService, OrderSettings, ReconciliationLoop, SettlementEngine,
};
use rust_margin_infrastructure::repositories::{
    SqlxBrokerRepository, SqlxContractRepository, SqlxEntrustRepository, SqlxLedgerRepository,
    SqlxPositionRepository, SqlxUnitOfWorkFactory,
};
use rust_margin_infrastructure::{CachedQuoteProvider, InMemoryCacheStore, InMemoryStore, StaticQuoteProvider};
use rust_margin_orchestration::EngineJobs;
use rust_margin_risk::ContractRiskMonitor;

/// 存储与外部数据端口
#[derive(Clone)]
pub struct StoragePorts {
    pub contracts: Arc<dyn ContractRepository>,
    pub entrusts: Arc<dyn EntrustRepository>,
    pub positions: Arc<dyn PositionRepository>,
    pub brokers: Arc<dyn BrokerRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub uow_factory: Arc<dyn UnitOfWorkFactory>,
    pub cache: Arc<dyn CacheStore>,
    pub quotes: Arc<dyn QuoteProvider>,
}

impl StoragePorts {
    /// MySQL 仓储 + 缓存中的行情快照
    pub fn sqlx(pool: Pool<MySql>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            contracts: Arc::new(SqlxContractRepository::new(pool.clone())),
            entrusts: Arc::new(SqlxEntrustRepository::new(pool.clone())),
            positions: Arc::new(SqlxPositionRepository::new(pool.clone())),
            brokers: Arc::new(SqlxBrokerRepository::new(pool.clone())),
            ledger: Arc::new(SqlxLedgerRepository::new(pool.clone())),
            uow_factory: Arc::new(SqlxUnitOfWorkFactory::new(pool)),
            quotes: Arc::new(CachedQuoteProvider::new(cache.clone())),
            cache,
        }
    }

    /// 内存存储，进程退出后数据丢失
    pub fn in_memory(store: InMemoryStore, quotes: StaticQuoteProvider) -> Self {
        Self {
            contracts: Arc::new(store.clone()),
            entrusts: Arc::new(store.clone()),
            positions: Arc::new(store.clone()),
            brokers: Arc::new(store.clone()),
            ledger: Arc::new(store.clone()),
            uow_factory: Arc::new(store),
            cache: Arc::new(InMemoryCacheStore::new()),
            quotes: Arc::new(quotes),
        }
    }
}

/// 装配完成的引擎
pub struct Engine {
    pub orders: Arc<OrderService>,
    pub risk: Arc<ContractRiskMonitor>,
    pub jobs: Arc<EngineJobs>,
}

pub fn build_engine(
    ports: &StoragePorts,
    gateway: Arc<dyn TradeGateway>,
    config: &AppConfig,
) -> Engine {
    let trading = &config.trading;
    let routing_enabled = trading.broker_routing_enabled;

    let pool = Arc::new(BrokerPool::new(
        gateway.clone(),
        ports.brokers.clone(),
        ports.ledger.clone(),
        trading.max_broker_failures,
    ));
    let funds = Arc::new(ContractFundsService::new(ports.uow_factory.clone()));
    let settlement = Arc::new(SettlementEngine::new(
        ports.uow_factory.clone(),
        funds.clone(),
        fee_schedule(trading),
    ));
    let guard = Arc::new(IdempotencyGuard::new(
        ports.cache.clone(),
        trading.settle_lock_ttl_secs,
    ));

    let mut orders = OrderService::new(
        ports.positions.clone(),
        ports.entrusts.clone(),
        ports.ledger.clone(),
        ports.uow_factory.clone(),
        ports.quotes.clone(),
        ports.cache.clone(),
        settlement.clone(),
        OrderSettings::from_config(trading),
    );
    if routing_enabled {
        orders = orders.with_broker_routing(pool.clone(), gateway.clone());
    }
    let orders = Arc::new(orders);

    let risk = Arc::new(ContractRiskMonitor::new(
        ports.contracts.clone(),
        ports.positions.clone(),
        ports.quotes.clone(),
        ports.cache.clone(),
        ports.uow_factory.clone(),
        orders.clone(),
        &config.risk,
        trading.price_floor,
    ));

    let jobs = Arc::new(EngineJobs {
        routing_enabled,
        reconciler: Arc::new(ReconciliationLoop::new(
            pool.clone(),
            gateway,
            ports.entrusts.clone(),
            settlement.clone(),
            guard.clone(),
            trading.price_floor,
        )),
        matcher: Arc::new(AutoMatcher::new(
            ports.entrusts.clone(),
            ports.quotes.clone(),
            settlement.clone(),
            guard,
            trading.price_floor,
        )),
        risk: risk.clone(),
        interest: Arc::new(InterestJob::new(
            ports.contracts.clone(),
            ports.uow_factory.clone(),
            ports.cache.clone(),
            funds.clone(),
            config.interest.clone(),
        )),
        eod: Arc::new(EodUnfreezeJob::new(
            ports.entrusts.clone(),
            ports.positions.clone(),
            ports.uow_factory.clone(),
            ports.cache.clone(),
            settlement,
            funds,
            config.schedule.eod_unfreeze_time,
        )),
        pool,
    });

    Engine { orders, risk, jobs }
}
