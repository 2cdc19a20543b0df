//! # Rust Margin Execution
//!
//! 委托执行：券商连接池与分单、下单与撤单、对账、结算、内部撮合、日常资金任务
//!
//! 下单后的数据流：
//!
//! ```text
//! OrderService::place -> Allocator -> TradeGateway::send_order
//!        ReconciliationLoop (每秒) -> IdempotencyGuard -> SettlementEngine
//!        AutoMatcher (模拟盘)      -> IdempotencyGuard -> SettlementEngine
//! ```

pub mod broker_pool;
pub mod daily_jobs;
pub mod execution_engine;
pub mod order_manager;

pub use broker_pool::{Allocation, AllocationError, Allocator, BrokerPool, BrokerSnapshot};
pub use daily_jobs::{EodUnfreezeJob, InterestJob};
pub use execution_engine::{
    AutoMatcher, IdempotencyGuard, ReconciliationLoop, SettlementEngine, SettlementError,
    SettlementReport,
};
pub use order_manager::{
    ContractFundsService, OrderError, OrderService, OrderSettings, PlaceOrderRequest, PlacedOrder,
    WithdrawResult,
};
