//! 仓储接口定义
//!
//! 定义数据访问的抽象接口，由基础设施层实现。
//! 未找到统一返回 `Ok(None)`，不使用哨兵错误。

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    Broker, BrokerEntrust, Contract, Entrust, FeeRecord, GatewayErrorLog, Notification, Position,
};

/// 合约仓储接口
#[async_trait]
pub trait ContractRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Contract>>;

    /// 所有操盘中的合约
    async fn find_active(&self) -> Result<Vec<Contract>>;

    async fn update(&self, contract: &Contract) -> Result<()>;
}

/// 委托仓储接口
///
/// 返回的委托都已带上子委托。
#[async_trait]
pub trait EntrustRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Entrust>>;

    /// 指定时间之后创建的委托（当日委托）
    async fn find_since(&self, since: DateTime<Utc>) -> Result<Vec<Entrust>>;

    /// 某合约指定时间之后创建的委托
    async fn find_by_contract_since(
        &self,
        contract_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Entrust>>;

    /// 未终结的券商委托
    async fn find_open_broker_entrusts(&self) -> Result<Vec<Entrust>>;

    /// 未终结的非券商委托（模拟撮合用）
    async fn find_open_local_entrusts(&self) -> Result<Vec<Entrust>>;

    /// 某合约所有未终结的委托
    async fn find_open_by_contract(&self, contract_id: i64) -> Result<Vec<Entrust>>;

    /// 非事务地同步子委托（对账时刷新成交进度）
    async fn save_broker_entrusts(&self, children: &[BrokerEntrust]) -> Result<()>;
}

/// 持仓仓储接口
#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Position>>;

    async fn find_by_contract(&self, contract_id: i64) -> Result<Vec<Position>>;

    async fn find_by_contract_and_stock(
        &self,
        contract_id: i64,
        stock_code: &str,
    ) -> Result<Option<Position>>;

    async fn find_all(&self) -> Result<Vec<Position>>;

    async fn update(&self, position: &Position) -> Result<()>;
}

/// 券商账户目录仓储接口
#[async_trait]
pub trait BrokerRepository: Send + Sync {
    /// 启用的券商账户，按优先级降序
    async fn find_enabled(&self) -> Result<Vec<Broker>>;
}

/// 流水与日志仓储接口
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn find_fees_by_contract(&self, contract_id: i64) -> Result<Vec<FeeRecord>>;

    async fn find_notifications_by_user(&self, user_id: i64) -> Result<Vec<Notification>>;

    /// 记录网关错误，不参与业务事务
    async fn append_error_log(&self, log: &GatewayErrorLog) -> Result<i64>;
}
