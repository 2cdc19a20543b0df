//! 工作单元（数据库事务）接口
//!
//! 结算、下单冻结、撤单等需要原子提交的操作都通过工作单元完成。
//! 未调用 `commit` 就丢弃的工作单元视为回滚。

use anyhow::Result;
use async_trait::async_trait;

use crate::entities::{BrokerEntrust, Contract, Entrust, FeeRecord, Notification, Position};

#[async_trait]
pub trait UnitOfWork: Send {
    async fn get_contract(&mut self, id: i64) -> Result<Option<Contract>>;

    async fn update_contract(&mut self, contract: &Contract) -> Result<()>;

    async fn get_entrust(&mut self, id: i64) -> Result<Option<Entrust>>;

    /// 新建委托，返回委托 ID
    async fn create_entrust(&mut self, entrust: &Entrust) -> Result<i64>;

    /// 仅当库中委托仍未终结时更新，返回是否更新成功
    ///
    /// 重复结算时第二个结算者会得到 `false`，据此回滚。
    async fn update_entrust_if_open(&mut self, entrust: &Entrust) -> Result<bool>;

    /// 按 ID 新增或更新子委托，返回与入参顺序一致的 ID 列表
    async fn upsert_broker_entrusts(&mut self, children: &[BrokerEntrust]) -> Result<Vec<i64>>;

    async fn get_position(&mut self, id: i64) -> Result<Option<Position>>;

    async fn find_position(&mut self, contract_id: i64, stock_code: &str) -> Result<Option<Position>>;

    /// 合约的全部持仓，在事务内读取但不加行锁
    async fn find_positions(&mut self, contract_id: i64) -> Result<Vec<Position>>;

    /// 合约的未终结委托，在事务内读取但不加行锁
    async fn find_open_entrusts(&mut self, contract_id: i64) -> Result<Vec<Entrust>>;

    /// id 为 0 时新增，否则更新；返回持仓 ID
    async fn save_position(&mut self, position: &Position) -> Result<i64>;

    async fn delete_position(&mut self, id: i64) -> Result<()>;

    async fn append_fee(&mut self, record: &FeeRecord) -> Result<i64>;

    async fn append_notification(&mut self, notification: &Notification) -> Result<i64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// 工作单元工厂
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}
