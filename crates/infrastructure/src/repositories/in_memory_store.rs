//! 内存存储
//!
//! 实现全部仓储接口与工作单元，用于测试和无数据库的模拟盘运行。
//!
//! 事务语义：`begin` 取得整个存储的互斥锁并复制一份数据，
//! 所有写入作用在副本上，`commit` 时整体替换，丢弃即回滚。
//! 锁在事务期间一直持有，因此持有工作单元的任务不能再调用本存储的仓储方法。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use rust_margin_domain::entities::{
    Broker, BrokerEntrust, Contract, Entrust, FeeRecord, GatewayErrorLog, Notification, Position,
};
use rust_margin_domain::enums::ContractStatus;
use rust_margin_domain::traits::{
    BrokerRepository, ContractRepository, EntrustRepository, LedgerRepository, PositionRepository,
    UnitOfWork, UnitOfWorkFactory,
};

#[derive(Debug, Clone, Default)]
struct StoreData {
    next_id: i64,
    contracts: BTreeMap<i64, Contract>,
    /// 子委托单独存放，读取时再挂到父委托上
    entrusts: BTreeMap<i64, Entrust>,
    broker_entrusts: BTreeMap<i64, BrokerEntrust>,
    positions: BTreeMap<i64, Position>,
    brokers: Vec<Broker>,
    fees: Vec<FeeRecord>,
    notifications: Vec<Notification>,
    error_logs: Vec<GatewayErrorLog>,
}

impl StoreData {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn with_children(&self, entrust: &Entrust) -> Entrust {
        let mut full = entrust.clone();
        full.broker_entrusts = self
            .broker_entrusts
            .values()
            .filter(|c| c.entrust_id == entrust.id)
            .cloned()
            .collect();
        full
    }

    fn select_entrusts<F>(&self, predicate: F) -> Vec<Entrust>
    where
        F: Fn(&Entrust) -> bool,
    {
        self.entrusts
            .values()
            .filter(|e| predicate(e))
            .map(|e| self.with_children(e))
            .collect()
    }

    fn store_entrust(&mut self, entrust: &Entrust) {
        let mut row = entrust.clone();
        row.broker_entrusts.clear();
        self.entrusts.insert(row.id, row);
    }

    fn upsert_children(&mut self, children: &[BrokerEntrust]) -> Vec<i64> {
        let mut ids = Vec::with_capacity(children.len());
        for child in children {
            let mut row = child.clone();
            if row.id == 0 {
                row.id = self.next_id();
            } else if let Some(existing) = self.broker_entrusts.get(&row.id) {
                // 与 SQL 更新语句一致：只更新回报相关字段
                let mut merged = existing.clone();
                merged.entrust_no = row.entrust_no.clone();
                merged.deal_amount = row.deal_amount;
                merged.deal_price = row.deal_price;
                merged.status = row.status;
                merged.updated_at = row.updated_at;
                row = merged;
            }
            ids.push(row.id);
            self.broker_entrusts.insert(row.id, row);
        }
        ids
    }
}

/// 内存存储，可廉价克隆并在多个服务间共享
#[derive(Clone, Default)]
pub struct InMemoryStore {
    data: Arc<Mutex<StoreData>>,
    fail_commits: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入合约，id 为 0 时自动分配
    pub async fn insert_contract(&self, contract: Contract) -> i64 {
        let mut data = self.data.lock().await;
        let mut contract = contract;
        if contract.id == 0 {
            contract.id = data.next_id();
        } else {
            data.next_id = data.next_id.max(contract.id);
        }
        let id = contract.id;
        data.contracts.insert(id, contract);
        id
    }

    /// 写入持仓，id 为 0 时自动分配
    pub async fn insert_position(&self, position: Position) -> i64 {
        let mut data = self.data.lock().await;
        let mut position = position;
        if position.id == 0 {
            position.id = data.next_id();
        } else {
            data.next_id = data.next_id.max(position.id);
        }
        let id = position.id;
        data.positions.insert(id, position);
        id
    }

    pub async fn insert_broker(&self, broker: Broker) {
        let mut data = self.data.lock().await;
        data.brokers.push(broker);
    }

    pub async fn error_logs(&self) -> Vec<GatewayErrorLog> {
        self.data.lock().await.error_logs.clone()
    }

    /// 让之后的提交全部失败，用于验证回滚路径
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContractRepository for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Contract>> {
        Ok(self.data.lock().await.contracts.get(&id).cloned())
    }

    async fn find_active(&self) -> Result<Vec<Contract>> {
        Ok(self
            .data
            .lock()
            .await
            .contracts
            .values()
            .filter(|c| c.status == ContractStatus::Active)
            .cloned()
            .collect())
    }

    async fn update(&self, contract: &Contract) -> Result<()> {
        let mut data = self.data.lock().await;
        if !data.contracts.contains_key(&contract.id) {
            return Err(anyhow!("合约不存在: id={}", contract.id));
        }
        data.contracts.insert(contract.id, contract.clone());
        Ok(())
    }
}

#[async_trait]
impl EntrustRepository for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Entrust>> {
        let data = self.data.lock().await;
        Ok(data.entrusts.get(&id).map(|e| data.with_children(e)))
    }

    async fn find_since(&self, since: DateTime<Utc>) -> Result<Vec<Entrust>> {
        Ok(self.data.lock().await.select_entrusts(|e| e.created_at >= since))
    }

    async fn find_by_contract_since(
        &self,
        contract_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Entrust>> {
        Ok(self
            .data
            .lock()
            .await
            .select_entrusts(|e| e.contract_id == contract_id && e.created_at >= since))
    }

    async fn find_open_broker_entrusts(&self) -> Result<Vec<Entrust>> {
        Ok(self
            .data
            .lock()
            .await
            .select_entrusts(|e| e.is_broker_entrust && !e.is_terminal()))
    }

    async fn find_open_local_entrusts(&self) -> Result<Vec<Entrust>> {
        Ok(self
            .data
            .lock()
            .await
            .select_entrusts(|e| !e.is_broker_entrust && !e.is_terminal()))
    }

    async fn find_open_by_contract(&self, contract_id: i64) -> Result<Vec<Entrust>> {
        Ok(self
            .data
            .lock()
            .await
            .select_entrusts(|e| e.contract_id == contract_id && !e.is_terminal()))
    }

    async fn save_broker_entrusts(&self, children: &[BrokerEntrust]) -> Result<()> {
        let mut data = self.data.lock().await;
        let existing: Vec<BrokerEntrust> = children.iter().filter(|c| c.id > 0).cloned().collect();
        data.upsert_children(&existing);
        Ok(())
    }
}

#[async_trait]
impl PositionRepository for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Position>> {
        Ok(self.data.lock().await.positions.get(&id).cloned())
    }

    async fn find_by_contract(&self, contract_id: i64) -> Result<Vec<Position>> {
        Ok(self
            .data
            .lock()
            .await
            .positions
            .values()
            .filter(|p| p.contract_id == contract_id)
            .cloned()
            .collect())
    }

    async fn find_by_contract_and_stock(
        &self,
        contract_id: i64,
        stock_code: &str,
    ) -> Result<Option<Position>> {
        Ok(self
            .data
            .lock()
            .await
            .positions
            .values()
            .find(|p| p.contract_id == contract_id && p.stock_code == stock_code)
            .cloned())
    }

    async fn find_all(&self) -> Result<Vec<Position>> {
        Ok(self.data.lock().await.positions.values().cloned().collect())
    }

    async fn update(&self, position: &Position) -> Result<()> {
        let mut data = self.data.lock().await;
        if !data.positions.contains_key(&position.id) {
            return Err(anyhow!("持仓不存在: id={}", position.id));
        }
        data.positions.insert(position.id, position.clone());
        Ok(())
    }
}

#[async_trait]
impl BrokerRepository for InMemoryStore {
    async fn find_enabled(&self) -> Result<Vec<Broker>> {
        let mut brokers: Vec<Broker> = self
            .data
            .lock()
            .await
            .brokers
            .iter()
            .filter(|b| b.enabled)
            .cloned()
            .collect();
        brokers.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(brokers)
    }
}

#[async_trait]
impl LedgerRepository for InMemoryStore {
    async fn find_fees_by_contract(&self, contract_id: i64) -> Result<Vec<FeeRecord>> {
        Ok(self
            .data
            .lock()
            .await
            .fees
            .iter()
            .filter(|f| f.contract_id == contract_id)
            .cloned()
            .collect())
    }

    async fn find_notifications_by_user(&self, user_id: i64) -> Result<Vec<Notification>> {
        Ok(self
            .data
            .lock()
            .await
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn append_error_log(&self, log: &GatewayErrorLog) -> Result<i64> {
        let mut data = self.data.lock().await;
        let mut row = log.clone();
        row.id = data.next_id();
        let id = row.id;
        data.error_logs.push(row);
        Ok(id)
    }
}

#[async_trait]
impl UnitOfWorkFactory for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.data.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork {
            guard,
            work,
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
        }))
    }
}

/// 内存事务
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<StoreData>,
    work: StoreData,
    fail_commit: bool,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn get_contract(&mut self, id: i64) -> Result<Option<Contract>> {
        Ok(self.work.contracts.get(&id).cloned())
    }

    async fn update_contract(&mut self, contract: &Contract) -> Result<()> {
        if !self.work.contracts.contains_key(&contract.id) {
            return Err(anyhow!("合约不存在: id={}", contract.id));
        }
        self.work.contracts.insert(contract.id, contract.clone());
        Ok(())
    }

    async fn get_entrust(&mut self, id: i64) -> Result<Option<Entrust>> {
        Ok(self
            .work
            .entrusts
            .get(&id)
            .map(|e| self.work.with_children(e)))
    }

    async fn create_entrust(&mut self, entrust: &Entrust) -> Result<i64> {
        let mut row = entrust.clone();
        row.id = self.work.next_id();
        let id = row.id;
        self.work.store_entrust(&row);
        Ok(id)
    }

    async fn update_entrust_if_open(&mut self, entrust: &Entrust) -> Result<bool> {
        let current = self
            .work
            .entrusts
            .get(&entrust.id)
            .ok_or_else(|| anyhow!("委托不存在: id={}", entrust.id))?;
        if current.is_terminal() {
            return Ok(false);
        }
        self.work.store_entrust(entrust);
        Ok(true)
    }

    async fn upsert_broker_entrusts(&mut self, children: &[BrokerEntrust]) -> Result<Vec<i64>> {
        Ok(self.work.upsert_children(children))
    }

    async fn get_position(&mut self, id: i64) -> Result<Option<Position>> {
        Ok(self.work.positions.get(&id).cloned())
    }

    async fn find_position(&mut self, contract_id: i64, stock_code: &str) -> Result<Option<Position>> {
        Ok(self
            .work
            .positions
            .values()
            .find(|p| p.contract_id == contract_id && p.stock_code == stock_code)
            .cloned())
    }

    async fn find_positions(&mut self, contract_id: i64) -> Result<Vec<Position>> {
        Ok(self
            .work
            .positions
            .values()
            .filter(|p| p.contract_id == contract_id)
            .cloned()
            .collect())
    }

    async fn find_open_entrusts(&mut self, contract_id: i64) -> Result<Vec<Entrust>> {
        Ok(self
            .work
            .select_entrusts(|e| e.contract_id == contract_id && !e.is_terminal()))
    }

    async fn save_position(&mut self, position: &Position) -> Result<i64> {
        let mut row = position.clone();
        if row.id == 0 {
            row.id = self.work.next_id();
        }
        let id = row.id;
        self.work.positions.insert(id, row);
        Ok(id)
    }

    async fn delete_position(&mut self, id: i64) -> Result<()> {
        self.work.positions.remove(&id);
        Ok(())
    }

    async fn append_fee(&mut self, record: &FeeRecord) -> Result<i64> {
        let mut row = record.clone();
        row.id = self.work.next_id();
        let id = row.id;
        self.work.fees.push(row);
        Ok(id)
    }

    async fn append_notification(&mut self, notification: &Notification) -> Result<i64> {
        let mut row = notification.clone();
        row.id = self.work.next_id();
        let id = row.id;
        self.work.notifications.push(row);
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        if this.fail_commit {
            return Err(anyhow!("模拟提交失败"));
        }
        let mut guard = this.guard;
        *guard = this.work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
