//! 基于 sqlx 事务的工作单元
//!
//! 合约与委托读取时加行锁（`FOR UPDATE`），
//! 同一合约的资金变动和同一委托的结算在数据库层串行化。
//! 加锁顺序固定为 委托 → 合约 → 持仓；批量读取持仓与在途委托不加锁。

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::{MySql, Pool, Transaction};
use tracing::debug;

use rust_margin_domain::entities::{BrokerEntrust, Contract, Entrust, FeeRecord, Notification, Position};
use rust_margin_domain::enums::EntrustStatus;
use rust_margin_domain::traits::{UnitOfWork, UnitOfWorkFactory};

use super::contract_repository::{ContractEntity, CONTRACT_COLUMNS, UPDATE_CONTRACT_SQL};
use super::entrust_repository::{
    assemble, fetch_children, terminal_list, EntrustEntity, ENTRUST_COLUMNS,
    INSERT_BROKER_ENTRUST_SQL, INSERT_ENTRUST_SQL, UPDATE_BROKER_ENTRUST_SQL, UPDATE_ENTRUST_SQL,
};
use super::ledger_repository::{INSERT_FEE_SQL, INSERT_NOTIFICATION_SQL};
use super::position_repository::{
    PositionEntity, INSERT_POSITION_SQL, POSITION_COLUMNS, UPDATE_POSITION_SQL,
};

pub struct SqlxUnitOfWorkFactory {
    pool: Pool<MySql>,
}

impl SqlxUnitOfWorkFactory {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWorkFactory for SqlxUnitOfWorkFactory {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqlxUnitOfWork { tx }))
    }
}

/// 持有一个进行中的数据库事务，drop 时未提交则自动回滚
pub struct SqlxUnitOfWork {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl UnitOfWork for SqlxUnitOfWork {
    async fn get_contract(&mut self, id: i64) -> Result<Option<Contract>> {
        let sql = format!(
            "SELECT {} FROM contract WHERE id = ? LIMIT 1 FOR UPDATE",
            CONTRACT_COLUMNS
        );
        let entity = sqlx::query_as::<_, ContractEntity>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        entity.map(|e| e.to_domain()).transpose()
    }

    async fn update_contract(&mut self, contract: &Contract) -> Result<()> {
        sqlx::query(UPDATE_CONTRACT_SQL)
            .bind(contract.money)
            .bind(contract.val_money)
            .bind(contract.status.code())
            .bind(contract.updated_at.naive_utc())
            .bind(contract.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn get_entrust(&mut self, id: i64) -> Result<Option<Entrust>> {
        let sql = format!(
            "SELECT {} FROM entrust WHERE id = ? LIMIT 1 FOR UPDATE",
            ENTRUST_COLUMNS
        );
        let entity = sqlx::query_as::<_, EntrustEntity>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        let Some(entity) = entity else {
            return Ok(None);
        };
        let children = fetch_children(&mut *self.tx, &[entity.id]).await?;
        Ok(assemble(vec![entity], children)?.into_iter().next())
    }

    async fn create_entrust(&mut self, entrust: &Entrust) -> Result<i64> {
        let result = sqlx::query(INSERT_ENTRUST_SQL)
            .bind(entrust.contract_id)
            .bind(entrust.user_id)
            .bind(&entrust.stock_code)
            .bind(entrust.side.code())
            .bind(entrust.price_type.code())
            .bind(entrust.price)
            .bind(entrust.amount)
            .bind(entrust.deal_amount)
            .bind(entrust.deal_price)
            .bind(entrust.fee)
            .bind(entrust.status.code())
            .bind(entrust.is_broker_entrust)
            .bind(entrust.position_id)
            .bind(&entrust.remark)
            .bind(entrust.created_at.naive_utc())
            .bind(entrust.updated_at.naive_utc())
            .execute(&mut *self.tx)
            .await?;
        let id = result.last_insert_id() as i64;
        debug!("新建委托: id={}", id);
        Ok(id)
    }

    async fn update_entrust_if_open(&mut self, entrust: &Entrust) -> Result<bool> {
        // 先锁行再判断，第二个并发结算者会在此等待，随后看到终态
        let current: Option<(i32,)> =
            sqlx::query_as("SELECT status FROM entrust WHERE id = ? FOR UPDATE")
                .bind(entrust.id)
                .fetch_optional(&mut *self.tx)
                .await?;
        let Some((code,)) = current else {
            return Err(anyhow!("委托不存在: id={}", entrust.id));
        };
        let status = EntrustStatus::from_code(code)
            .ok_or_else(|| anyhow!("委托 {} 状态编码无效: {}", entrust.id, code))?;
        if status.is_terminal() {
            debug!("委托已终结，跳过更新: id={}, status={:?}", entrust.id, status);
            return Ok(false);
        }

        sqlx::query(UPDATE_ENTRUST_SQL)
            .bind(entrust.deal_amount)
            .bind(entrust.deal_price)
            .bind(entrust.fee)
            .bind(entrust.status.code())
            .bind(&entrust.remark)
            .bind(entrust.updated_at.naive_utc())
            .bind(entrust.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(true)
    }

    async fn upsert_broker_entrusts(&mut self, children: &[BrokerEntrust]) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity(children.len());
        for child in children {
            if child.id > 0 {
                sqlx::query(UPDATE_BROKER_ENTRUST_SQL)
                    .bind(&child.entrust_no)
                    .bind(child.deal_amount)
                    .bind(child.deal_price)
                    .bind(child.status.code())
                    .bind(child.updated_at.naive_utc())
                    .bind(child.id)
                    .execute(&mut *self.tx)
                    .await?;
                ids.push(child.id);
            } else {
                let result = sqlx::query(INSERT_BROKER_ENTRUST_SQL)
                    .bind(child.entrust_id)
                    .bind(child.broker_id)
                    .bind(&child.entrust_no)
                    .bind(&child.stock_code)
                    .bind(child.side.code())
                    .bind(child.price_type.code())
                    .bind(child.price)
                    .bind(child.amount)
                    .bind(child.fee)
                    .bind(child.deal_amount)
                    .bind(child.deal_price)
                    .bind(child.status.code())
                    .bind(child.created_at.naive_utc())
                    .bind(child.updated_at.naive_utc())
                    .execute(&mut *self.tx)
                    .await?;
                ids.push(result.last_insert_id() as i64);
            }
        }
        Ok(ids)
    }

    async fn get_position(&mut self, id: i64) -> Result<Option<Position>> {
        let sql = format!(
            "SELECT {} FROM position WHERE id = ? LIMIT 1 FOR UPDATE",
            POSITION_COLUMNS
        );
        let entity = sqlx::query_as::<_, PositionEntity>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(entity.map(|e| e.to_domain()))
    }

    async fn find_position(&mut self, contract_id: i64, stock_code: &str) -> Result<Option<Position>> {
        let sql = format!(
            "SELECT {} FROM position WHERE contract_id = ? AND stock_code = ? LIMIT 1 FOR UPDATE",
            POSITION_COLUMNS
        );
        let entity = sqlx::query_as::<_, PositionEntity>(&sql)
            .bind(contract_id)
            .bind(stock_code)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(entity.map(|e| e.to_domain()))
    }

    async fn find_positions(&mut self, contract_id: i64) -> Result<Vec<Position>> {
        let sql = format!(
            "SELECT {} FROM position WHERE contract_id = ? ORDER BY id",
            POSITION_COLUMNS
        );
        let entities = sqlx::query_as::<_, PositionEntity>(&sql)
            .bind(contract_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(entities.iter().map(|e| e.to_domain()).collect())
    }

    async fn find_open_entrusts(&mut self, contract_id: i64) -> Result<Vec<Entrust>> {
        let sql = format!(
            "SELECT {} FROM entrust WHERE contract_id = ? AND status NOT IN ({}) ORDER BY id",
            ENTRUST_COLUMNS,
            terminal_list()
        );
        let entities = sqlx::query_as::<_, EntrustEntity>(&sql)
            .bind(contract_id)
            .fetch_all(&mut *self.tx)
            .await?;
        let ids: Vec<i64> = entities.iter().map(|e| e.id).collect();
        let children = fetch_children(&mut *self.tx, &ids).await?;
        assemble(entities, children)
    }

    async fn save_position(&mut self, position: &Position) -> Result<i64> {
        if position.id > 0 {
            sqlx::query(UPDATE_POSITION_SQL)
                .bind(position.amount)
                .bind(position.freeze_amount)
                .bind(position.price)
                .bind(position.updated_at.naive_utc())
                .bind(position.id)
                .execute(&mut *self.tx)
                .await?;
            return Ok(position.id);
        }
        let result = sqlx::query(INSERT_POSITION_SQL)
            .bind(position.contract_id)
            .bind(position.user_id)
            .bind(&position.stock_code)
            .bind(position.amount)
            .bind(position.freeze_amount)
            .bind(position.price)
            .bind(position.created_at.naive_utc())
            .bind(position.updated_at.naive_utc())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.last_insert_id() as i64)
    }

    async fn delete_position(&mut self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM position WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn append_fee(&mut self, record: &FeeRecord) -> Result<i64> {
        let result = sqlx::query(INSERT_FEE_SQL)
            .bind(record.contract_id)
            .bind(record.user_id)
            .bind(record.entrust_id)
            .bind(record.kind.code())
            .bind(record.amount)
            .bind(record.balance)
            .bind(&record.remark)
            .bind(record.created_at.naive_utc())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.last_insert_id() as i64)
    }

    async fn append_notification(&mut self, notification: &Notification) -> Result<i64> {
        let result = sqlx::query(INSERT_NOTIFICATION_SQL)
            .bind(notification.user_id)
            .bind(notification.contract_id)
            .bind(notification.kind.code())
            .bind(&notification.title)
            .bind(&notification.content)
            .bind(notification.created_at.naive_utc())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.last_insert_id() as i64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
