//! 合约仓储实现
//!
//! 对应数据库表 `contract`

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use sqlx::{FromRow, MySql, Pool};
use tracing::debug;

use rust_margin_domain::entities::Contract;
use rust_margin_domain::enums::ContractStatus;
use rust_margin_domain::traits::ContractRepository;

pub(crate) const CONTRACT_COLUMNS: &str =
    "id, user_id, init_money, money, val_money, lever, status, created_at, updated_at";

/// 合约数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct ContractEntity {
    pub id: i64,
    pub user_id: i64,
    pub init_money: f64,
    pub money: f64,
    pub val_money: f64,
    pub lever: f64,
    pub status: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ContractEntity {
    /// 转换为领域实体
    pub fn to_domain(&self) -> Result<Contract> {
        let status = ContractStatus::from_code(self.status)
            .ok_or_else(|| anyhow!("合约 {} 状态编码无效: {}", self.id, self.status))?;
        Ok(Contract {
            id: self.id,
            user_id: self.user_id,
            init_money: self.init_money,
            money: self.money,
            val_money: self.val_money,
            lever: self.lever,
            status,
            created_at: Utc.from_utc_datetime(&self.created_at),
            updated_at: Utc.from_utc_datetime(&self.updated_at),
        })
    }
}

pub(crate) const UPDATE_CONTRACT_SQL: &str =
    "UPDATE contract SET money = ?, val_money = ?, status = ?, updated_at = ? WHERE id = ?";

/// 合约仓储实现 (基于 sqlx)
pub struct SqlxContractRepository {
    pool: Pool<MySql>,
}

impl SqlxContractRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContractRepository for SqlxContractRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Contract>> {
        debug!("查询合约: id={}", id);
        let sql = format!("SELECT {} FROM contract WHERE id = ? LIMIT 1", CONTRACT_COLUMNS);
        let entity = sqlx::query_as::<_, ContractEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        entity.map(|e| e.to_domain()).transpose()
    }

    async fn find_active(&self) -> Result<Vec<Contract>> {
        let sql = format!(
            "SELECT {} FROM contract WHERE status = ? ORDER BY id",
            CONTRACT_COLUMNS
        );
        let entities = sqlx::query_as::<_, ContractEntity>(&sql)
            .bind(ContractStatus::Active.code())
            .fetch_all(&self.pool)
            .await?;
        entities.iter().map(|e| e.to_domain()).collect()
    }

    async fn update(&self, contract: &Contract) -> Result<()> {
        debug!(
            "更新合约: id={}, money={}, val_money={}",
            contract.id, contract.money, contract.val_money
        );
        sqlx::query(UPDATE_CONTRACT_SQL)
            .bind(contract.money)
            .bind(contract.val_money)
            .bind(contract.status.code())
            .bind(contract.updated_at.naive_utc())
            .bind(contract.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
