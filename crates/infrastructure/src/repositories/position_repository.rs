//! 持仓仓储实现
//!
//! 对应数据库表 `position`

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use sqlx::{FromRow, MySql, Pool};
use tracing::debug;

use rust_margin_domain::entities::Position;
use rust_margin_domain::traits::PositionRepository;

pub(crate) const POSITION_COLUMNS: &str =
    "id, contract_id, user_id, stock_code, amount, freeze_amount, price, created_at, updated_at";

pub(crate) const INSERT_POSITION_SQL: &str = r#"INSERT INTO position
    (contract_id, user_id, stock_code, amount, freeze_amount, price, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#;

pub(crate) const UPDATE_POSITION_SQL: &str =
    "UPDATE position SET amount = ?, freeze_amount = ?, price = ?, updated_at = ? WHERE id = ?";

/// 持仓数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct PositionEntity {
    pub id: i64,
    pub contract_id: i64,
    pub user_id: i64,
    pub stock_code: String,
    pub amount: i64,
    pub freeze_amount: i64,
    pub price: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl PositionEntity {
    pub fn to_domain(&self) -> Position {
        Position {
            id: self.id,
            contract_id: self.contract_id,
            user_id: self.user_id,
            stock_code: self.stock_code.clone(),
            amount: self.amount,
            freeze_amount: self.freeze_amount,
            price: self.price,
            created_at: Utc.from_utc_datetime(&self.created_at),
            updated_at: Utc.from_utc_datetime(&self.updated_at),
        }
    }
}

/// 持仓仓储实现 (基于 sqlx)
pub struct SqlxPositionRepository {
    pool: Pool<MySql>,
}

impl SqlxPositionRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionRepository for SqlxPositionRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Position>> {
        let sql = format!("SELECT {} FROM position WHERE id = ? LIMIT 1", POSITION_COLUMNS);
        let entity = sqlx::query_as::<_, PositionEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entity.map(|e| e.to_domain()))
    }

    async fn find_by_contract(&self, contract_id: i64) -> Result<Vec<Position>> {
        debug!("查询合约持仓: contract_id={}", contract_id);
        let sql = format!(
            "SELECT {} FROM position WHERE contract_id = ? ORDER BY id",
            POSITION_COLUMNS
        );
        let entities = sqlx::query_as::<_, PositionEntity>(&sql)
            .bind(contract_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(entities.iter().map(|e| e.to_domain()).collect())
    }

    async fn find_by_contract_and_stock(
        &self,
        contract_id: i64,
        stock_code: &str,
    ) -> Result<Option<Position>> {
        let sql = format!(
            "SELECT {} FROM position WHERE contract_id = ? AND stock_code = ? LIMIT 1",
            POSITION_COLUMNS
        );
        let entity = sqlx::query_as::<_, PositionEntity>(&sql)
            .bind(contract_id)
            .bind(stock_code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entity.map(|e| e.to_domain()))
    }

    async fn find_all(&self) -> Result<Vec<Position>> {
        let sql = format!("SELECT {} FROM position ORDER BY id", POSITION_COLUMNS);
        let entities = sqlx::query_as::<_, PositionEntity>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(entities.iter().map(|e| e.to_domain()).collect())
    }

    async fn update(&self, position: &Position) -> Result<()> {
        sqlx::query(UPDATE_POSITION_SQL)
            .bind(position.amount)
            .bind(position.freeze_amount)
            .bind(position.price)
            .bind(position.updated_at.naive_utc())
            .bind(position.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
