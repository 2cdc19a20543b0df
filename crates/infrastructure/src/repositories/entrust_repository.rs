//! 委托仓储实现
//!
//! 对应数据库表 `entrust` 与 `broker_entrust`

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sqlx::{Executor, FromRow, MySql, Pool};
use tracing::debug;

use rust_margin_domain::entities::{BrokerEntrust, Entrust};
use rust_margin_domain::enums::{BrokerEntrustStatus, EntrustSide, EntrustStatus, PriceType};
use rust_margin_domain::traits::EntrustRepository;

pub(crate) const ENTRUST_COLUMNS: &str = "id, contract_id, user_id, stock_code, side, price_type, \
     price, amount, deal_amount, deal_price, fee, status, is_broker_entrust, position_id, remark, \
     created_at, updated_at";

pub(crate) const BROKER_ENTRUST_COLUMNS: &str = "id, entrust_id, broker_id, entrust_no, \
     stock_code, side, price_type, price, amount, fee, deal_amount, deal_price, status, \
     created_at, updated_at";

pub(crate) const INSERT_ENTRUST_SQL: &str = r#"INSERT INTO entrust
    (contract_id, user_id, stock_code, side, price_type, price, amount, deal_amount,
     deal_price, fee, status, is_broker_entrust, position_id, remark, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;

pub(crate) const UPDATE_ENTRUST_SQL: &str = r#"UPDATE entrust SET
    deal_amount = ?, deal_price = ?, fee = ?, status = ?, remark = ?, updated_at = ?
    WHERE id = ?"#;

pub(crate) const INSERT_BROKER_ENTRUST_SQL: &str = r#"INSERT INTO broker_entrust
    (entrust_id, broker_id, entrust_no, stock_code, side, price_type, price, amount, fee,
     deal_amount, deal_price, status, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;

pub(crate) const UPDATE_BROKER_ENTRUST_SQL: &str = r#"UPDATE broker_entrust SET
    entrust_no = ?, deal_amount = ?, deal_price = ?, status = ?, updated_at = ?
    WHERE id = ?"#;

/// 委托数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct EntrustEntity {
    pub id: i64,
    pub contract_id: i64,
    pub user_id: i64,
    pub stock_code: String,
    pub side: i32,
    pub price_type: i32,
    pub price: f64,
    pub amount: i64,
    pub deal_amount: i64,
    pub deal_price: f64,
    pub fee: f64,
    pub status: i32,
    pub is_broker_entrust: bool,
    pub position_id: Option<i64>,
    pub remark: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl EntrustEntity {
    /// 转换为领域实体
    pub fn to_domain(&self, broker_entrusts: Vec<BrokerEntrust>) -> Result<Entrust> {
        Ok(Entrust {
            id: self.id,
            contract_id: self.contract_id,
            user_id: self.user_id,
            stock_code: self.stock_code.clone(),
            side: EntrustSide::from_code(self.side)
                .ok_or_else(|| anyhow!("委托 {} 方向编码无效: {}", self.id, self.side))?,
            price_type: PriceType::from_code(self.price_type)
                .ok_or_else(|| anyhow!("委托 {} 价格类型编码无效: {}", self.id, self.price_type))?,
            price: self.price,
            amount: self.amount,
            deal_amount: self.deal_amount,
            deal_price: self.deal_price,
            fee: self.fee,
            status: EntrustStatus::from_code(self.status)
                .ok_or_else(|| anyhow!("委托 {} 状态编码无效: {}", self.id, self.status))?,
            is_broker_entrust: self.is_broker_entrust,
            position_id: self.position_id,
            remark: self.remark.clone(),
            broker_entrusts,
            created_at: Utc.from_utc_datetime(&self.created_at),
            updated_at: Utc.from_utc_datetime(&self.updated_at),
        })
    }
}

/// 券商子委托数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct BrokerEntrustEntity {
    pub id: i64,
    pub entrust_id: i64,
    pub broker_id: i64,
    pub entrust_no: Option<String>,
    pub stock_code: String,
    pub side: i32,
    pub price_type: i32,
    pub price: f64,
    pub amount: i64,
    pub fee: f64,
    pub deal_amount: i64,
    pub deal_price: f64,
    pub status: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl BrokerEntrustEntity {
    pub fn to_domain(&self) -> Result<BrokerEntrust> {
        Ok(BrokerEntrust {
            id: self.id,
            entrust_id: self.entrust_id,
            broker_id: self.broker_id,
            entrust_no: self.entrust_no.clone(),
            stock_code: self.stock_code.clone(),
            side: EntrustSide::from_code(self.side)
                .ok_or_else(|| anyhow!("子委托 {} 方向编码无效: {}", self.id, self.side))?,
            price_type: PriceType::from_code(self.price_type)
                .ok_or_else(|| anyhow!("子委托 {} 价格类型编码无效: {}", self.id, self.price_type))?,
            price: self.price,
            amount: self.amount,
            fee: self.fee,
            deal_amount: self.deal_amount,
            deal_price: self.deal_price,
            status: BrokerEntrustStatus::from_code(self.status)
                .ok_or_else(|| anyhow!("子委托 {} 状态编码无效: {}", self.id, self.status))?,
            created_at: Utc.from_utc_datetime(&self.created_at),
            updated_at: Utc.from_utc_datetime(&self.updated_at),
        })
    }
}

/// 批量加载子委托，按父委托分组，组内按 ID 升序
pub(crate) async fn fetch_children<'e, E>(
    executor: E,
    entrust_ids: &[i64],
) -> Result<HashMap<i64, Vec<BrokerEntrust>>>
where
    E: Executor<'e, Database = MySql>,
{
    let mut grouped: HashMap<i64, Vec<BrokerEntrust>> = HashMap::new();
    if entrust_ids.is_empty() {
        return Ok(grouped);
    }
    let placeholders = vec!["?"; entrust_ids.len()].join(", ");
    let sql = format!(
        "SELECT {} FROM broker_entrust WHERE entrust_id IN ({}) ORDER BY id",
        BROKER_ENTRUST_COLUMNS, placeholders
    );
    let mut query = sqlx::query_as::<_, BrokerEntrustEntity>(&sql);
    for id in entrust_ids {
        query = query.bind(*id);
    }
    for entity in query.fetch_all(executor).await? {
        let child = entity.to_domain()?;
        grouped.entry(child.entrust_id).or_default().push(child);
    }
    Ok(grouped)
}

/// 把委托行与子委托组装成领域实体
pub(crate) fn assemble(
    entities: Vec<EntrustEntity>,
    mut children: HashMap<i64, Vec<BrokerEntrust>>,
) -> Result<Vec<Entrust>> {
    entities
        .into_iter()
        .map(|e| {
            let kids = children.remove(&e.id).unwrap_or_default();
            e.to_domain(kids)
        })
        .collect()
}

/// 委托仓储实现 (基于 sqlx)
pub struct SqlxEntrustRepository {
    pool: Pool<MySql>,
}

impl SqlxEntrustRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    async fn load(&self, where_clause: &str, binds: &[i64], since: Option<NaiveDateTime>) -> Result<Vec<Entrust>> {
        let sql = format!(
            "SELECT {} FROM entrust WHERE {} ORDER BY id",
            ENTRUST_COLUMNS, where_clause
        );
        let mut query = sqlx::query_as::<_, EntrustEntity>(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        if let Some(since) = since {
            query = query.bind(since);
        }
        let entities = query.fetch_all(&self.pool).await?;
        let ids: Vec<i64> = entities.iter().map(|e| e.id).collect();
        let children = fetch_children(&self.pool, &ids).await?;
        assemble(entities, children)
    }
}

pub(crate) fn terminal_list() -> String {
    EntrustStatus::terminal_codes()
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl EntrustRepository for SqlxEntrustRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Entrust>> {
        debug!("查询委托: id={}", id);
        Ok(self.load("id = ?", &[id], None).await?.into_iter().next())
    }

    async fn find_since(&self, since: DateTime<Utc>) -> Result<Vec<Entrust>> {
        self.load("created_at >= ?", &[], Some(since.naive_utc())).await
    }

    async fn find_by_contract_since(
        &self,
        contract_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Entrust>> {
        self.load(
            "contract_id = ? AND created_at >= ?",
            &[contract_id],
            Some(since.naive_utc()),
        )
        .await
    }

    async fn find_open_broker_entrusts(&self) -> Result<Vec<Entrust>> {
        let clause = format!(
            "is_broker_entrust = 1 AND status NOT IN ({})",
            terminal_list()
        );
        self.load(&clause, &[], None).await
    }

    async fn find_open_local_entrusts(&self) -> Result<Vec<Entrust>> {
        let clause = format!(
            "is_broker_entrust = 0 AND status NOT IN ({})",
            terminal_list()
        );
        self.load(&clause, &[], None).await
    }

    async fn find_open_by_contract(&self, contract_id: i64) -> Result<Vec<Entrust>> {
        let clause = format!("contract_id = ? AND status NOT IN ({})", terminal_list());
        self.load(&clause, &[contract_id], None).await
    }

    async fn save_broker_entrusts(&self, children: &[BrokerEntrust]) -> Result<()> {
        for child in children.iter().filter(|c| c.id > 0) {
            sqlx::query(UPDATE_BROKER_ENTRUST_SQL)
                .bind(&child.entrust_no)
                .bind(child.deal_amount)
                .bind(child.deal_price)
                .bind(child.status.code())
                .bind(child.updated_at.naive_utc())
                .bind(child.id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
