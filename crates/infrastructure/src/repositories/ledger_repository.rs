//! 资金流水 / 通知 / 网关错误日志仓储实现
//!
//! 对应数据库表 `fee_record`、`notification`、`gateway_error_log`

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use sqlx::{FromRow, MySql, Pool};
use tracing::warn;

use rust_margin_domain::entities::{FeeRecord, GatewayErrorLog, Notification};
use rust_margin_domain::enums::{LedgerKind, NotificationKind};
use rust_margin_domain::traits::LedgerRepository;

pub(crate) const INSERT_FEE_SQL: &str = r#"INSERT INTO fee_record
    (contract_id, user_id, entrust_id, kind, amount, balance, remark, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#;

pub(crate) const INSERT_NOTIFICATION_SQL: &str = r#"INSERT INTO notification
    (user_id, contract_id, kind, title, content, created_at)
    VALUES (?, ?, ?, ?, ?, ?)"#;

#[derive(Debug, Clone, FromRow)]
pub struct FeeRecordEntity {
    pub id: i64,
    pub contract_id: i64,
    pub user_id: i64,
    pub entrust_id: Option<i64>,
    pub kind: i32,
    pub amount: f64,
    pub balance: f64,
    pub remark: String,
    pub created_at: NaiveDateTime,
}

impl FeeRecordEntity {
    pub fn to_domain(&self) -> Result<FeeRecord> {
        Ok(FeeRecord {
            id: self.id,
            contract_id: self.contract_id,
            user_id: self.user_id,
            entrust_id: self.entrust_id,
            kind: LedgerKind::from_code(self.kind)
                .ok_or_else(|| anyhow!("流水 {} 类型编码无效: {}", self.id, self.kind))?,
            amount: self.amount,
            balance: self.balance,
            remark: self.remark.clone(),
            created_at: Utc.from_utc_datetime(&self.created_at),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct NotificationEntity {
    pub id: i64,
    pub user_id: i64,
    pub contract_id: i64,
    pub kind: i32,
    pub title: String,
    pub content: String,
    pub created_at: NaiveDateTime,
}

impl NotificationEntity {
    pub fn to_domain(&self) -> Result<Notification> {
        Ok(Notification {
            id: self.id,
            user_id: self.user_id,
            contract_id: self.contract_id,
            kind: NotificationKind::from_code(self.kind)
                .ok_or_else(|| anyhow!("通知 {} 类型编码无效: {}", self.id, self.kind))?,
            title: self.title.clone(),
            content: self.content.clone(),
            created_at: Utc.from_utc_datetime(&self.created_at),
        })
    }
}

pub struct SqlxLedgerRepository {
    pool: Pool<MySql>,
}

impl SqlxLedgerRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

/// 截断到列宽，避免超长错误信息导致日志写入失败
fn clip(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[async_trait]
impl LedgerRepository for SqlxLedgerRepository {
    async fn find_fees_by_contract(&self, contract_id: i64) -> Result<Vec<FeeRecord>> {
        let entities = sqlx::query_as::<_, FeeRecordEntity>(
            r#"SELECT id, contract_id, user_id, entrust_id, kind, amount, balance, remark, created_at
               FROM fee_record WHERE contract_id = ? ORDER BY id"#,
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        entities.iter().map(|e| e.to_domain()).collect()
    }

    async fn find_notifications_by_user(&self, user_id: i64) -> Result<Vec<Notification>> {
        let entities = sqlx::query_as::<_, NotificationEntity>(
            r#"SELECT id, user_id, contract_id, kind, title, content, created_at
               FROM notification WHERE user_id = ? ORDER BY id"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        entities.iter().map(|e| e.to_domain()).collect()
    }

    async fn append_error_log(&self, log: &GatewayErrorLog) -> Result<i64> {
        warn!(
            "记录网关错误: broker_id={}, entrust_id={:?}, action={}, error={}",
            log.broker_id, log.entrust_id, log.action, log.error
        );
        let result = sqlx::query(
            r#"INSERT INTO gateway_error_log
               (broker_id, entrust_id, action, request, error, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(log.broker_id)
        .bind(log.entrust_id)
        .bind(&log.action)
        .bind(clip(&log.request, 2048))
        .bind(clip(&log.error, 1024))
        .bind(log.created_at.naive_utc())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id() as i64)
    }
}
