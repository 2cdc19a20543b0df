//! 资金流水、用户通知与网关错误日志
//!
//! 三者都是只追加的记录。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{LedgerKind, NotificationKind};

/// 资金流水
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRecord {
    pub id: i64,
    pub contract_id: i64,
    pub user_id: i64,
    pub entrust_id: Option<i64>,
    pub kind: LedgerKind,
    /// 变动金额，正数入账、负数扣款
    pub amount: f64,
    /// 变动后的保证金
    pub balance: f64,
    pub remark: String,
    pub created_at: DateTime<Utc>,
}

impl FeeRecord {
    pub fn new(
        contract_id: i64,
        user_id: i64,
        entrust_id: Option<i64>,
        kind: LedgerKind,
        amount: f64,
        balance: f64,
        remark: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            contract_id,
            user_id,
            entrust_id,
            kind,
            amount,
            balance,
            remark: remark.into(),
            created_at: Utc::now(),
        }
    }
}

/// 站内通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub contract_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: i64,
        contract_id: i64,
        kind: NotificationKind,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            contract_id,
            kind,
            title: title.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// 券商网关调用失败记录，用于运维排查
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayErrorLog {
    pub id: i64,
    pub broker_id: i64,
    pub entrust_id: Option<i64>,
    /// login / send_order / query / cancel_order
    pub action: String,
    /// 请求参数（密码已脱敏）
    pub request: String,
    pub error: String,
    pub created_at: DateTime<Utc>,
}

impl GatewayErrorLog {
    pub fn new(
        broker_id: i64,
        entrust_id: Option<i64>,
        action: &str,
        request: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            broker_id,
            entrust_id,
            action: action.to_string(),
            request: request.into(),
            error: error.into(),
            created_at: Utc::now(),
        }
    }
}
