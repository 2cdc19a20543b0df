//! 合约实体（保证金账户）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::ContractStatus;
use crate::value_objects::round2;

/// 合约 - 用户的杠杆操盘账户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: i64,
    pub user_id: i64,
    /// 本金
    pub init_money: f64,
    /// 当前保证金
    pub money: f64,
    /// 可用资金（买入能力）
    pub val_money: f64,
    /// 杠杆倍数
    pub lever: f64,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    pub fn new(id: i64, user_id: i64, init_money: f64, lever: f64) -> Self {
        let now = Utc::now();
        let mut contract = Self {
            id,
            user_id,
            init_money,
            money: init_money,
            val_money: 0.0,
            lever,
            status: ContractStatus::Active,
            created_at: now,
            updated_at: now,
        };
        contract.recompute_val_money(0.0, 0.0);
        contract
    }

    pub fn is_active(&self) -> bool {
        self.status == ContractStatus::Active
    }

    /// 借入资金
    pub fn borrowed(&self) -> f64 {
        self.init_money * self.lever
    }

    /// 总操盘资金 = 保证金 + 借入资金
    pub fn buying_power(&self) -> f64 {
        self.money + self.borrowed()
    }

    /// 重算可用资金，下限为 0
    ///
    /// `position_cost` 为全部持仓成本，`pending_buy` 为未终结买单占用的资金。
    pub fn recompute_val_money(&mut self, position_cost: f64, pending_buy: f64) {
        let value = self.buying_power() - position_cost - pending_buy;
        self.val_money = round2(value.max(0.0));
        self.updated_at = Utc::now();
    }

    /// 调整保证金（正数为入账，负数为扣款）
    pub fn adjust_money(&mut self, delta: f64) {
        self.money = round2(self.money + delta);
        self.updated_at = Utc::now();
    }
}
