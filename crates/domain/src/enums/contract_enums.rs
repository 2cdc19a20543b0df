//! 合约与风控相关枚举

use serde::{Deserialize, Serialize};

/// 合约生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractStatus {
    /// 已申请
    Applied,
    /// 操盘中
    Active,
    /// 已结束
    Closed,
}

impl ContractStatus {
    pub fn code(&self) -> i32 {
        match self {
            ContractStatus::Applied => 0,
            ContractStatus::Active => 1,
            ContractStatus::Closed => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ContractStatus::Applied),
            1 => Some(ContractStatus::Active),
            2 => Some(ContractStatus::Closed),
            _ => None,
        }
    }
}

/// 风险等级
///
/// 排序按严重程度：`Healthy < Warn < Close`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    /// 正常
    Healthy,
    /// 触及警戒线
    Warn,
    /// 触及平仓线
    Close,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Healthy => "HEALTHY",
            RiskLevel::Warn => "WARN",
            RiskLevel::Close => "CLOSE",
        }
    }
}
