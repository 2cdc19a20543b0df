//! 资金流水与通知枚举

use serde::{Deserialize, Serialize};

/// 资金流水类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerKind {
    /// 买入手续费
    BuyFee,
    /// 卖出手续费（含印花税）
    SellFee,
    /// 借款利息
    Interest,
    /// 卖出盈亏
    Profit,
    /// 追加保证金
    MarginCall,
    /// 合约结算
    Settlement,
}

impl LedgerKind {
    pub fn code(&self) -> i32 {
        match self {
            LedgerKind::BuyFee => 1,
            LedgerKind::SellFee => 2,
            LedgerKind::Interest => 3,
            LedgerKind::Profit => 4,
            LedgerKind::MarginCall => 5,
            LedgerKind::Settlement => 6,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(LedgerKind::BuyFee),
            2 => Some(LedgerKind::SellFee),
            3 => Some(LedgerKind::Interest),
            4 => Some(LedgerKind::Profit),
            5 => Some(LedgerKind::MarginCall),
            6 => Some(LedgerKind::Settlement),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LedgerKind::BuyFee => "买入手续费",
            LedgerKind::SellFee => "卖出手续费",
            LedgerKind::Interest => "借款利息",
            LedgerKind::Profit => "卖出盈亏",
            LedgerKind::MarginCall => "追加保证金",
            LedgerKind::Settlement => "合约结算",
        }
    }
}

/// 用户通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    EntrustFilled,
    EntrustWithdrawn,
    EntrustCancelled,
    RiskWarn,
    ForcedClose,
    Interest,
}

impl NotificationKind {
    pub fn code(&self) -> i32 {
        match self {
            NotificationKind::EntrustFilled => 1,
            NotificationKind::EntrustWithdrawn => 2,
            NotificationKind::EntrustCancelled => 3,
            NotificationKind::RiskWarn => 4,
            NotificationKind::ForcedClose => 5,
            NotificationKind::Interest => 6,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(NotificationKind::EntrustFilled),
            2 => Some(NotificationKind::EntrustWithdrawn),
            3 => Some(NotificationKind::EntrustCancelled),
            4 => Some(NotificationKind::RiskWarn),
            5 => Some(NotificationKind::ForcedClose),
            6 => Some(NotificationKind::Interest),
            _ => None,
        }
    }
}
