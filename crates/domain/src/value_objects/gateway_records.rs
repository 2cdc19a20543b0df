//! 券商终端查询结果
//!
//! 由基础设施层从网关的表格文本解析而来。

use serde::{Deserialize, Serialize};

use crate::enums::BrokerEntrustStatus;

/// 资金查询（type=0）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FundsSnapshot {
    /// 可用资金
    pub available: f64,
    /// 总资产
    pub total_assets: f64,
}

/// 持仓查询（type=1）中的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub stock_code: String,
    /// 股份余额
    pub amount: i64,
    /// 冻结数量
    pub frozen: i64,
}

impl HoldingRecord {
    /// 可卖数量
    pub fn sellable(&self) -> i64 {
        (self.amount - self.frozen).max(0)
    }
}

/// 当日委托查询（type=2）中的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalOrderRecord {
    /// 券商委托编号
    pub entrust_no: String,
    pub stock_code: String,
    /// 原始状态文本
    pub raw_status: String,
    /// 成交数量
    pub deal_amount: i64,
    /// 成交均价
    pub deal_price: f64,
}

impl ExternalOrderRecord {
    pub fn status(&self) -> Option<BrokerEntrustStatus> {
        BrokerEntrustStatus::from_external(&self.raw_status)
    }
}
