//! 委托相关枚举

use serde::{Deserialize, Serialize};

/// 委托方向，编码与券商网关 `type` 参数一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntrustSide {
    /// 买入
    Buy,
    /// 卖出
    Sell,
}

impl EntrustSide {
    pub fn code(&self) -> i32 {
        match self {
            EntrustSide::Buy => 0,
            EntrustSide::Sell => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(EntrustSide::Buy),
            1 => Some(EntrustSide::Sell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntrustSide::Buy => "buy",
            EntrustSide::Sell => "sell",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntrustSide::Buy => "买入",
            EntrustSide::Sell => "卖出",
        }
    }
}

/// 价格类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceType {
    /// 限价
    Limit,
    /// 市价
    Market,
}

impl PriceType {
    pub fn code(&self) -> i32 {
        match self {
            PriceType::Limit => 0,
            PriceType::Market => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PriceType::Limit),
            1 => Some(PriceType::Market),
            _ => None,
        }
    }

    /// 券商网关的报价方式编码
    ///
    /// 市价单按交易所区分：沪市 1（五档即成剩撤），深市 6（即成剩撤）。
    pub fn gateway_code(&self, exchange: Exchange) -> i32 {
        match (self, exchange) {
            (PriceType::Limit, _) => 0,
            (PriceType::Market, Exchange::Sh) => 1,
            (PriceType::Market, Exchange::Sz) => 6,
        }
    }
}

/// 委托（用户订单）状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntrustStatus {
    /// 未成交
    Unfilled,
    /// 已报（已提交到券商）
    Reported,
    /// 撤单中
    Withdrawing,
    /// 已成交
    Filled,
    /// 已撤单
    Withdrawn,
    /// 部成部撤
    PartFilledPartWithdrawn,
    /// 已作废
    Cancelled,
}

impl EntrustStatus {
    pub fn code(&self) -> i32 {
        match self {
            EntrustStatus::Unfilled => 0,
            EntrustStatus::Reported => 1,
            EntrustStatus::Withdrawing => 2,
            EntrustStatus::Filled => 3,
            EntrustStatus::Withdrawn => 4,
            EntrustStatus::PartFilledPartWithdrawn => 5,
            EntrustStatus::Cancelled => 6,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(EntrustStatus::Unfilled),
            1 => Some(EntrustStatus::Reported),
            2 => Some(EntrustStatus::Withdrawing),
            3 => Some(EntrustStatus::Filled),
            4 => Some(EntrustStatus::Withdrawn),
            5 => Some(EntrustStatus::PartFilledPartWithdrawn),
            6 => Some(EntrustStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntrustStatus::Unfilled => "unfilled",
            EntrustStatus::Reported => "reported",
            EntrustStatus::Withdrawing => "withdrawing",
            EntrustStatus::Filled => "filled",
            EntrustStatus::Withdrawn => "withdrawn",
            EntrustStatus::PartFilledPartWithdrawn => "part_filled_part_withdrawn",
            EntrustStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EntrustStatus::Filled
                | EntrustStatus::Withdrawn
                | EntrustStatus::PartFilledPartWithdrawn
                | EntrustStatus::Cancelled
        )
    }

    /// 所有终态的编码，用于条件更新
    pub fn terminal_codes() -> [i32; 4] {
        [
            EntrustStatus::Filled.code(),
            EntrustStatus::Withdrawn.code(),
            EntrustStatus::PartFilledPartWithdrawn.code(),
            EntrustStatus::Cancelled.code(),
        ]
    }
}

/// 券商子委托状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrokerEntrustStatus {
    /// 待报（已分配未提交）
    Pending,
    /// 已报
    Reported,
    /// 部分成交
    PartFilled,
    /// 已成
    Filled,
    /// 部撤
    PartCancelled,
    /// 已撤
    Cancelled,
    /// 废单
    Rejected,
}

impl BrokerEntrustStatus {
    pub fn code(&self) -> i32 {
        match self {
            BrokerEntrustStatus::Pending => 0,
            BrokerEntrustStatus::Reported => 1,
            BrokerEntrustStatus::PartFilled => 2,
            BrokerEntrustStatus::Filled => 3,
            BrokerEntrustStatus::PartCancelled => 4,
            BrokerEntrustStatus::Cancelled => 5,
            BrokerEntrustStatus::Rejected => 6,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(BrokerEntrustStatus::Pending),
            1 => Some(BrokerEntrustStatus::Reported),
            2 => Some(BrokerEntrustStatus::PartFilled),
            3 => Some(BrokerEntrustStatus::Filled),
            4 => Some(BrokerEntrustStatus::PartCancelled),
            5 => Some(BrokerEntrustStatus::Cancelled),
            6 => Some(BrokerEntrustStatus::Rejected),
            _ => None,
        }
    }

    /// 解析券商终端返回的状态文本
    ///
    /// 终端回报使用中文状态词，部分版本返回英文，两者都接受。
    /// 无法识别的状态返回 `None`，调用方应视为非终态。
    pub fn from_external(raw: &str) -> Option<Self> {
        let s = raw.trim();
        match s {
            "未报" | "待报" | "正报" => Some(BrokerEntrustStatus::Pending),
            "已报" | "已报待撤" | "部成待撤" | "reported" => Some(BrokerEntrustStatus::Reported),
            "部成" | "部分成交" | "part_filled" => Some(BrokerEntrustStatus::PartFilled),
            "已成" | "全部成交" | "filled" => Some(BrokerEntrustStatus::Filled),
            "部撤" | "部分撤单" | "part_cancelled" => Some(BrokerEntrustStatus::PartCancelled),
            "已撤" | "全部撤单" | "cancelled" => Some(BrokerEntrustStatus::Cancelled),
            "废单" | "rejected" => Some(BrokerEntrustStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BrokerEntrustStatus::Filled
                | BrokerEntrustStatus::PartCancelled
                | BrokerEntrustStatus::Cancelled
                | BrokerEntrustStatus::Rejected
        )
    }
}

/// 交易所，编码与网关 `exchange_id` 一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    /// 深圳
    Sz,
    /// 上海
    Sh,
}

impl Exchange {
    pub fn code(&self) -> i32 {
        match self {
            Exchange::Sz => 0,
            Exchange::Sh => 1,
        }
    }

    /// 按证券代码推断交易所：6/9/5 开头为沪市，其余为深市
    pub fn from_stock_code(code: &str) -> Self {
        match code.trim().chars().next() {
            Some('6') | Some('9') | Some('5') => Exchange::Sh,
            _ => Exchange::Sz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entrust_status_codes_round_trip() {
        for code in 0..7 {
            let status = EntrustStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert!(EntrustStatus::from_code(7).is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!EntrustStatus::Unfilled.is_terminal());
        assert!(!EntrustStatus::Reported.is_terminal());
        assert!(!EntrustStatus::Withdrawing.is_terminal());
        assert!(EntrustStatus::Filled.is_terminal());
        assert!(EntrustStatus::Cancelled.is_terminal());
        assert_eq!(EntrustStatus::terminal_codes().len(), 4);
    }

    #[test]
    fn test_external_status_vocabulary() {
        assert_eq!(
            BrokerEntrustStatus::from_external("已成"),
            Some(BrokerEntrustStatus::Filled)
        );
        assert_eq!(
            BrokerEntrustStatus::from_external(" 部撤 "),
            Some(BrokerEntrustStatus::PartCancelled)
        );
        assert_eq!(
            BrokerEntrustStatus::from_external("废单"),
            Some(BrokerEntrustStatus::Rejected)
        );
        assert!(!BrokerEntrustStatus::from_external("已报").unwrap().is_terminal());
        assert!(!BrokerEntrustStatus::from_external("部成").unwrap().is_terminal());
        assert!(BrokerEntrustStatus::from_external("unknown").is_none());
    }

    #[test]
    fn test_exchange_from_stock_code() {
        assert_eq!(Exchange::from_stock_code("600000"), Exchange::Sh);
        assert_eq!(Exchange::from_stock_code("000001"), Exchange::Sz);
        assert_eq!(Exchange::from_stock_code("300750"), Exchange::Sz);
        assert_eq!(PriceType::Market.gateway_code(Exchange::Sz), 6);
        assert_eq!(PriceType::Limit.gateway_code(Exchange::Sh), 0);
    }
}
