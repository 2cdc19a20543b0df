//! 券商终端网关接口
//!
//! 对应终端自动化桥的 login / send_order / query / cancel_order 四个调用，
//! 每次调用都必须有超时上限。

use async_trait::async_trait;
use thiserror::Error;

use crate::entities::Broker;
use crate::enums::{EntrustSide, Exchange, PriceType};
use crate::value_objects::{ExternalOrderRecord, FundsSnapshot, HoldingRecord};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("网关调用超时: {action}")]
    Timeout { action: String },

    #[error("网关连接失败: {0}")]
    Transport(String),

    #[error("券商拒绝: {0}")]
    Rejected(String),

    #[error("网关返回无法解析: {0}")]
    Parse(String),
}

/// 查询类型，编码与网关 `type` 参数一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Funds,
    Holdings,
    TodayOrders,
    TodayFills,
    Cancellable,
}

impl QueryKind {
    pub fn code(&self) -> i32 {
        match self {
            QueryKind::Funds => 0,
            QueryKind::Holdings => 1,
            QueryKind::TodayOrders => 2,
            QueryKind::TodayFills => 3,
            QueryKind::Cancellable => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Funds => "funds",
            QueryKind::Holdings => "holdings",
            QueryKind::TodayOrders => "today_orders",
            QueryKind::TodayFills => "today_fills",
            QueryKind::Cancellable => "cancellable",
        }
    }
}

/// 报单请求
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOrder {
    pub side: EntrustSide,
    pub price_type: PriceType,
    /// 股东代码
    pub holder: String,
    pub stock_code: String,
    pub price: f64,
    pub amount: i64,
}

impl GatewayOrder {
    pub fn exchange(&self) -> Exchange {
        Exchange::from_stock_code(&self.stock_code)
    }
}

#[async_trait]
pub trait TradeGateway: Send + Sync {
    /// 登录券商账户，返回会话 client_id
    async fn login(&self, broker: &Broker) -> Result<String, GatewayError>;

    /// 报单，返回券商委托编号
    async fn send_order(&self, client_id: &str, order: &GatewayOrder) -> Result<String, GatewayError>;

    async fn query_funds(&self, client_id: &str) -> Result<FundsSnapshot, GatewayError>;

    async fn query_holdings(&self, client_id: &str) -> Result<Vec<HoldingRecord>, GatewayError>;

    async fn query_today_orders(&self, client_id: &str)
        -> Result<Vec<ExternalOrderRecord>, GatewayError>;

    async fn cancel_order(
        &self,
        client_id: &str,
        exchange: Exchange,
        entrust_no: &str,
    ) -> Result<(), GatewayError>;
}
