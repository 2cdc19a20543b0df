//! 委托服务
//!
//! 下单校验、冻结与建单、券商分单报单及失败补偿、撤单。
//! 同时实现风控的强平端口。

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use rust_margin_core::config::TradingConfig;
use rust_margin_domain::entities::{
    BrokerEntrust, Contract, Entrust, EntrustError, EntrustOutcome, GatewayErrorLog, NewEntrust,
    Position, PositionError,
};
use rust_margin_domain::enums::{
    BrokerEntrustStatus, EntrustSide, EntrustStatus, Exchange, PriceType,
};
use rust_margin_domain::traits::{
    CacheStore, EntrustRepository, GatewayError, GatewayOrder, LedgerRepository,
    PositionRepository, QuoteProvider, TradeGateway, UnitOfWork, UnitOfWorkFactory,
};
use rust_margin_domain::value_objects::{is_whole_lot, odd_lot, round2, FeeSchedule};
use rust_margin_risk::monitor::keys;
use rust_margin_risk::LiquidationPort;

use crate::broker_pool::{Allocator, BrokerPool};
use crate::execution_engine::{SettlementEngine, SettlementError, SettlementReport};

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("合约不存在: {0}")]
    ContractNotFound(i64),

    #[error("合约不在操盘状态: {0}")]
    ContractInactive(i64),

    #[error("委托数量无效: {0}")]
    InvalidAmount(String),

    #[error("委托价格无效: {0}")]
    InvalidPrice(f64),

    #[error("委托价格超出涨跌停范围: price={price}, 区间=[{low}, {high}]")]
    PriceOutOfBand { price: f64, low: f64, high: f64 },

    #[error("无法获取有效行情: {0}")]
    QuoteUnavailable(String),

    #[error("可用资金不足: 需要 {required}, 可用 {available}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("没有该股票的持仓: {0}")]
    PositionNotFound(String),

    #[error("可卖数量不足: 需要 {required}, 可卖 {sellable}")]
    InsufficientSellable { required: i64, sellable: i64 },

    #[error("合约强平中，暂停买入: {0}")]
    BuyBlocked(i64),

    #[error("委托不存在: {0}")]
    EntrustNotFound(i64),

    #[error(transparent)]
    Entrust(#[from] EntrustError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<PositionError> for OrderError {
    fn from(e: PositionError) -> Self {
        match e {
            PositionError::InsufficientSellable { required, sellable } => {
                OrderError::InsufficientSellable { required, sellable }
            }
            other => OrderError::InvalidAmount(other.to_string()),
        }
    }
}

/// 下单参数
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceOrderRequest {
    pub contract_id: i64,
    pub stock_code: String,
    pub side: EntrustSide,
    pub price_type: PriceType,
    /// 限价单为委托价；市价单在无行情时作为参考价
    pub price: f64,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub entrust_id: i64,
    pub status: EntrustStatus,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawResult {
    /// 本地委托已撤单
    Withdrawn,
    /// 券商委托已发起撤单，终态由对账确认
    Withdrawing { cancel_sent: usize, cancel_failed: usize },
    /// 券商委托已在撤单中，不重复发撤单
    AlreadyWithdrawing,
    /// 委托已被其他流程终结
    AlreadyTerminal,
}

/// 下单相关的交易参数
#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub broker_routing_enabled: bool,
    pub lot_size: i64,
    pub price_floor: f64,
    pub price_limit_pct: f64,
    pub fees: FeeSchedule,
}

impl OrderSettings {
    pub fn from_config(config: &TradingConfig) -> Self {
        Self {
            broker_routing_enabled: config.broker_routing_enabled,
            lot_size: config.lot_size,
            price_floor: config.price_floor,
            price_limit_pct: config.price_limit_pct,
            fees: fee_schedule(config),
        }
    }
}

pub fn fee_schedule(config: &TradingConfig) -> FeeSchedule {
    FeeSchedule {
        commission_rate: config.commission_rate,
        min_commission: config.min_commission,
        stamp_tax_rate: config.stamp_tax_rate,
        transfer_fee_rate: config.transfer_fee_rate,
    }
}

struct BrokerRouting {
    pool: Arc<BrokerPool>,
    gateway: Arc<dyn TradeGateway>,
}

/// 校验通过、尚未建单的委托
struct PreparedOrder {
    request: PlaceOrderRequest,
    price: f64,
    fee: f64,
    position_id: Option<i64>,
}

pub struct OrderService {
    positions: Arc<dyn PositionRepository>,
    entrusts: Arc<dyn EntrustRepository>,
    ledger: Arc<dyn LedgerRepository>,
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    quotes: Arc<dyn QuoteProvider>,
    cache: Arc<dyn CacheStore>,
    settlement: Arc<SettlementEngine>,
    allocator: Allocator,
    settings: OrderSettings,
    routing: Option<BrokerRouting>,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        positions: Arc<dyn PositionRepository>,
        entrusts: Arc<dyn EntrustRepository>,
        ledger: Arc<dyn LedgerRepository>,
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        quotes: Arc<dyn QuoteProvider>,
        cache: Arc<dyn CacheStore>,
        settlement: Arc<SettlementEngine>,
        settings: OrderSettings,
    ) -> Self {
        Self {
            positions,
            entrusts,
            ledger,
            uow_factory,
            quotes,
            cache,
            settlement,
            allocator: Allocator::new(settings.lot_size, settings.fees),
            settings,
            routing: None,
        }
    }

    /// 接入券商通道；未接入或配置关闭时所有委托走内部撮合
    pub fn with_broker_routing(
        mut self,
        pool: Arc<BrokerPool>,
        gateway: Arc<dyn TradeGateway>,
    ) -> Self {
        self.routing = Some(BrokerRouting { pool, gateway });
        self
    }

    pub fn routes_to_brokers(&self) -> bool {
        self.settings.broker_routing_enabled && self.routing.is_some()
    }

    /// 下单
    ///
    /// 业务校验失败直接返回错误，不产生任何副作用；
    /// 券商分单或报单失败时委托以 CANCELLED 返回，冻结与占用已回退。
    pub async fn place(&self, request: PlaceOrderRequest) -> Result<PlacedOrder, OrderError> {
        let prepared = self.prepare(request).await?;
        let entrust = self.create_entrust(prepared).await?;
        info!(
            "委托已创建: entrust_id={}, contract_id={}, {} {} {} 股 @ {}, broker={}",
            entrust.id,
            entrust.contract_id,
            entrust.side.label(),
            entrust.stock_code,
            entrust.amount,
            entrust.price,
            entrust.is_broker_entrust
        );

        if !entrust.is_broker_entrust {
            return Ok(PlacedOrder {
                entrust_id: entrust.id,
                status: entrust.status,
                remark: None,
            });
        }
        self.route(entrust).await
    }

    async fn prepare(&self, request: PlaceOrderRequest) -> Result<PreparedOrder, OrderError> {
        if request.amount <= 0 {
            return Err(OrderError::InvalidAmount(format!(
                "委托数量必须大于 0: {}",
                request.amount
            )));
        }
        let price = self.resolve_price(&request).await?;

        let position_id = match request.side {
            EntrustSide::Buy => {
                if !is_whole_lot(request.amount, self.settings.lot_size) {
                    return Err(OrderError::InvalidAmount(format!(
                        "买入数量必须是 {} 股的整数倍: {}",
                        self.settings.lot_size, request.amount
                    )));
                }
                if self
                    .cache
                    .exists(&keys::withdraw_blocked(request.contract_id))
                    .await?
                {
                    return Err(OrderError::BuyBlocked(request.contract_id));
                }
                None
            }
            EntrustSide::Sell => {
                let position = self
                    .positions
                    .find_by_contract_and_stock(request.contract_id, &request.stock_code)
                    .await?
                    .ok_or_else(|| OrderError::PositionNotFound(request.stock_code.clone()))?;
                let sellable = position.sellable();
                if request.amount > sellable {
                    return Err(OrderError::InsufficientSellable {
                        required: request.amount,
                        sellable,
                    });
                }
                if odd_lot(request.amount, self.settings.lot_size) != 0 && request.amount != sellable
                {
                    return Err(OrderError::InvalidAmount(format!(
                        "零股只能随剩余可卖数量一次卖出: amount={}, sellable={}",
                        request.amount, sellable
                    )));
                }
                Some(position.id)
            }
        };

        let fee = self.settings.fees.fee(request.side, price, request.amount);
        Ok(PreparedOrder {
            request,
            price,
            fee,
            position_id,
        })
    }

    /// 限价单校验涨跌停；市价单取最新价
    async fn resolve_price(&self, request: &PlaceOrderRequest) -> Result<f64, OrderError> {
        let floor = self.settings.price_floor;
        let quote = self
            .quotes
            .latest(&request.stock_code)
            .await?
            .filter(|q| q.is_valid(floor));

        match request.price_type {
            PriceType::Limit => {
                if !request.price.is_finite() || request.price < floor {
                    return Err(OrderError::InvalidPrice(request.price));
                }
                if let Some((low, high)) = quote
                    .as_ref()
                    .and_then(|q| q.limit_band(self.settings.price_limit_pct))
                {
                    if request.price < low || request.price > high {
                        return Err(OrderError::PriceOutOfBand {
                            price: request.price,
                            low,
                            high,
                        });
                    }
                }
                Ok(request.price)
            }
            PriceType::Market => match quote {
                Some(q) => Ok(q.price),
                None if request.price.is_finite() && request.price >= floor => Ok(request.price),
                None => Err(OrderError::QuoteUnavailable(request.stock_code.clone())),
            },
        }
    }

    /// 在一个事务内占用资金或冻结持仓并建单
    async fn create_entrust(&self, prepared: PreparedOrder) -> Result<Entrust, OrderError> {
        let PreparedOrder {
            request,
            price,
            fee,
            position_id,
        } = prepared;

        let mut uow = self.uow_factory.begin().await?;
        let Some(mut contract) = uow.get_contract(request.contract_id).await? else {
            return abort(uow, OrderError::ContractNotFound(request.contract_id)).await;
        };
        if !contract.is_active() {
            return abort(uow, OrderError::ContractInactive(contract.id)).await;
        }

        match request.side {
            EntrustSide::Buy => {
                let cost = round2(price * request.amount as f64 + fee);
                if cost > contract.val_money {
                    let available = contract.val_money;
                    return abort(
                        uow,
                        OrderError::InsufficientFunds {
                            required: cost,
                            available,
                        },
                    )
                    .await;
                }
                contract.val_money = round2(contract.val_money - cost);
                uow.update_contract(&contract).await?;
            }
            EntrustSide::Sell => {
                let position = match position_id {
                    Some(id) => uow.get_position(id).await?,
                    None => None,
                };
                let Some(mut position) = position else {
                    return abort(uow, OrderError::PositionNotFound(request.stock_code.clone()))
                        .await;
                };
                if let Err(e) = position.freeze(request.amount) {
                    return abort(uow, e.into()).await;
                }
                uow.save_position(&position).await?;
            }
        }

        let mut entrust = Entrust::new(NewEntrust {
            contract_id: contract.id,
            user_id: contract.user_id,
            stock_code: request.stock_code.clone(),
            side: request.side,
            price_type: request.price_type,
            price,
            amount: request.amount,
            fee,
            is_broker_entrust: self.routes_to_brokers(),
            position_id,
        })?;
        entrust.id = uow.create_entrust(&entrust).await?;
        uow.commit().await?;
        Ok(entrust)
    }

    /// 分单并逐个报单；任一子委托失败则整笔作废并补偿
    async fn route(&self, entrust: Entrust) -> Result<PlacedOrder, OrderError> {
        let Some(routing) = self.routing.as_ref() else {
            return self.cancel_unrouted(entrust, Vec::new(), "券商通道未接入").await;
        };

        let snapshots = routing.pool.snapshots().await;
        let allocations = match self.allocator.allocate(
            entrust.side,
            &snapshots,
            &entrust.stock_code,
            entrust.price,
            entrust.amount,
        ) {
            Ok(allocations) => allocations,
            Err(e) => {
                warn!("委托分单失败: entrust_id={}, error={}", entrust.id, e);
                let remark = format!("分单失败: {}", e);
                return self.cancel_unrouted(entrust, Vec::new(), &remark).await;
            }
        };

        let mut children: Vec<BrokerEntrust> = allocations
            .iter()
            .map(|a| BrokerEntrust::for_parent(&entrust, a.broker_id, a.amount, a.fee))
            .collect();
        let exchange = Exchange::from_stock_code(&entrust.stock_code);
        let mut failure: Option<String> = None;

        for child in children.iter_mut() {
            let Some((broker, client_id)) = routing.pool.session(child.broker_id).await else {
                failure = Some(format!("券商已断开: broker_id={}", child.broker_id));
                break;
            };
            let order = GatewayOrder {
                side: entrust.side,
                price_type: entrust.price_type,
                holder: broker.holder_for(exchange).to_string(),
                stock_code: entrust.stock_code.clone(),
                price: entrust.price,
                amount: child.amount,
            };
            match routing.gateway.send_order(&client_id, &order).await {
                Ok(entrust_no) => {
                    info!(
                        "子委托报单成功: entrust_id={}, broker_id={}, amount={}, entrust_no={}",
                        entrust.id, child.broker_id, child.amount, entrust_no
                    );
                    child.mark_submitted(entrust_no);
                    let cost = entrust.price * child.amount as f64 + child.fee;
                    routing
                        .pool
                        .apply_submitted(child.broker_id, entrust.side, &entrust.stock_code, child.amount, cost)
                        .await;
                }
                Err(e) => {
                    error!(
                        "子委托报单失败: entrust_id={}, broker_id={}, error={}",
                        entrust.id, child.broker_id, e
                    );
                    self.log_gateway_error(
                        child.broker_id,
                        Some(entrust.id),
                        "send_order",
                        describe_order(&client_id, &order),
                        &e,
                    )
                    .await;
                    failure = Some(format!("报单失败: {}", e));
                    break;
                }
            }
        }

        if let Some(remark) = failure {
            self.revoke_submitted(routing, &entrust, &mut children).await;
            return self.cancel_unrouted(entrust, children, &remark).await;
        }

        let mut uow = self.uow_factory.begin().await?;
        let Some(mut current) = uow.get_entrust(entrust.id).await? else {
            return abort(uow, OrderError::EntrustNotFound(entrust.id)).await;
        };
        if let Err(e) = current.mark_reported(children) {
            return abort(uow, e.into()).await;
        }
        uow.upsert_broker_entrusts(&current.broker_entrusts).await?;
        uow.update_entrust_if_open(&current).await?;
        uow.commit().await?;

        info!(
            "委托已报券商: entrust_id={}, children={}",
            current.id,
            current.broker_entrusts.len()
        );
        Ok(PlacedOrder {
            entrust_id: current.id,
            status: current.status,
            remark: None,
        })
    }

    /// 报单失败后撤回同批已报出的子委托，所有子委托置为终态
    async fn revoke_submitted(
        &self,
        routing: &BrokerRouting,
        entrust: &Entrust,
        children: &mut [BrokerEntrust],
    ) {
        let exchange = Exchange::from_stock_code(&entrust.stock_code);
        for child in children.iter_mut() {
            let Some(entrust_no) = child.entrust_no.clone() else {
                child.status = BrokerEntrustStatus::Rejected;
                continue;
            };
            if let Some((_, client_id)) = routing.pool.session(child.broker_id).await {
                if let Err(e) = routing
                    .gateway
                    .cancel_order(&client_id, exchange, &entrust_no)
                    .await
                {
                    self.log_gateway_error(
                        child.broker_id,
                        Some(entrust.id),
                        "cancel_order",
                        format!("cancel_order client_id={} entrust_no={}", client_id, entrust_no),
                        &e,
                    )
                    .await;
                }
            }
            child.status = BrokerEntrustStatus::Cancelled;
        }
    }

    /// 未能报出的券商委托直接作废，由结算回退冻结与资金占用
    async fn cancel_unrouted(
        &self,
        mut entrust: Entrust,
        children: Vec<BrokerEntrust>,
        remark: &str,
    ) -> Result<PlacedOrder, OrderError> {
        entrust.broker_entrusts = children;
        self.settlement
            .settle(&entrust, &EntrustOutcome::cancelled(remark))
            .await?;
        Ok(PlacedOrder {
            entrust_id: entrust.id,
            status: EntrustStatus::Cancelled,
            remark: Some(remark.to_string()),
        })
    }

    /// 撤单
    ///
    /// 已终结返回错误；撤单中直接返回 `AlreadyWithdrawing`，不会重复向券商发撤单。
    pub async fn withdraw(&self, entrust_id: i64) -> Result<WithdrawResult, OrderError> {
        let entrust = self
            .entrusts
            .find_by_id(entrust_id)
            .await?
            .ok_or(OrderError::EntrustNotFound(entrust_id))?;
        match entrust.check_withdrawable() {
            Ok(()) => {}
            Err(EntrustError::AlreadyWithdrawing) => return Ok(WithdrawResult::AlreadyWithdrawing),
            Err(e) => return Err(e.into()),
        }

        if !entrust.is_broker_entrust {
            let report = self
                .settlement
                .settle(&entrust, &EntrustOutcome::withdrawn("用户撤单"))
                .await?;
            return Ok(match report {
                SettlementReport::Applied { .. } => WithdrawResult::Withdrawn,
                SettlementReport::AlreadyTerminal => WithdrawResult::AlreadyTerminal,
            });
        }

        let mut uow = self.uow_factory.begin().await?;
        let Some(mut current) = uow.get_entrust(entrust_id).await? else {
            return abort(uow, OrderError::EntrustNotFound(entrust_id)).await;
        };
        match current.mark_withdrawing() {
            Ok(()) => {}
            Err(EntrustError::AlreadyWithdrawing) => {
                uow.rollback().await?;
                return Ok(WithdrawResult::AlreadyWithdrawing);
            }
            Err(e) => return abort(uow, e.into()).await,
        }
        if !uow.update_entrust_if_open(&current).await? {
            uow.rollback().await?;
            return Ok(WithdrawResult::AlreadyTerminal);
        }
        uow.commit().await?;
        info!("券商委托撤单中: entrust_id={}", entrust_id);

        let mut cancel_sent = 0;
        let mut cancel_failed = 0;
        let exchange = Exchange::from_stock_code(&current.stock_code);
        for child in current.broker_entrusts.iter().filter(|c| !c.is_terminal()) {
            let Some(entrust_no) = child.entrust_no.as_deref() else {
                continue;
            };
            let session = match self.routing.as_ref() {
                Some(routing) => routing
                    .pool
                    .session(child.broker_id)
                    .await
                    .map(|(_, client_id)| (routing, client_id)),
                None => None,
            };
            let Some((routing, client_id)) = session else {
                warn!(
                    "券商未连接，撤单待重连后由对账处理: entrust_id={}, broker_id={}",
                    entrust_id, child.broker_id
                );
                cancel_failed += 1;
                continue;
            };
            match routing
                .gateway
                .cancel_order(&client_id, exchange, entrust_no)
                .await
            {
                Ok(()) => cancel_sent += 1,
                Err(e) => {
                    cancel_failed += 1;
                    self.log_gateway_error(
                        child.broker_id,
                        Some(entrust_id),
                        "cancel_order",
                        format!("cancel_order client_id={} exchange_id={} entrust_no={}", client_id, exchange.code(), entrust_no),
                        &e,
                    )
                    .await;
                }
            }
        }
        Ok(WithdrawResult::Withdrawing {
            cancel_sent,
            cancel_failed,
        })
    }

    async fn log_gateway_error(
        &self,
        broker_id: i64,
        entrust_id: Option<i64>,
        action: &str,
        request: String,
        error: &GatewayError,
    ) {
        warn!(
            "券商网关调用失败: broker_id={}, action={}, request={}, error={}",
            broker_id, action, request, error
        );
        let log = GatewayErrorLog::new(broker_id, entrust_id, action, request, error.to_string());
        if let Err(e) = self.ledger.append_error_log(&log).await {
            warn!("写入网关错误日志失败: {}", e);
        }
    }
}

#[async_trait]
impl LiquidationPort for OrderService {
    async fn cancel_open_entrusts(
        &self,
        contract_id: i64,
        since: DateTime<Utc>,
    ) -> anyhow::Result<usize> {
        let entrusts = self.entrusts.find_by_contract_since(contract_id, since).await?;
        let mut cancelled = 0;
        for entrust in entrusts.iter().filter(|e| {
            e.check_withdrawable().is_ok()
                && !(e.is_broker_entrust && e.status == EntrustStatus::Unfilled)
        }) {
            match self.withdraw(entrust.id).await {
                Ok(WithdrawResult::AlreadyTerminal | WithdrawResult::AlreadyWithdrawing) => {}
                Ok(_) => cancelled += 1,
                Err(e) => warn!("强平撤单失败: entrust_id={}, error={}", entrust.id, e),
            }
        }
        Ok(cancelled)
    }

    async fn market_sell(
        &self,
        contract: &Contract,
        position: &Position,
        amount: i64,
        reference_price: f64,
    ) -> anyhow::Result<i64> {
        let placed = self
            .place(PlaceOrderRequest {
                contract_id: contract.id,
                stock_code: position.stock_code.clone(),
                side: EntrustSide::Sell,
                price_type: PriceType::Market,
                price: reference_price,
                amount,
            })
            .await
            .map_err(|e| anyhow!("强平卖出失败: {}", e))?;
        if placed.status == EntrustStatus::Cancelled {
            return Err(anyhow!(
                "强平卖出被作废: entrust_id={}, remark={}",
                placed.entrust_id,
                placed.remark.unwrap_or_default()
            ));
        }
        Ok(placed.entrust_id)
    }
}

async fn abort<T>(uow: Box<dyn UnitOfWork>, err: OrderError) -> Result<T, OrderError> {
    uow.rollback().await?;
    Err(err)
}

fn describe_order(client_id: &str, order: &GatewayOrder) -> String {
    let exchange = order.exchange();
    format!(
        "send_order client_id={} type={} price_type={} gddm={} stock_code={} price={} amount={}",
        client_id,
        order.side.code(),
        order.price_type.gateway_code(exchange),
        order.holder,
        order.stock_code,
        order.price,
        order.amount
    )
}
