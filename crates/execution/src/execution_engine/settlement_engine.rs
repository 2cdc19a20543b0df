//! 委托结算
//!
//! 在一个工作单元内把委托的终结结果落到持仓、保证金、费用流水和通知上，
//! 任一步失败整体回滚，委托保持原状态等待下个周期重试。

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use rust_margin_domain::entities::{
    Contract, Entrust, EntrustError, EntrustOutcome, FeeRecord, Notification, Position,
    PositionError,
};
use rust_margin_domain::enums::{EntrustSide, EntrustStatus, LedgerKind, NotificationKind};
use rust_margin_domain::traits::{UnitOfWork, UnitOfWorkFactory};
use rust_margin_domain::value_objects::FeeSchedule;

use crate::order_manager::ContractFundsService;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("委托不存在: {0}")]
    EntrustNotFound(i64),

    #[error("合约不存在: {0}")]
    ContractNotFound(i64),

    #[error("卖出委托关联的持仓不存在: entrust_id={0}")]
    PositionNotFound(i64),

    #[error(transparent)]
    Entrust(#[from] EntrustError),

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettlementReport {
    Applied {
        entrust_id: i64,
        status: EntrustStatus,
        deal_amount: i64,
        deal_price: f64,
        fee: f64,
        profit: f64,
    },
    /// 委托已被其他流程终结，本次未做任何修改
    AlreadyTerminal,
}

pub struct SettlementEngine {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    funds: Arc<ContractFundsService>,
    fees: FeeSchedule,
}

impl SettlementEngine {
    pub fn new(
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        funds: Arc<ContractFundsService>,
        fees: FeeSchedule,
    ) -> Self {
        Self {
            uow_factory,
            funds,
            fees,
        }
    }

    /// 结算委托
    ///
    /// `entrust` 携带最新的子委托状态（券商委托），`outcome` 必须是终态。
    /// 委托在库中已是终态时直接返回 `AlreadyTerminal`，不产生任何流水。
    pub async fn settle(
        &self,
        entrust: &Entrust,
        outcome: &EntrustOutcome,
    ) -> Result<SettlementReport, SettlementError> {
        let mut uow = self.uow_factory.begin().await?;
        let Some(mut updated) = uow.get_entrust(entrust.id).await? else {
            uow.rollback().await?;
            return Err(SettlementError::EntrustNotFound(entrust.id));
        };
        if updated.is_terminal() {
            uow.rollback().await?;
            debug!(
                "委托已终结，跳过结算: entrust_id={}, status={}",
                entrust.id,
                updated.status.as_str()
            );
            return Ok(SettlementReport::AlreadyTerminal);
        }
        if updated.is_broker_entrust {
            updated.broker_entrusts = entrust.broker_entrusts.clone();
        }
        // 卖单下单时冻结了全部委托数量
        let frozen = updated.amount;
        updated.finish(outcome)?;
        updated.fee = if updated.deal_amount > 0 {
            self.fees
                .fee(updated.side, updated.deal_price, updated.deal_amount)
        } else {
            0.0
        };

        let Some(mut contract) = uow.get_contract(updated.contract_id).await? else {
            uow.rollback().await?;
            return Err(SettlementError::ContractNotFound(updated.contract_id));
        };

        let profit = match updated.side {
            EntrustSide::Buy => {
                self.apply_buy(uow.as_mut(), &mut contract, &updated).await?;
                0.0
            }
            EntrustSide::Sell => {
                self.apply_sell(uow.as_mut(), &mut contract, &updated, frozen)
                    .await?
            }
        };

        uow.update_contract(&contract).await?;
        if updated.is_broker_entrust && !updated.broker_entrusts.is_empty() {
            let ids = uow.upsert_broker_entrusts(&updated.broker_entrusts).await?;
            for (child, id) in updated.broker_entrusts.iter_mut().zip(ids) {
                child.id = id;
            }
        }
        if !uow.update_entrust_if_open(&updated).await? {
            uow.rollback().await?;
            return Ok(SettlementReport::AlreadyTerminal);
        }
        uow.append_notification(&entrust_notification(&updated))
            .await?;
        uow.commit().await?;

        info!(
            "委托结算完成: entrust_id={}, status={}, deal_amount={}, deal_price={}, fee={}, profit={}",
            updated.id,
            updated.status.as_str(),
            updated.deal_amount,
            updated.deal_price,
            updated.fee,
            profit
        );

        if let Err(e) = self.funds.recompute(updated.contract_id).await {
            warn!(
                "结算后重算可用资金失败: contract_id={}, error={}",
                updated.contract_id, e
            );
        }

        Ok(SettlementReport::Applied {
            entrust_id: updated.id,
            status: updated.status,
            deal_amount: updated.deal_amount,
            deal_price: updated.deal_price,
            fee: updated.fee,
            profit,
        })
    }

    async fn apply_buy(
        &self,
        uow: &mut dyn UnitOfWork,
        contract: &mut Contract,
        entrust: &Entrust,
    ) -> Result<(), SettlementError> {
        if entrust.deal_amount == 0 {
            return Ok(());
        }
        let position = match uow
            .find_position(entrust.contract_id, &entrust.stock_code)
            .await?
        {
            Some(mut existing) => {
                existing.apply_buy(entrust.deal_amount, entrust.deal_price)?;
                existing
            }
            None => Position::open(
                entrust.contract_id,
                entrust.user_id,
                &entrust.stock_code,
                entrust.deal_amount,
                entrust.deal_price,
            ),
        };
        uow.save_position(&position).await?;

        contract.adjust_money(-entrust.fee);
        uow.append_fee(&FeeRecord::new(
            contract.id,
            contract.user_id,
            Some(entrust.id),
            LedgerKind::BuyFee,
            -entrust.fee,
            contract.money,
            format!("买入 {} {} 股手续费", entrust.stock_code, entrust.deal_amount),
        ))
        .await?;
        Ok(())
    }

    /// 返回已实现盈亏
    async fn apply_sell(
        &self,
        uow: &mut dyn UnitOfWork,
        contract: &mut Contract,
        entrust: &Entrust,
        frozen: i64,
    ) -> Result<f64, SettlementError> {
        let position_id = entrust
            .position_id
            .ok_or(SettlementError::PositionNotFound(entrust.id))?;
        let Some(mut position) = uow.get_position(position_id).await? else {
            return Err(SettlementError::PositionNotFound(entrust.id));
        };

        if entrust.deal_amount == 0 {
            position.unfreeze(frozen);
            uow.save_position(&position).await?;
            return Ok(0.0);
        }

        let result = position.apply_sell(entrust.deal_amount, entrust.deal_price, frozen)?;
        if result.closed {
            uow.delete_position(position.id).await?;
        } else {
            uow.save_position(&position).await?;
        }

        contract.adjust_money(-entrust.fee);
        uow.append_fee(&FeeRecord::new(
            contract.id,
            contract.user_id,
            Some(entrust.id),
            LedgerKind::SellFee,
            -entrust.fee,
            contract.money,
            format!("卖出 {} {} 股手续费", entrust.stock_code, entrust.deal_amount),
        ))
        .await?;

        contract.adjust_money(result.profit);
        uow.append_fee(&FeeRecord::new(
            contract.id,
            contract.user_id,
            Some(entrust.id),
            LedgerKind::Profit,
            result.profit,
            contract.money,
            format!("卖出 {} {} 股盈亏", entrust.stock_code, entrust.deal_amount),
        ))
        .await?;
        Ok(result.profit)
    }
}

fn entrust_notification(entrust: &Entrust) -> Notification {
    let (kind, title, content) = match entrust.status {
        EntrustStatus::Filled | EntrustStatus::PartFilledPartWithdrawn => (
            NotificationKind::EntrustFilled,
            "委托成交",
            format!(
                "您的委托 {} {} {} 已成交 {} 股，成交均价 {:.2} 元。",
                entrust.id,
                entrust.side.label(),
                entrust.stock_code,
                entrust.deal_amount,
                entrust.deal_price
            ),
        ),
        EntrustStatus::Cancelled => (
            NotificationKind::EntrustCancelled,
            "委托已作废",
            format!(
                "您的委托 {} {} {} 已作废：{}",
                entrust.id,
                entrust.side.label(),
                entrust.stock_code,
                entrust.remark.as_deref().unwrap_or("")
            ),
        ),
        _ => (
            NotificationKind::EntrustWithdrawn,
            "委托已撤单",
            format!(
                "您的委托 {} {} {} 已撤单。",
                entrust.id,
                entrust.side.label(),
                entrust.stock_code
            ),
        ),
    };
    Notification::new(entrust.user_id, entrust.contract_id, kind, title, content)
}
