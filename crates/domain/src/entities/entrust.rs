//! 委托实体 (Entrust Aggregate Root)
//!
//! 状态机：
//!
//! ```text
//! 非券商委托:  UNFILLED ──成交──> FILLED
//!                     └──撤单──> WITHDRAWN
//! 券商委托:    UNFILLED ──分配成功──> REPORTED ──全部子委托终结──> {FILLED, PART_FILLED_PART_WITHDRAWN, WITHDRAWN, CANCELLED}
//!                     └──分配/报单失败──> CANCELLED
//!             REPORTED ──用户撤单──> WITHDRAWING ──子委托终结──> 终态
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::{BrokerEntrustStatus, EntrustSide, EntrustStatus, PriceType};
use crate::value_objects::{round2, ExternalOrderRecord};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntrustError {
    #[error("委托已终结，当前状态: {0:?}")]
    AlreadyTerminal(EntrustStatus),

    #[error("委托正在撤单中")]
    AlreadyWithdrawing,

    #[error("委托状态不允许此操作: {from:?} -> {to:?}")]
    InvalidTransition {
        from: EntrustStatus,
        to: EntrustStatus,
    },

    #[error("委托参数无效: {0}")]
    InvalidParameter(String),
}

/// 新建委托的参数
#[derive(Debug, Clone)]
pub struct NewEntrust {
    pub contract_id: i64,
    pub user_id: i64,
    pub stock_code: String,
    pub side: EntrustSide,
    pub price_type: PriceType,
    /// 限价单为委托价；市价单为下单时的参考价
    pub price: f64,
    pub amount: i64,
    /// 预估费用
    pub fee: f64,
    pub is_broker_entrust: bool,
    /// 卖出时关联的持仓
    pub position_id: Option<i64>,
}

/// 委托的终结结果
#[derive(Debug, Clone, PartialEq)]
pub struct EntrustOutcome {
    pub status: EntrustStatus,
    pub deal_amount: i64,
    pub deal_price: f64,
    pub remark: Option<String>,
}

impl EntrustOutcome {
    pub fn filled(deal_amount: i64, deal_price: f64) -> Self {
        Self {
            status: EntrustStatus::Filled,
            deal_amount,
            deal_price,
            remark: None,
        }
    }

    pub fn withdrawn(remark: &str) -> Self {
        Self {
            status: EntrustStatus::Withdrawn,
            deal_amount: 0,
            deal_price: 0.0,
            remark: Some(remark.to_string()),
        }
    }

    pub fn cancelled(remark: &str) -> Self {
        Self {
            status: EntrustStatus::Cancelled,
            deal_amount: 0,
            deal_price: 0.0,
            remark: Some(remark.to_string()),
        }
    }
}

/// 券商子委托 - 某个券商账户承担的一部分委托
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerEntrust {
    /// 0 表示尚未入库
    pub id: i64,
    pub entrust_id: i64,
    pub broker_id: i64,
    /// 券商返回的委托编号，报单成功后才有
    pub entrust_no: Option<String>,
    pub stock_code: String,
    pub side: EntrustSide,
    pub price_type: PriceType,
    pub price: f64,
    pub amount: i64,
    /// 参考费用，不参与结算
    pub fee: f64,
    pub deal_amount: i64,
    pub deal_price: f64,
    pub status: BrokerEntrustStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BrokerEntrust {
    /// 按父委托生成子委托，继承价格、方向和价格类型
    pub fn for_parent(parent: &Entrust, broker_id: i64, amount: i64, fee: f64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            entrust_id: parent.id,
            broker_id,
            entrust_no: None,
            stock_code: parent.stock_code.clone(),
            side: parent.side,
            price_type: parent.price_type,
            price: parent.price,
            amount,
            fee,
            deal_amount: 0,
            deal_price: 0.0,
            status: BrokerEntrustStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 报单成功
    pub fn mark_submitted(&mut self, entrust_no: String) {
        self.entrust_no = Some(entrust_no);
        self.status = BrokerEntrustStatus::Reported;
        self.updated_at = Utc::now();
    }

    /// 用券商回报刷新状态与成交，返回是否有变化
    ///
    /// 已终结的子委托不再变化；无法识别的状态只刷新成交数据。
    pub fn apply_external(&mut self, record: &ExternalOrderRecord) -> bool {
        if self.is_terminal() {
            return false;
        }
        let mut changed = false;
        if let Some(status) = record.status() {
            if status != self.status {
                self.status = status;
                changed = true;
            }
        }
        if record.deal_amount != self.deal_amount {
            self.deal_amount = record.deal_amount.max(0);
            changed = true;
        }
        if (record.deal_price - self.deal_price).abs() > f64::EPSILON {
            self.deal_price = record.deal_price;
            changed = true;
        }
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }
}

/// 委托实体 - 聚合根
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entrust {
    /// 0 表示尚未入库
    pub id: i64,
    pub contract_id: i64,
    pub user_id: i64,
    pub stock_code: String,
    pub side: EntrustSide,
    pub price_type: PriceType,
    pub price: f64,
    pub amount: i64,
    pub deal_amount: i64,
    pub deal_price: f64,
    /// 费用：未终结时为预估值，终结后为实际收取值
    pub fee: f64,
    pub status: EntrustStatus,
    pub is_broker_entrust: bool,
    pub position_id: Option<i64>,
    pub remark: Option<String>,
    /// 子委托，按券商优先级排列
    pub broker_entrusts: Vec<BrokerEntrust>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entrust {
    /// 创建新委托，初始状态为 UNFILLED
    pub fn new(params: NewEntrust) -> Result<Self, EntrustError> {
        if params.amount <= 0 {
            return Err(EntrustError::InvalidParameter("委托数量必须大于 0".to_string()));
        }
        if !params.price.is_finite() || params.price <= 0.0 {
            return Err(EntrustError::InvalidParameter(format!(
                "委托价格无效: {}",
                params.price
            )));
        }
        if params.stock_code.trim().is_empty() {
            return Err(EntrustError::InvalidParameter("证券代码不能为空".to_string()));
        }
        if params.side == EntrustSide::Sell && params.position_id.is_none() {
            return Err(EntrustError::InvalidParameter("卖出委托必须关联持仓".to_string()));
        }

        let now = Utc::now();
        Ok(Self {
            id: 0,
            contract_id: params.contract_id,
            user_id: params.user_id,
            stock_code: params.stock_code.trim().to_string(),
            side: params.side,
            price_type: params.price_type,
            price: params.price,
            amount: params.amount,
            deal_amount: 0,
            deal_price: 0.0,
            fee: params.fee,
            status: EntrustStatus::Unfilled,
            is_broker_entrust: params.is_broker_entrust,
            position_id: params.position_id,
            remark: None,
            broker_entrusts: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn unfilled_amount(&self) -> i64 {
        (self.amount - self.deal_amount).max(0)
    }

    /// 子委托成交数量之和
    pub fn children_deal_amount(&self) -> i64 {
        self.broker_entrusts.iter().map(|c| c.deal_amount).sum()
    }

    /// 未终结买单占用的资金
    pub fn pending_buy_exposure(&self) -> f64 {
        if self.is_terminal() || self.side != EntrustSide::Buy {
            return 0.0;
        }
        round2(self.price * self.unfilled_amount() as f64 + self.fee)
    }

    /// 未终结卖单冻结的股数
    pub fn pending_sell_amount(&self) -> i64 {
        if self.is_terminal() || self.side != EntrustSide::Sell {
            return 0;
        }
        self.unfilled_amount()
    }

    /// 分配并报单成功：UNFILLED -> REPORTED
    pub fn mark_reported(&mut self, children: Vec<BrokerEntrust>) -> Result<(), EntrustError> {
        if self.status != EntrustStatus::Unfilled || !self.is_broker_entrust {
            return Err(EntrustError::InvalidTransition {
                from: self.status,
                to: EntrustStatus::Reported,
            });
        }
        self.broker_entrusts = children;
        self.status = EntrustStatus::Reported;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 撤单前的状态检查
    pub fn check_withdrawable(&self) -> Result<(), EntrustError> {
        if self.is_terminal() {
            return Err(EntrustError::AlreadyTerminal(self.status));
        }
        if self.status == EntrustStatus::Withdrawing {
            return Err(EntrustError::AlreadyWithdrawing);
        }
        Ok(())
    }

    /// 券商委托发起撤单：REPORTED -> WITHDRAWING
    pub fn mark_withdrawing(&mut self) -> Result<(), EntrustError> {
        self.check_withdrawable()?;
        if self.status != EntrustStatus::Reported {
            return Err(EntrustError::InvalidTransition {
                from: self.status,
                to: EntrustStatus::Withdrawing,
            });
        }
        self.status = EntrustStatus::Withdrawing;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 进入终态
    pub fn finish(&mut self, outcome: &EntrustOutcome) -> Result<(), EntrustError> {
        if self.is_terminal() {
            return Err(EntrustError::AlreadyTerminal(self.status));
        }
        if !outcome.status.is_terminal() {
            return Err(EntrustError::InvalidTransition {
                from: self.status,
                to: outcome.status,
            });
        }
        // 券商委托只能在报单后由对账终结；分配失败时从 UNFILLED 直接作废
        if self.is_broker_entrust
            && self.status == EntrustStatus::Unfilled
            && outcome.status != EntrustStatus::Cancelled
        {
            return Err(EntrustError::InvalidTransition {
                from: self.status,
                to: outcome.status,
            });
        }
        self.status = outcome.status;
        self.deal_amount = outcome.deal_amount;
        self.deal_price = outcome.deal_price;
        if outcome.remark.is_some() {
            self.remark = outcome.remark.clone();
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 根据子委托计算券商委托的终结结果
    ///
    /// 任一子委托未终结时返回 `None`，整笔委托保持不变。
    /// 成交价取有效成交子委托中的最优价：买入取最高，卖出取最低；
    /// 低于 `price_floor` 的回报价视为无效数据。
    pub fn resolve_broker_outcome(&self, price_floor: f64) -> Option<EntrustOutcome> {
        if self.broker_entrusts.iter().any(|c| !c.is_terminal()) {
            return None;
        }
        if self.broker_entrusts.is_empty() {
            return Some(EntrustOutcome::cancelled("无券商子委托"));
        }

        let deal_amount = self.children_deal_amount();
        if deal_amount == 0 {
            let all_rejected = self
                .broker_entrusts
                .iter()
                .all(|c| c.status == BrokerEntrustStatus::Rejected);
            return Some(if all_rejected {
                EntrustOutcome::cancelled("券商废单")
            } else {
                EntrustOutcome::withdrawn("已撤单")
            });
        }

        let valid_prices = self
            .broker_entrusts
            .iter()
            .filter(|c| c.deal_amount > 0 && c.deal_price.is_finite() && c.deal_price >= price_floor)
            .map(|c| c.deal_price);
        let best = match self.side {
            EntrustSide::Buy => valid_prices.fold(None, |acc: Option<f64>, p| {
                Some(acc.map_or(p, |a| a.max(p)))
            }),
            EntrustSide::Sell => valid_prices.fold(None, |acc: Option<f64>, p| {
                Some(acc.map_or(p, |a| a.min(p)))
            }),
        };
        let deal_price = best.unwrap_or(self.price);

        if deal_amount >= self.amount {
            Some(EntrustOutcome::filled(deal_amount, deal_price))
        } else {
            Some(EntrustOutcome {
                status: EntrustStatus::PartFilledPartWithdrawn,
                deal_amount,
                deal_price,
                remark: Some("部成部撤".to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy(amount: i64, broker: bool) -> Entrust {
        let mut entrust = Entrust::new(NewEntrust {
            contract_id: 1,
            user_id: 7,
            stock_code: "600000".to_string(),
            side: EntrustSide::Buy,
            price_type: PriceType::Limit,
            price: 10.0,
            amount,
            fee: 5.2,
            is_broker_entrust: broker,
            position_id: None,
        })
        .unwrap();
        entrust.id = 11;
        entrust
    }

    fn child(parent: &Entrust, broker_id: i64, amount: i64, status: BrokerEntrustStatus, deal: i64, price: f64) -> BrokerEntrust {
        let mut c = BrokerEntrust::for_parent(parent, broker_id, amount, 0.0);
        c.status = status;
        c.deal_amount = deal;
        c.deal_price = price;
        c
    }

    #[test]
    fn test_new_rejects_bad_parameters() {
        let mut params = NewEntrust {
            contract_id: 1,
            user_id: 7,
            stock_code: "000001".to_string(),
            side: EntrustSide::Buy,
            price_type: PriceType::Limit,
            price: 10.0,
            amount: 0,
            fee: 0.0,
            is_broker_entrust: false,
            position_id: None,
        };
        assert!(Entrust::new(params.clone()).is_err());
        params.amount = 100;
        params.side = EntrustSide::Sell;
        assert!(Entrust::new(params).is_err());
    }

    #[test]
    fn test_pending_children_block_transition() {
        let mut entrust = buy(1000, true);
        let children = vec![
            child(&entrust, 1, 500, BrokerEntrustStatus::Filled, 500, 10.0),
            child(&entrust, 2, 500, BrokerEntrustStatus::PartFilled, 200, 10.0),
        ];
        entrust.mark_reported(children).unwrap();
        assert!(entrust.resolve_broker_outcome(0.01).is_none());
    }

    #[test]
    fn test_all_filled_takes_highest_valid_buy_price() {
        let mut entrust = buy(1000, true);
        let children = vec![
            child(&entrust, 1, 500, BrokerEntrustStatus::Filled, 500, 10.02),
            child(&entrust, 2, 300, BrokerEntrustStatus::Filled, 300, 10.05),
            child(&entrust, 3, 200, BrokerEntrustStatus::Filled, 200, 0.0),
        ];
        entrust.mark_reported(children).unwrap();
        let outcome = entrust.resolve_broker_outcome(0.01).unwrap();
        assert_eq!(outcome.status, EntrustStatus::Filled);
        assert_eq!(outcome.deal_amount, 1000);
        assert_eq!(outcome.deal_price, 10.05);
    }

    #[test]
    fn test_all_filled_takes_lowest_valid_sell_price() {
        let mut entrust = Entrust::new(NewEntrust {
            contract_id: 1,
            user_id: 7,
            stock_code: "600000".to_string(),
            side: EntrustSide::Sell,
            price_type: PriceType::Limit,
            price: 11.0,
            amount: 450,
            fee: 0.0,
            is_broker_entrust: true,
            position_id: Some(3),
        })
        .unwrap();
        entrust.id = 12;
        let children = vec![
            child(&entrust, 1, 300, BrokerEntrustStatus::Filled, 300, 11.05),
            child(&entrust, 2, 150, BrokerEntrustStatus::Filled, 150, 11.02),
        ];
        entrust.mark_reported(children).unwrap();
        let outcome = entrust.resolve_broker_outcome(0.01).unwrap();
        assert_eq!(outcome.status, EntrustStatus::Filled);
        assert_eq!(outcome.deal_amount, 450);
        assert_eq!(outcome.deal_price, 11.02);

        // 低于下限的回报价不参与取价
        entrust.broker_entrusts[1].deal_price = 0.001;
        let outcome = entrust.resolve_broker_outcome(0.01).unwrap();
        assert_eq!(outcome.deal_price, 11.05);
    }

    #[test]
    fn test_partial_and_rejected_outcomes() {
        let mut entrust = buy(1000, true);
        let children = vec![
            child(&entrust, 1, 500, BrokerEntrustStatus::PartCancelled, 300, 9.98),
            child(&entrust, 2, 500, BrokerEntrustStatus::Cancelled, 0, 0.0),
        ];
        entrust.mark_reported(children).unwrap();
        let outcome = entrust.resolve_broker_outcome(0.01).unwrap();
        assert_eq!(outcome.status, EntrustStatus::PartFilledPartWithdrawn);
        assert_eq!(outcome.deal_amount, 300);

        let mut rejected = buy(1000, true);
        let children = vec![
            child(&rejected, 1, 1000, BrokerEntrustStatus::Rejected, 0, 0.0),
        ];
        rejected.mark_reported(children).unwrap();
        let outcome = rejected.resolve_broker_outcome(0.01).unwrap();
        assert_eq!(outcome.status, EntrustStatus::Cancelled);
    }

    #[test]
    fn test_withdraw_checks() {
        let mut entrust = buy(1000, true);
        entrust.mark_reported(vec![]).unwrap();
        entrust.mark_withdrawing().unwrap();
        assert_eq!(
            entrust.check_withdrawable(),
            Err(EntrustError::AlreadyWithdrawing)
        );

        entrust.finish(&EntrustOutcome::withdrawn("已撤单")).unwrap();
        assert_eq!(
            entrust.check_withdrawable(),
            Err(EntrustError::AlreadyTerminal(EntrustStatus::Withdrawn))
        );
        assert!(entrust.finish(&EntrustOutcome::filled(1000, 10.0)).is_err());
    }

    #[test]
    fn test_broker_entrust_cannot_fill_before_report() {
        let mut entrust = buy(1000, true);
        assert!(entrust.finish(&EntrustOutcome::filled(1000, 10.0)).is_err());
        assert!(entrust.finish(&EntrustOutcome::cancelled("分配失败")).is_ok());
    }

    #[test]
    fn test_pending_exposure() {
        let entrust = buy(1000, false);
        assert_eq!(entrust.pending_buy_exposure(), 10_005.2);
        assert_eq!(entrust.pending_sell_amount(), 0);
    }

    #[test]
    fn test_terminal_child_ignores_late_reports() {
        let entrust = buy(1000, true);
        let mut c = child(&entrust, 1, 1000, BrokerEntrustStatus::Filled, 1000, 10.0);
        let record = ExternalOrderRecord {
            entrust_no: "A1".to_string(),
            stock_code: "600000".to_string(),
            raw_status: "已撤".to_string(),
            deal_amount: 0,
            deal_price: 0.0,
        };
        assert!(!c.apply_external(&record));
        assert_eq!(c.status, BrokerEntrustStatus::Filled);
    }
}
