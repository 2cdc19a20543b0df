//! 合约风控巡检
//!
//! 每个周期对所有操盘中的合约做一次评估：
//! - CLOSE：当日首次触发时撤销当日未终结委托，市价卖出全部可卖持仓，禁止出金并通知
//! - WARN：每个交易日最多通知一次
//! - HEALTHY：清除强平与警戒标记

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use rust_margin_core::config::RiskConfig;
use rust_margin_core::time::{market_day_start_utc, secs_until_market_day_end, trading_day_key};
use rust_margin_domain::entities::{Contract, Notification};
use rust_margin_domain::enums::{NotificationKind, RiskLevel};
use rust_margin_domain::traits::{
    CacheStore, ContractRepository, PositionRepository, QuoteProvider, UnitOfWorkFactory,
};
use rust_margin_domain::value_objects::round2;

use super::liquidation::{keys, LiquidationPort};
use crate::policies::MarginPolicy;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("缺少行情: {0}")]
    MissingQuote(String),

    #[error("行情价格无效: {stock_code} price={price}")]
    InvalidQuote { stock_code: String, price: f64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 单个合约的评估结果
#[derive(Debug, Clone, PartialEq)]
pub struct RiskEvaluation {
    pub contract_id: i64,
    pub level: RiskLevel,
    /// 浮动盈亏合计
    pub profit: f64,
    /// 权益 = 保证金 + 浮动盈亏
    pub equity: f64,
    /// 本次评估使用的最新价
    pub prices: HashMap<String, f64>,
}

/// 评估后采取的动作
#[derive(Debug, Clone, PartialEq)]
pub enum RiskAction {
    None,
    Warned,
    /// 当日已处理过，不再重复
    AlreadyFlagged,
    Liquidated { cancelled: usize, sells: usize },
    Cleared,
}

/// 一轮巡检的汇总
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskRunSummary {
    pub checked: usize,
    pub warned: usize,
    pub liquidated: usize,
    pub errors: usize,
}

pub struct ContractRiskMonitor {
    contracts: Arc<dyn ContractRepository>,
    positions: Arc<dyn PositionRepository>,
    quotes: Arc<dyn QuoteProvider>,
    cache: Arc<dyn CacheStore>,
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    liquidation: Arc<dyn LiquidationPort>,
    policy: MarginPolicy,
    close_flag_ttl_secs: u64,
    price_floor: f64,
}

impl ContractRiskMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        contracts: Arc<dyn ContractRepository>,
        positions: Arc<dyn PositionRepository>,
        quotes: Arc<dyn QuoteProvider>,
        cache: Arc<dyn CacheStore>,
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        liquidation: Arc<dyn LiquidationPort>,
        config: &RiskConfig,
        price_floor: f64,
    ) -> Self {
        Self {
            contracts,
            positions,
            quotes,
            cache,
            uow_factory,
            liquidation,
            policy: MarginPolicy::new(config.warn_pct, config.close_pct),
            close_flag_ttl_secs: config.close_flag_ttl_hours.max(1) * 3600,
            price_floor,
        }
    }

    /// 计算合约的浮动盈亏与风险等级
    ///
    /// 任一持仓缺少有效行情时整体报错，本周期跳过该合约。
    pub async fn evaluate(&self, contract: &Contract) -> Result<RiskEvaluation, RiskError> {
        let positions = self.positions.find_by_contract(contract.id).await?;
        let mut profit = 0.0;
        let mut prices = HashMap::with_capacity(positions.len());
        for position in positions.iter().filter(|p| p.amount > 0) {
            let quote = self
                .quotes
                .latest(&position.stock_code)
                .await?
                .ok_or_else(|| RiskError::MissingQuote(position.stock_code.clone()))?;
            if !quote.is_valid(self.price_floor) {
                return Err(RiskError::InvalidQuote {
                    stock_code: position.stock_code.clone(),
                    price: quote.price,
                });
            }
            profit += position.unrealized_profit(quote.price);
            prices.insert(position.stock_code.clone(), quote.price);
        }
        let profit = round2(profit);
        Ok(RiskEvaluation {
            contract_id: contract.id,
            level: self.policy.classify(contract.money, profit, contract.init_money),
            profit,
            equity: round2(contract.money + profit),
            prices,
        })
    }

    /// 评估并处置单个合约
    pub async fn check_contract(
        &self,
        contract: &Contract,
        now: DateTime<Utc>,
    ) -> Result<RiskAction, RiskError> {
        let evaluation = self.evaluate(contract).await?;
        let day_key = trading_day_key(now);
        debug!(
            "合约风控: contract_id={}, level={}, equity={}, profit={}",
            contract.id,
            evaluation.level.as_str(),
            evaluation.equity,
            evaluation.profit
        );

        match evaluation.level {
            RiskLevel::Close => self.force_close(contract, &evaluation, &day_key, now).await,
            RiskLevel::Warn => self.warn(contract, &evaluation, &day_key, now).await,
            RiskLevel::Healthy => self.clear_flags(contract.id, &day_key).await,
        }
    }

    /// 巡检所有操盘中的合约，单个合约失败不影响其他合约
    pub async fn run_once(&self, now: DateTime<Utc>) -> anyhow::Result<RiskRunSummary> {
        let contracts = self.contracts.find_active().await?;
        let mut summary = RiskRunSummary::default();
        for contract in &contracts {
            summary.checked += 1;
            match self.check_contract(contract, now).await {
                Ok(RiskAction::Warned) => summary.warned += 1,
                Ok(RiskAction::Liquidated { .. }) => summary.liquidated += 1,
                Ok(_) => {}
                Err(e) => {
                    summary.errors += 1;
                    warn!("合约风控评估失败，下个周期重试: contract_id={}, error={}", contract.id, e);
                }
            }
        }
        Ok(summary)
    }

    pub async fn is_withdraw_blocked(&self, contract_id: i64) -> anyhow::Result<bool> {
        self.cache.exists(&keys::withdraw_blocked(contract_id)).await
    }

    async fn force_close(
        &self,
        contract: &Contract,
        evaluation: &RiskEvaluation,
        day_key: &str,
        now: DateTime<Utc>,
    ) -> Result<RiskAction, RiskError> {
        let close_flag = keys::close_flag(day_key, contract.id);
        let acquired = self
            .cache
            .set_nx(&close_flag, "1", self.close_flag_ttl_secs)
            .await?;
        if !acquired {
            return Ok(RiskAction::AlreadyFlagged);
        }
        warn!(
            "合约触及平仓线，开始强平: contract_id={}, equity={}, init_money={}",
            contract.id, evaluation.equity, contract.init_money
        );

        if let Err(e) = self
            .cache
            .set_ex(
                &keys::withdraw_blocked(contract.id),
                "1",
                self.close_flag_ttl_secs,
            )
            .await
        {
            error!("设置禁止出金标记失败: contract_id={}, error={}", contract.id, e);
            self.release_close_flag(&close_flag).await;
            return Err(e.into());
        }

        let cancelled = match self
            .liquidation
            .cancel_open_entrusts(contract.id, market_day_start_utc(now))
            .await
        {
            Ok(n) => n,
            Err(e) => {
                error!("强平撤单失败: contract_id={}, error={}", contract.id, e);
                0
            }
        };

        // 本地委托撤单后立即解冻，需要重新读取持仓
        let positions = match self.positions.find_by_contract(contract.id).await {
            Ok(positions) => positions,
            Err(e) => {
                self.release_close_flag(&close_flag).await;
                return Err(e.into());
            }
        };
        let mut sells = 0;
        for position in positions.iter().filter(|p| p.sellable() > 0) {
            let Some(price) = evaluation.prices.get(&position.stock_code).copied() else {
                warn!(
                    "强平跳过无行情持仓: contract_id={}, stock_code={}",
                    contract.id, position.stock_code
                );
                continue;
            };
            match self
                .liquidation
                .market_sell(contract, position, position.sellable(), price)
                .await
            {
                Ok(entrust_id) => {
                    sells += 1;
                    info!(
                        "强平卖出已提交: contract_id={}, stock_code={}, amount={}, entrust_id={}",
                        contract.id,
                        position.stock_code,
                        position.sellable(),
                        entrust_id
                    );
                }
                Err(e) => error!(
                    "强平卖出失败: contract_id={}, stock_code={}, error={}",
                    contract.id, position.stock_code, e
                ),
            }
        }

        self.notify(
            contract,
            NotificationKind::ForcedClose,
            "合约已触发强制平仓",
            format!(
                "您的合约 {} 当前权益 {:.2} 元，低于平仓线，系统已撤销当日未成交委托并市价卖出持仓，合约暂停出金。",
                contract.id, evaluation.equity
            ),
        )
        .await?;

        Ok(RiskAction::Liquidated { cancelled, sells })
    }

    /// 释放当日强平标记，下个周期重新触发强平
    async fn release_close_flag(&self, close_flag: &str) {
        if let Err(e) = self.cache.del(close_flag).await {
            error!("释放强平标记失败: key={}, error={}", close_flag, e);
        }
    }

    async fn warn(
        &self,
        contract: &Contract,
        evaluation: &RiskEvaluation,
        day_key: &str,
        now: DateTime<Utc>,
    ) -> Result<RiskAction, RiskError> {
        let ttl = secs_until_market_day_end(now).max(60);
        let first = self
            .cache
            .set_nx(&keys::warn_flag(day_key, contract.id), "1", ttl)
            .await?;
        if !first {
            return Ok(RiskAction::AlreadyFlagged);
        }
        info!(
            "合约触及警戒线: contract_id={}, equity={}",
            contract.id, evaluation.equity
        );
        self.notify(
            contract,
            NotificationKind::RiskWarn,
            "合约触及警戒线",
            format!(
                "您的合约 {} 当前权益 {:.2} 元，已低于警戒线，请及时追加保证金或减仓。",
                contract.id, evaluation.equity
            ),
        )
        .await?;
        Ok(RiskAction::Warned)
    }

    async fn clear_flags(&self, contract_id: i64, day_key: &str) -> Result<RiskAction, RiskError> {
        let blocked_key = keys::withdraw_blocked(contract_id);
        let close_key = keys::close_flag(day_key, contract_id);
        let warn_key = keys::warn_flag(day_key, contract_id);

        let had_flags = self.cache.exists(&blocked_key).await?
            || self.cache.exists(&close_key).await?
            || self.cache.exists(&warn_key).await?;
        if !had_flags {
            return Ok(RiskAction::None);
        }
        self.cache.del(&blocked_key).await?;
        self.cache.del(&close_key).await?;
        self.cache.del(&warn_key).await?;
        info!("合约恢复正常，清除风控标记: contract_id={}", contract_id);
        Ok(RiskAction::Cleared)
    }

    async fn notify(
        &self,
        contract: &Contract,
        kind: NotificationKind,
        title: &str,
        content: String,
    ) -> Result<(), RiskError> {
        let mut uow = self.uow_factory.begin().await?;
        uow.append_notification(&Notification::new(
            contract.user_id,
            contract.id,
            kind,
            title,
            content,
        ))
        .await?;
        uow.commit().await?;
        Ok(())
    }
}
