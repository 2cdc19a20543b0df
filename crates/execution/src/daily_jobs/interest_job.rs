//! 借款利息收取
//!
//! 每个交易日在收息窗口内对每个操盘中的合约收取一次：
//! 利息 = 借入资金 × 日利率，从保证金扣除并记流水。

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use rust_margin_core::config::InterestConfig;
use rust_margin_core::time::{is_within_window, trading_day_key};
use rust_margin_domain::entities::{Contract, FeeRecord, Notification};
use rust_margin_domain::enums::{LedgerKind, NotificationKind};
use rust_margin_domain::traits::{CacheStore, ContractRepository, UnitOfWorkFactory};
use rust_margin_domain::value_objects::round2;

use crate::order_manager::ContractFundsService;

/// 收息标记保留两天，跨日后自然失效
const INTEREST_FLAG_TTL_SECS: u64 = 2 * 24 * 3600;

pub fn interest_flag_key(day_key: &str, contract_id: i64) -> String {
    format!("interest:{}:{}", day_key, contract_id)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterestSummary {
    pub charged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total: f64,
}

pub struct InterestJob {
    contracts: Arc<dyn ContractRepository>,
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    cache: Arc<dyn CacheStore>,
    funds: Arc<ContractFundsService>,
    config: InterestConfig,
}

impl InterestJob {
    pub fn new(
        contracts: Arc<dyn ContractRepository>,
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        cache: Arc<dyn CacheStore>,
        funds: Arc<ContractFundsService>,
        config: InterestConfig,
    ) -> Self {
        Self {
            contracts,
            uow_factory,
            cache,
            funds,
            config,
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<InterestSummary> {
        let mut summary = InterestSummary::default();
        if !is_within_window(now, self.config.window_start, self.config.window_end) {
            return Ok(summary);
        }
        let day_key = trading_day_key(now);

        for contract in self.contracts.find_active().await? {
            let interest = round2(contract.borrowed() * self.config.daily_rate);
            if interest <= 0.0 {
                summary.skipped += 1;
                continue;
            }
            let flag = interest_flag_key(&day_key, contract.id);
            if !self.cache.set_nx(&flag, "1", INTEREST_FLAG_TTL_SECS).await? {
                summary.skipped += 1;
                continue;
            }
            match self.charge(&contract, interest, &day_key).await {
                Ok(()) => {
                    summary.charged += 1;
                    summary.total = round2(summary.total + interest);
                    if let Err(e) = self.funds.recompute(contract.id).await {
                        error!("收息后重算可用资金失败: contract_id={}, error={}", contract.id, e);
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    error!("收取利息失败，稍后重试: contract_id={}, error={}", contract.id, e);
                    // 释放标记，窗口内下个周期重试
                    self.cache.del(&flag).await?;
                }
            }
        }

        if summary.charged > 0 {
            info!(
                "利息收取完成: day={}, charged={}, total={}",
                day_key, summary.charged, summary.total
            );
        }
        Ok(summary)
    }

    async fn charge(&self, contract: &Contract, interest: f64, day_key: &str) -> Result<()> {
        let mut uow = self.uow_factory.begin().await?;
        let Some(mut current) = uow.get_contract(contract.id).await? else {
            uow.rollback().await?;
            return Ok(());
        };
        current.adjust_money(-interest);
        uow.append_fee(&FeeRecord::new(
            current.id,
            current.user_id,
            None,
            LedgerKind::Interest,
            -interest,
            current.money,
            format!("{} 借款利息", day_key),
        ))
        .await?;
        uow.append_notification(&Notification::new(
            current.user_id,
            current.id,
            NotificationKind::Interest,
            "借款利息已扣除",
            format!(
                "合约 {} 今日借款利息 {:.2} 元已从保证金扣除，当前保证金 {:.2} 元。",
                current.id, interest, current.money
            ),
        ))
        .await?;
        uow.update_contract(&current).await?;
        uow.commit().await
    }
}
