//! 日终解冻
//!
//! 收盘后每个交易日执行一次：撤销所有未成交的内部委托，
//! 再按仍未终结的卖单校正每个持仓的冻结数量。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveTime, Utc};
use tracing::{error, info, warn};

use rust_margin_core::time::{is_after, trading_day_key};
use rust_margin_domain::entities::EntrustOutcome;
use rust_margin_domain::traits::{
    CacheStore, EntrustRepository, PositionRepository, UnitOfWorkFactory,
};

use crate::execution_engine::{SettlementEngine, SettlementReport};
use crate::order_manager::ContractFundsService;

const EOD_FLAG_TTL_SECS: u64 = 2 * 24 * 3600;

pub fn eod_flag_key(day_key: &str) -> String {
    format!("eod:unfreeze:{}", day_key)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EodSummary {
    pub withdrawn: usize,
    pub positions_fixed: usize,
    pub failed: usize,
}

pub struct EodUnfreezeJob {
    entrusts: Arc<dyn EntrustRepository>,
    positions: Arc<dyn PositionRepository>,
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    cache: Arc<dyn CacheStore>,
    settlement: Arc<SettlementEngine>,
    funds: Arc<ContractFundsService>,
    unfreeze_at: NaiveTime,
}

impl EodUnfreezeJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entrusts: Arc<dyn EntrustRepository>,
        positions: Arc<dyn PositionRepository>,
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        cache: Arc<dyn CacheStore>,
        settlement: Arc<SettlementEngine>,
        funds: Arc<ContractFundsService>,
        unfreeze_at: NaiveTime,
    ) -> Self {
        Self {
            entrusts,
            positions,
            uow_factory,
            cache,
            settlement,
            funds,
            unfreeze_at,
        }
    }

    /// 未到日终时间或当日已执行时返回 `None`
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<Option<EodSummary>> {
        if !is_after(now, self.unfreeze_at) {
            return Ok(None);
        }
        let day_key = trading_day_key(now);
        let flag = eod_flag_key(&day_key);
        if !self.cache.set_nx(&flag, "1", EOD_FLAG_TTL_SECS).await? {
            return Ok(None);
        }

        match self.unfreeze().await {
            Ok(summary) => {
                info!(
                    "日终解冻完成: day={}, withdrawn={}, positions_fixed={}, failed={}",
                    day_key, summary.withdrawn, summary.positions_fixed, summary.failed
                );
                Ok(Some(summary))
            }
            Err(e) => {
                self.cache.del(&flag).await?;
                Err(e)
            }
        }
    }

    async fn unfreeze(&self) -> Result<EodSummary> {
        let mut summary = EodSummary::default();
        let mut touched = BTreeSet::new();

        for entrust in self.entrusts.find_open_local_entrusts().await? {
            match self
                .settlement
                .settle(&entrust, &EntrustOutcome::withdrawn("收盘未成交，系统撤单"))
                .await
            {
                Ok(SettlementReport::Applied { .. }) => {
                    summary.withdrawn += 1;
                    touched.insert(entrust.contract_id);
                }
                Ok(SettlementReport::AlreadyTerminal) => {}
                Err(e) => {
                    summary.failed += 1;
                    error!("日终撤单失败: entrust_id={}, error={}", entrust.id, e);
                }
            }
        }

        // 券商委托仍可能在途，其冻结保留
        let mut claimed: HashMap<i64, i64> = HashMap::new();
        for entrust in self.entrusts.find_open_broker_entrusts().await? {
            if let Some(position_id) = entrust.position_id {
                *claimed.entry(position_id).or_insert(0) += entrust.pending_sell_amount();
            }
        }

        for position in self.positions.find_all().await? {
            let expected = claimed
                .get(&position.id)
                .copied()
                .unwrap_or(0)
                .min(position.amount);
            if position.freeze_amount == expected {
                continue;
            }
            let mut uow = self.uow_factory.begin().await?;
            let Some(mut current) = uow.get_position(position.id).await? else {
                uow.rollback().await?;
                continue;
            };
            warn!(
                "校正持仓冻结数量: position_id={}, stock_code={}, freeze_amount={} -> {}",
                current.id, current.stock_code, current.freeze_amount, expected
            );
            current.freeze_amount = expected.min(current.amount);
            current.updated_at = Utc::now();
            uow.save_position(&current).await?;
            uow.commit().await?;
            summary.positions_fixed += 1;
            touched.insert(current.contract_id);
        }

        for contract_id in touched {
            if let Err(e) = self.funds.recompute(contract_id).await {
                error!("日终重算可用资金失败: contract_id={}, error={}", contract_id, e);
            }
        }
        Ok(summary)
    }
}
