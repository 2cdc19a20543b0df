//! 撮合结算引擎的后台任务
//!
//! | 任务 | 时段 | 条件 |
//! |---|---|---|
//! | broker_reconnect | 任意 | 券商通道开启 |
//! | order_reconcile | 任意 | 券商通道开启 |
//! | auto_match | 交易时段 | 模拟盘 |
//! | contract_risk | 交易时段 | |
//! | daily_interest | 交易日 | |
//! | eod_unfreeze | 交易日 | |

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use rust_margin_core::config::ScheduleConfig;
use rust_margin_execution::{
    AutoMatcher, BrokerPool, EodUnfreezeJob, InterestJob, ReconciliationLoop,
};
use rust_margin_risk::ContractRiskMonitor;

use crate::infra::{should_run, JobWindow};
use crate::scheduler::TaskScheduler;

/// 后台任务依赖的服务
pub struct EngineJobs {
    pub routing_enabled: bool,
    pub pool: Arc<BrokerPool>,
    pub reconciler: Arc<ReconciliationLoop>,
    pub matcher: Arc<AutoMatcher>,
    pub risk: Arc<ContractRiskMonitor>,
    pub interest: Arc<InterestJob>,
    pub eod: Arc<EodUnfreezeJob>,
}

impl EngineJobs {
    pub async fn reconnect_brokers(&self) {
        match self.pool.reconnect().await {
            Ok(summary) if summary.connected > 0 || summary.failed > 0 => info!(
                "券商重连: connected={}, failed={}, already_connected={}",
                summary.connected, summary.failed, summary.already_connected
            ),
            Ok(_) => {}
            Err(e) => error!("券商重连失败: {}", e),
        }
    }

    pub async fn reconcile_orders(&self) {
        match self.reconciler.run_once().await {
            Ok(summary) if summary.settled > 0 || summary.evicted > 0 => info!(
                "对账完成: polled={}, settled={}, waiting={}, evicted={}",
                summary.polled, summary.settled, summary.waiting, summary.evicted
            ),
            Ok(summary) => debug!("对账: {:?}", summary),
            Err(e) => error!("对账失败: {}", e),
        }
    }

    pub async fn match_local_orders(&self) {
        if !should_run(JobWindow::TradingTime, Utc::now()) {
            return;
        }
        match self.matcher.run_once().await {
            Ok(summary) if summary.filled > 0 => {
                info!("内部撮合: checked={}, filled={}", summary.checked, summary.filled)
            }
            Ok(_) => {}
            Err(e) => error!("内部撮合失败: {}", e),
        }
    }

    pub async fn check_contract_risk(&self) {
        let now = Utc::now();
        if !should_run(JobWindow::TradingTime, now) {
            return;
        }
        match self.risk.run_once(now).await {
            Ok(summary) if summary.liquidated > 0 || summary.warned > 0 => warn!(
                "风控巡检: checked={}, warned={}, liquidated={}, errors={}",
                summary.checked, summary.warned, summary.liquidated, summary.errors
            ),
            Ok(_) => {}
            Err(e) => error!("风控巡检失败: {}", e),
        }
    }

    pub async fn collect_interest(&self) {
        let now = Utc::now();
        if !should_run(JobWindow::TradingDay, now) {
            return;
        }
        if let Err(e) = self.interest.run_once(now).await {
            error!("利息收取失败: {}", e);
        }
    }

    pub async fn unfreeze_end_of_day(&self) {
        let now = Utc::now();
        if !should_run(JobWindow::TradingDay, now) {
            return;
        }
        if let Err(e) = self.eod.run_once(now).await {
            error!("日终解冻失败: {}", e);
        }
    }

    /// 按运行模式注册全部后台任务
    pub fn register(self: Arc<Self>, scheduler: &mut TaskScheduler, schedule: &ScheduleConfig) -> Result<()> {
        if self.routing_enabled {
            add_job(scheduler, "broker_reconnect", schedule.reconnect_interval_ms, &self, |jobs| async move {
                jobs.reconnect_brokers().await
            })?;
            add_job(scheduler, "order_reconcile", schedule.reconcile_interval_ms, &self, |jobs| async move {
                jobs.reconcile_orders().await
            })?;
        } else {
            add_job(scheduler, "auto_match", schedule.auto_match_interval_ms, &self, |jobs| async move {
                jobs.match_local_orders().await
            })?;
        }
        add_job(scheduler, "contract_risk", schedule.risk_interval_ms, &self, |jobs| async move {
            jobs.check_contract_risk().await
        })?;
        add_job(scheduler, "daily_interest", schedule.interest_interval_ms, &self, |jobs| async move {
            jobs.collect_interest().await
        })?;
        add_job(scheduler, "eod_unfreeze", schedule.eod_interval_ms, &self, |jobs| async move {
            jobs.unfreeze_end_of_day().await
        })?;
        Ok(())
    }
}

fn add_job<F, Fut>(
    scheduler: &mut TaskScheduler,
    name: &str,
    every_n_millis: u64,
    jobs: &Arc<EngineJobs>,
    run: F,
) -> Result<()>
where
    F: Fn(Arc<EngineJobs>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let jobs = jobs.clone();
    scheduler.add_periodic_task(name, every_n_millis, move || run(jobs.clone()))
}
