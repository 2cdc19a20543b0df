//! 时间检查器 - 按交易日历决定后台任务是否执行

use chrono::{DateTime, Utc};

use rust_margin_core::time::{is_trading_day, is_trading_time};

/// 任务允许执行的时段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobWindow {
    /// 不受交易日历限制
    Always,
    /// 仅交易日（周一至周五）
    TradingDay,
    /// 仅交易日的连续竞价时段
    TradingTime,
}

impl JobWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobWindow::Always => "always",
            JobWindow::TradingDay => "trading_day",
            JobWindow::TradingTime => "trading_time",
        }
    }
}

/// 检查当前时间是否允许执行
pub fn should_run(window: JobWindow, now: DateTime<Utc>) -> bool {
    match window {
        JobWindow::Always => true,
        JobWindow::TradingDay => is_trading_day(now),
        JobWindow::TradingTime => is_trading_time(now),
    }
}
