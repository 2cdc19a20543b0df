//! # Rust Margin Orchestration
//!
//! 任务编排：定时调度、交易日历检查、后台任务装配

pub mod infra;
pub mod jobs;
pub mod scheduler;

pub use jobs::EngineJobs;
pub use scheduler::TaskScheduler;
