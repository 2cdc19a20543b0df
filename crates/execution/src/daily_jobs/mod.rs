//! 日常资金任务：利息收取、日终解冻

pub mod eod_unfreeze_job;
pub mod interest_job;

pub use eod_unfreeze_job::{eod_flag_key, EodSummary, EodUnfreezeJob};
pub use interest_job::{interest_flag_key, InterestJob, InterestSummary};
