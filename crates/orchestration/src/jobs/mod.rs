//! 后台任务

pub mod engine_jobs;

pub use engine_jobs::EngineJobs;
