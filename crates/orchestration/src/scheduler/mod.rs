// 调度器模块
pub mod task_scheduler;

pub use task_scheduler::*;
