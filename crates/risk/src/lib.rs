//! # Rust Margin Risk
//!
//! 合约风控：保证金风险分级、警戒通知、强制平仓

pub mod monitor;
pub mod policies;

pub use monitor::{ContractRiskMonitor, LiquidationPort, RiskAction, RiskError};
pub use policies::{classify_risk, MarginPolicy};
