//! 合约风控巡检

pub mod contract_risk_monitor;
pub mod liquidation;

pub use contract_risk_monitor::{
    ContractRiskMonitor, RiskAction, RiskError, RiskEvaluation, RiskRunSummary,
};
pub use liquidation::{keys, LiquidationPort};
