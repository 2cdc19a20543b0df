//! 风控策略

pub mod margin_policy;

pub use margin_policy::{classify_risk, MarginPolicy};
