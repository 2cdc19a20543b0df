//! 执行引擎：对账、结算、内部撮合

pub mod auto_matcher;
pub mod idempotency_guard;
pub mod reconciliation_loop;
pub mod settlement_engine;

pub use auto_matcher::{AutoMatcher, MatchSummary};
pub use idempotency_guard::{settle_lock_key, IdempotencyGuard};
pub use reconciliation_loop::{ReconcileSummary, ReconciliationLoop};
pub use settlement_engine::{SettlementEngine, SettlementError, SettlementReport};
