//! 业务枚举

pub mod contract_enums;
pub mod entrust_enums;
pub mod ledger_enums;

pub use contract_enums::*;
pub use entrust_enums::*;
pub use ledger_enums::*;
