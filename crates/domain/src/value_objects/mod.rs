//! 值对象

pub mod fee;
pub mod gateway_records;
pub mod lot;
pub mod quote;

pub use fee::{round2, FeeSchedule};
pub use gateway_records::{ExternalOrderRecord, FundsSnapshot, HoldingRecord};
pub use lot::{floor_to_lot, is_whole_lot, odd_lot, DEFAULT_LOT_SIZE};
pub use quote::Quote;
