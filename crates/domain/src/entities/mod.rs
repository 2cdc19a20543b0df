//! 业务实体

pub mod broker;
pub mod contract;
pub mod entrust;
pub mod ledger;
pub mod position;

pub use broker::Broker;
pub use contract::Contract;
pub use entrust::{BrokerEntrust, Entrust, EntrustError, EntrustOutcome, NewEntrust};
pub use ledger::{FeeRecord, GatewayErrorLog, Notification};
pub use position::{Position, PositionError, SellResult};
