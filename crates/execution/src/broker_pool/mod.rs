//! 券商连接池与分单

pub mod allocator;
pub mod broker_pool;

pub use allocator::{Allocation, AllocationError, Allocator};
pub use broker_pool::{BrokerPool, BrokerSession, BrokerSnapshot, ReconnectSummary};
