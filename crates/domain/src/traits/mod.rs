//! 领域接口

pub mod cache_trait;
pub mod gateway_trait;
pub mod quote_trait;
pub mod repository_trait;
pub mod unit_of_work;

pub use cache_trait::CacheStore;
pub use gateway_trait::{GatewayError, GatewayOrder, QueryKind, TradeGateway};
pub use quote_trait::QuoteProvider;
pub use repository_trait::{
    BrokerRepository, ContractRepository, EntrustRepository, LedgerRepository, PositionRepository,
};
pub use unit_of_work::{UnitOfWork, UnitOfWorkFactory};
