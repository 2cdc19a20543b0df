//! 仓储实现

pub mod broker_repository;
pub mod contract_repository;
pub mod entrust_repository;
pub mod in_memory_store;
pub mod ledger_repository;
pub mod position_repository;
pub mod unit_of_work;

pub use broker_repository::SqlxBrokerRepository;
pub use contract_repository::SqlxContractRepository;
pub use entrust_repository::SqlxEntrustRepository;
pub use in_memory_store::{InMemoryStore, InMemoryUnitOfWork};
pub use ledger_repository::SqlxLedgerRepository;
pub use position_repository::SqlxPositionRepository;
pub use unit_of_work::{SqlxUnitOfWork, SqlxUnitOfWorkFactory};
