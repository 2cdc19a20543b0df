//! # Rust Margin Infrastructure
//!
//! 基础设施层 - 实现领域层定义的接口
//!
//! ## 职责
//!
//! 1. **数据访问**: sqlx MySQL 仓储与事务工作单元；内存存储用于测试和模拟盘
//! 2. **缓存与锁**: Redis `SET NX EX` 幂等锁与每日标记
//! 3. **外部服务**: 券商终端 HTTP 网关、行情快照读取
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use rust_margin_infrastructure::repositories::SqlxEntrustRepository;
//! use rust_margin_domain::traits::EntrustRepository;
//!
//! let repo = SqlxEntrustRepository::new(db_pool);
//! let open = repo.find_open_broker_entrusts().await?;
//! ```

pub mod cache;
pub mod gateway;
pub mod quote;
pub mod repositories;

pub use cache::{InMemoryCacheStore, RedisCacheStore};
pub use gateway::HttpTradeGateway;
pub use quote::{CachedQuoteProvider, StaticQuoteProvider};
pub use repositories::InMemoryStore;
