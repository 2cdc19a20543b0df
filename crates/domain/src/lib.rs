//! # Rust Margin Domain
//!
//! 领域模型层 - 纯粹的业务逻辑，不依赖任何基础设施
//!
//! ## 架构原则
//!
//! 1. **领域纯粹性**: 不依赖 sqlx、redis、reqwest 等外部框架
//! 2. **业务规则集中**: 委托状态机、持仓均价、费用计算都在这里
//! 3. **端口在内**: 仓储、事务、券商网关、缓存、行情都以 trait 形式定义，由基础设施层实现
//!
//! ## 模块组织
//!
//! - `entities`: 合约、委托、券商子委托、券商账户、持仓、资金流水、通知
//! - `value_objects`: 手数取整、费率表、行情快照、网关查询记录
//! - `enums`: 委托方向、价格类型、委托状态、风险等级等
//! - `traits`: 仓储 / 工作单元 / 网关 / 缓存 / 行情端口
//!
//! ## 使用示例
//!
//! ```rust
//! use rust_margin_domain::entities::Position;
//!
//! let mut position = Position::open(1, 7, "600000", 1000, 10.0);
//! position.apply_buy(1000, 12.0).unwrap();
//! assert_eq!(position.amount, 2000);
//! assert!((position.price - 11.0).abs() < 1e-9);
//! ```

pub mod entities;
pub mod enums;
pub mod traits;
pub mod value_objects;

pub use entities::*;
pub use enums::*;
pub use value_objects::*;
