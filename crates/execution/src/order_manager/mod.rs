//! 委托管理

pub mod contract_funds;
pub mod order_service;

pub use contract_funds::ContractFundsService;
pub use order_service::{
    fee_schedule, OrderError, OrderService, OrderSettings, PlaceOrderRequest, PlacedOrder,
    WithdrawResult,
};
