//! 券商终端网关

pub mod http_gateway;
pub mod table;

pub use http_gateway::{describe_request, HttpTradeGateway};
pub use table::GatewayTable;
