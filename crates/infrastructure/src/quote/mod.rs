//! 行情读取

pub mod quote_provider;

pub use quote_provider::{quote_key, CachedQuoteProvider, StaticQuoteProvider};
