//! 缓存与分布式锁存储

pub mod cache_store;

pub use cache_store::{InMemoryCacheStore, RedisCacheStore};
