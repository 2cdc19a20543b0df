use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::{debug, error, info};

use crate::config::RedisConfig;
use crate::error::AppError;

/// Redis连接池管理器
///
/// 多路复用连接本身可以克隆共享，这里只负责持有客户端并按需创建连接
#[derive(Clone)]
pub struct RedisConnectionPool {
    client: Client,
}

impl RedisConnectionPool {
    /// 创建新的连接池，并做一次连通性测试
    pub async fn new(config: &RedisConfig) -> Result<Self, AppError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| AppError::CacheError(format!("Failed to create Redis client: {}", e)))?;

        let _test_conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!("Redis connection test failed: {}", config.url);
                AppError::CacheError(format!("Failed to test Redis connection: {}", e))
            })?;

        info!("Redis connection pool initialized successfully ！");
        Ok(Self { client })
    }

    /// 获取连接
    pub async fn get_connection(&self) -> Result<MultiplexedConnection, AppError> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::CacheError(format!("Failed to get multiplexed connection: {}", e)))?;
        debug!("获取Redis连接成功");
        Ok(conn)
    }
}
