//! SQLx 数据库连接池管理
//!
//! 连接池由启动流程创建后显式传给各个仓储，不再放在全局变量里

use std::time::Duration;

use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::AppError;

/// 初始化数据库连接池
pub async fn init_db_pool(config: &DatabaseConfig) -> Result<Pool<MySql>, AppError> {
    let database_url = config
        .url
        .as_deref()
        .ok_or_else(|| AppError::ConfigError("DATABASE_URL must be set".to_string()))?;

    info!("正在初始化数据库连接池...");

    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        // 连接最大生命周期：1小时，减少频繁创建/销毁
        .max_lifetime(Duration::from_secs(3600))
        .connect(database_url)
        .await
        .map_err(|e| AppError::DatabaseError(format!("数据库连接失败: {}", e)))?;

    info!(
        "✓ 数据库连接池初始化成功, max_connections={}",
        config.max_connections
    );
    Ok(pool)
}

/// 关闭数据库连接池
pub async fn close_db_pool(pool: &Pool<MySql>) {
    info!("正在关闭数据库连接池...");
    pool.close().await;
    info!("✓ 数据库连接池已关闭");
}

/// 健康检查
pub async fn health_check(pool: &Pool<MySql>) -> Result<(), AppError> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("数据库健康检查失败: {}", e)))?;
    Ok(())
}
