//! # Rust Margin CLI
//!
//! 撮合结算引擎主程序入口

pub mod app;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use rust_margin_core::cache::RedisConnectionPool;
use rust_margin_core::config::{AppConfig, ShutdownConfig, ShutdownManager};
use rust_margin_core::database::{close_db_pool, init_db_pool};
use rust_margin_core::logger::{setup_logging, LogConfig};
use rust_margin_infrastructure::{HttpTradeGateway, InMemoryStore, RedisCacheStore, StaticQuoteProvider};
use rust_margin_orchestration::TaskScheduler;

pub use app::bootstrap::{build_engine, Engine, StoragePorts};

const REDIS_KEY_PREFIX: &str = "margin";

/// 命令行参数
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "rust-margin", about = "杠杆证券委托撮合与结算引擎")]
pub struct Cli {
    /// 环境变量文件，默认读取当前目录的 .env
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// 模拟盘：内存存储，所有委托走内部撮合
    #[arg(long)]
    pub paper: bool,

    /// 不启动后台任务
    #[arg(long)]
    pub no_jobs: bool,
}

/// 应用初始化：加载环境变量、设置日志、构建配置
pub fn app_init(cli: &Cli) -> Result<AppConfig> {
    match &cli.env_file {
        Some(path) => {
            dotenv::from_path(path)
                .map_err(|e| anyhow::anyhow!("加载环境变量文件失败 {}: {}", path.display(), e))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    setup_logging(&LogConfig::from_env())?;

    let mut config = AppConfig::from_env()?;
    if cli.paper && config.trading.broker_routing_enabled {
        info!("模拟盘模式，关闭券商通道");
        config.trading.broker_routing_enabled = false;
    }
    info!(
        "应用初始化完成: env={}, broker_routing={}, paper={}",
        config.app_env, config.trading.broker_routing_enabled, cli.paper
    );
    Ok(config)
}

/// 运行主程序
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = app_init(&cli)?;

    let database_url = if cli.paper { None } else { config.database.url.clone() };
    let (ports, db_pool) = match database_url {
        Some(_) => {
            let pool = init_db_pool(&config.database).await?;
            let redis = RedisConnectionPool::new(&config.redis).await?;
            let cache = Arc::new(RedisCacheStore::new(redis, REDIS_KEY_PREFIX));
            (StoragePorts::sqlx(pool.clone(), cache), Some(pool))
        }
        None => {
            if !cli.paper {
                warn!("未配置 DATABASE_URL，使用内存存储并以模拟盘运行");
            }
            config.trading.broker_routing_enabled = false;
            let ports = StoragePorts::in_memory(InMemoryStore::new(), StaticQuoteProvider::new());
            (ports, None)
        }
    };

    let gateway = Arc::new(HttpTradeGateway::new(&config.gateway)?);
    let engine = build_engine(&ports, gateway, &config);

    let scheduler_slot: Arc<Mutex<Option<TaskScheduler>>> = Arc::new(Mutex::new(None));
    if cli.no_jobs {
        info!("已禁用后台任务");
    } else {
        let mut scheduler = TaskScheduler::new();
        engine.jobs.clone().register(&mut scheduler, &config.schedule)?;
        info!("后台任务已启动: {:?}", scheduler.task_names());
        *scheduler_slot.lock().await = Some(scheduler);
    }

    let manager = ShutdownManager::new(ShutdownConfig::default());
    // 回调按注册顺序执行，调度器先于数据库关闭
    manager
        .register_shutdown_hook("scheduler_shutdown", move || {
            let slot = scheduler_slot.clone();
            async move {
                if let Some(scheduler) = slot.lock().await.take() {
                    scheduler.shutdown().await;
                }
                Ok(())
            }
        })
        .await;
    if let Some(pool) = db_pool {
        manager
            .register_shutdown_hook("db_cleanup", move || {
                let pool = pool.clone();
                async move {
                    close_db_pool(&pool).await;
                    Ok(())
                }
            })
            .await;
    }

    let signal = ShutdownManager::wait_for_shutdown_signal().await?;
    info!("收到关闭信号: {}", signal);
    if let Err(e) = manager.shutdown().await {
        error!("优雅关闭未完成: {}", e);
    }
    Ok(())
}
