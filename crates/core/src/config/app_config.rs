//! 应用配置
//!
//! 启动时从环境变量一次性构建，之后以引用方式传入各个服务，
//! 不使用全局单例。

use chrono::NaiveTime;

use super::environment::{env_f64, env_is_true, env_or_default, env_u64};
use crate::error::AppError;

/// 数据库配置
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// 连接串，未配置时只能以模拟盘（内存存储）方式运行
    pub url: Option<String>,
    pub max_connections: u32,
}

/// Redis 配置
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// 券商终端网关配置
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    /// 登录超时（秒）
    pub login_timeout_secs: u64,
    /// 下单超时（秒）
    pub submit_timeout_secs: u64,
    /// 查询超时（秒）
    pub query_timeout_secs: u64,
    /// 撤单超时（秒）
    pub cancel_timeout_secs: u64,
}

/// 交易参数
#[derive(Debug, Clone)]
pub struct TradingConfig {
    /// 是否将委托路由到真实券商账户
    pub broker_routing_enabled: bool,
    /// 每手股数
    pub lot_size: i64,
    /// 佣金费率
    pub commission_rate: f64,
    /// 最低佣金（元）
    pub min_commission: f64,
    /// 印花税率（仅卖出）
    pub stamp_tax_rate: f64,
    /// 过户费率
    pub transfer_fee_rate: f64,
    /// 成交价合法下限，低于此值的回报视为无效数据
    pub price_floor: f64,
    /// 涨跌停幅度
    pub price_limit_pct: f64,
    /// 券商连续失败多少次后移出连接池
    pub max_broker_failures: u32,
    /// 结算幂等锁 TTL（秒）
    pub settle_lock_ttl_secs: u64,
}

/// 风控参数
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// 警戒线比例
    pub warn_pct: f64,
    /// 平仓线比例
    pub close_pct: f64,
    /// 强平标记有效期（小时）
    pub close_flag_ttl_hours: u64,
}

/// 利息参数
#[derive(Debug, Clone)]
pub struct InterestConfig {
    /// 借入资金日利率
    pub daily_rate: f64,
    /// 收息时间窗口开始
    pub window_start: NaiveTime,
    /// 收息时间窗口结束
    pub window_end: NaiveTime,
}

/// 后台任务调度间隔
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub reconnect_interval_ms: u64,
    pub reconcile_interval_ms: u64,
    pub risk_interval_ms: u64,
    pub auto_match_interval_ms: u64,
    pub interest_interval_ms: u64,
    pub eod_interval_ms: u64,
    /// 日终解冻时间（收盘后）
    pub eod_unfreeze_time: NaiveTime,
}

/// 应用配置聚合
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_env: String,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub gateway: GatewayConfig,
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub interest: InterestConfig,
    pub schedule: ScheduleConfig,
}

fn env_time(key: &str, default: &str) -> Result<NaiveTime, AppError> {
    let raw = env_or_default(key, default);
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| AppError::ConfigError(format!("{} 时间格式错误 '{}': {}", key, raw, e)))
}

impl AppConfig {
    /// 从环境变量构建配置
    pub fn from_env() -> Result<Self, AppError> {
        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            max_connections: env_u64("DB_MAX_CONNECTIONS", 50) as u32,
        };
        let redis = RedisConfig {
            url: env_or_default("REDIS_HOST", "redis://127.0.0.1:6379/"),
        };
        let gateway = GatewayConfig {
            base_url: env_or_default("GATEWAY_BASE_URL", "http://127.0.0.1:19820"),
            login_timeout_secs: env_u64("GATEWAY_LOGIN_TIMEOUT_SECS", 60),
            submit_timeout_secs: env_u64("GATEWAY_SUBMIT_TIMEOUT_SECS", 30),
            query_timeout_secs: env_u64("GATEWAY_QUERY_TIMEOUT_SECS", 10),
            cancel_timeout_secs: env_u64("GATEWAY_CANCEL_TIMEOUT_SECS", 10),
        };
        let trading = TradingConfig {
            broker_routing_enabled: env_is_true("BROKER_ROUTING_ENABLED", false),
            lot_size: env_u64("LOT_SIZE", 100) as i64,
            commission_rate: env_f64("COMMISSION_RATE", 0.0003),
            min_commission: env_f64("MIN_COMMISSION", 5.0),
            stamp_tax_rate: env_f64("STAMP_TAX_RATE", 0.001),
            transfer_fee_rate: env_f64("TRANSFER_FEE_RATE", 0.00002),
            price_floor: env_f64("PRICE_FLOOR", 0.01),
            price_limit_pct: env_f64("PRICE_LIMIT_PCT", 0.10),
            max_broker_failures: env_u64("MAX_BROKER_FAILURES", 3) as u32,
            settle_lock_ttl_secs: env_u64("SETTLE_LOCK_TTL_SECS", 60),
        };
        let risk = RiskConfig {
            warn_pct: env_f64("RISK_WARN_PCT", 0.5),
            close_pct: env_f64("RISK_CLOSE_PCT", 0.3),
            close_flag_ttl_hours: env_u64("RISK_CLOSE_FLAG_TTL_HOURS", 6),
        };
        let interest = InterestConfig {
            daily_rate: env_f64("INTEREST_DAILY_RATE", 0.0005),
            window_start: env_time("INTEREST_WINDOW_START", "09:00")?,
            window_end: env_time("INTEREST_WINDOW_END", "09:25")?,
        };
        let schedule = ScheduleConfig {
            reconnect_interval_ms: env_u64("RECONNECT_INTERVAL_MS", 120_000),
            reconcile_interval_ms: env_u64("RECONCILE_INTERVAL_MS", 1_000),
            risk_interval_ms: env_u64("RISK_INTERVAL_MS", 5_000),
            auto_match_interval_ms: env_u64("AUTO_MATCH_INTERVAL_MS", 2_000),
            interest_interval_ms: env_u64("INTEREST_INTERVAL_MS", 60_000),
            eod_interval_ms: env_u64("EOD_INTERVAL_MS", 60_000),
            eod_unfreeze_time: env_time("EOD_UNFREEZE_TIME", "15:30")?,
        };

        let config = Self {
            app_env: env_or_default("APP_ENV", "local"),
            database,
            redis,
            gateway,
            trading,
            risk,
            interest,
            schedule,
        };
        config.validate()?;
        Ok(config)
    }

    /// 校验配置的一致性
    pub fn validate(&self) -> Result<(), AppError> {
        if self.trading.lot_size <= 0 {
            return Err(AppError::ConfigError("LOT_SIZE 必须大于 0".to_string()));
        }
        if !(0.0..1.0).contains(&self.risk.close_pct) || !(0.0..=1.0).contains(&self.risk.warn_pct) {
            return Err(AppError::ConfigError(format!(
                "风控比例越界: warn_pct={}, close_pct={}",
                self.risk.warn_pct, self.risk.close_pct
            )));
        }
        if self.risk.warn_pct < self.risk.close_pct {
            return Err(AppError::ConfigError(format!(
                "警戒线不能低于平仓线: warn_pct={}, close_pct={}",
                self.risk.warn_pct, self.risk.close_pct
            )));
        }
        if self.trading.max_broker_failures == 0 {
            return Err(AppError::ConfigError(
                "MAX_BROKER_FAILURES 必须大于 0".to_string(),
            ));
        }
        if self.interest.window_start >= self.interest.window_end {
            return Err(AppError::ConfigError("收息时间窗口无效".to_string()));
        }
        let min_interval = [
            self.schedule.reconnect_interval_ms,
            self.schedule.reconcile_interval_ms,
            self.schedule.risk_interval_ms,
            self.schedule.auto_match_interval_ms,
            self.schedule.interest_interval_ms,
            self.schedule.eod_interval_ms,
        ]
        .into_iter()
        .min()
        .unwrap_or(0);
        if min_interval < 100 {
            return Err(AppError::ConfigError(
                "任务调度间隔不能小于 100 毫秒".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_local(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("local")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.trading.lot_size, 100);
        assert_eq!(config.trading.max_broker_failures, 3);
        assert!(config.risk.warn_pct >= config.risk.close_pct);
    }

    #[test]
    fn test_validate_rejects_inverted_risk_lines() {
        let mut config = AppConfig::from_env().unwrap();
        config.risk.warn_pct = 0.2;
        config.risk.close_pct = 0.4;
        assert!(config.validate().is_err());
    }
}
