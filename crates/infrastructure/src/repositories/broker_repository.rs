//! 券商账户目录仓储实现
//!
//! 对应数据库表 `broker`

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::{FromRow, MySql, Pool};

use rust_margin_domain::entities::Broker;
use rust_margin_domain::traits::BrokerRepository;

#[derive(Debug, Clone, FromRow)]
pub struct BrokerEntity {
    pub id: i64,
    pub name: String,
    pub ip: String,
    pub port: i32,
    pub version: String,
    pub branch_no: String,
    pub fund_account: String,
    pub trade_account: String,
    pub trade_password: String,
    pub tx_password: String,
    pub sh_holder: String,
    pub sz_holder: String,
    pub priority: i32,
    pub enabled: bool,
}

impl BrokerEntity {
    pub fn to_domain(&self) -> Result<Broker> {
        let port = u16::try_from(self.port)
            .map_err(|_| anyhow!("券商 {} 端口无效: {}", self.id, self.port))?;
        Ok(Broker {
            id: self.id,
            name: self.name.clone(),
            ip: self.ip.clone(),
            port,
            version: self.version.clone(),
            branch_no: self.branch_no.clone(),
            fund_account: self.fund_account.clone(),
            trade_account: self.trade_account.clone(),
            trade_password: self.trade_password.clone(),
            tx_password: self.tx_password.clone(),
            sh_holder: self.sh_holder.clone(),
            sz_holder: self.sz_holder.clone(),
            priority: self.priority,
            enabled: self.enabled,
        })
    }
}

pub struct SqlxBrokerRepository {
    pool: Pool<MySql>,
}

impl SqlxBrokerRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BrokerRepository for SqlxBrokerRepository {
    async fn find_enabled(&self) -> Result<Vec<Broker>> {
        let entities = sqlx::query_as::<_, BrokerEntity>(
            r#"SELECT id, name, ip, port, version, branch_no, fund_account, trade_account,
                      trade_password, tx_password, sh_holder, sz_holder, priority, enabled
               FROM broker WHERE enabled = 1 ORDER BY priority DESC, id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        entities.iter().map(|e| e.to_domain()).collect()
    }
}
