//! 券商账户目录

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::enums::Exchange;

/// 券商账户目录中的一行
///
/// 连接会话（client_id、资金、持仓快照）不在此保存，由连接池维护。
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Broker {
    pub id: i64,
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub version: String,
    pub branch_no: String,
    pub fund_account: String,
    pub trade_account: String,
    pub trade_password: String,
    pub tx_password: String,
    /// 沪市股东代码
    pub sh_holder: String,
    /// 深市股东代码
    pub sz_holder: String,
    /// 优先级，数值大的优先分配
    pub priority: i32,
    pub enabled: bool,
}

impl Broker {
    /// 按交易所选择股东代码
    pub fn holder_for(&self, exchange: Exchange) -> &str {
        match exchange {
            Exchange::Sh => &self.sh_holder,
            Exchange::Sz => &self.sz_holder,
        }
    }
}

// 日志中不输出密码
impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("fund_account", &self.fund_account)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_masks_passwords() {
        let broker = Broker {
            id: 1,
            name: "A".to_string(),
            ip: "10.0.0.1".to_string(),
            port: 7708,
            version: "6.0".to_string(),
            branch_no: "1".to_string(),
            fund_account: "F1".to_string(),
            trade_account: "T1".to_string(),
            trade_password: "secret-trade".to_string(),
            tx_password: "secret-tx".to_string(),
            sh_holder: "A001".to_string(),
            sz_holder: "0001".to_string(),
            priority: 10,
            enabled: true,
        };
        let printed = format!("{:?}", broker);
        assert!(!printed.contains("secret"));
        assert_eq!(broker.holder_for(Exchange::Sh), "A001");
    }
}
