//! 券商终端 HTTP 网关客户端
//!
//! 终端自动化桥以 GET + 查询参数的方式暴露四个接口，统一返回
//! `{"result": ..., "error": "..."}`，`error` 非空表示券商拒绝。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use rust_margin_core::config::GatewayConfig;
use rust_margin_domain::entities::Broker;
use rust_margin_domain::enums::Exchange;
use rust_margin_domain::traits::{GatewayError, GatewayOrder, QueryKind, TradeGateway};
use rust_margin_domain::value_objects::{ExternalOrderRecord, FundsSnapshot, HoldingRecord};

use super::table::{parse_funds, parse_holdings, parse_orders, GatewayTable};

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: String,
}

impl GatewayResponse {
    fn result_text(&self) -> String {
        match &self.result {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// 把请求参数拼成日志文本，密码字段脱敏
pub fn describe_request(action: &str, params: &[(&str, String)]) -> String {
    let query = params
        .iter()
        .map(|(k, v)| {
            if k.contains("password") {
                format!("{}=******", k)
            } else {
                format!("{}={}", k, v)
            }
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", action, query)
}

pub struct HttpTradeGateway {
    client: Client,
    base_url: String,
    login_timeout: Duration,
    submit_timeout: Duration,
    query_timeout: Duration,
    cancel_timeout: Duration,
}

impl HttpTradeGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| GatewayError::Transport(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            login_timeout: Duration::from_secs(config.login_timeout_secs),
            submit_timeout: Duration::from_secs(config.submit_timeout_secs),
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            cancel_timeout: Duration::from_secs(config.cancel_timeout_secs),
        })
    }

    async fn call(
        &self,
        action: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/{}", self.base_url, action);
        let result = self.send(&url, action, params, timeout).await;
        if let Err(e) = &result {
            warn!("网关调用失败: {} error={}", describe_request(action, params), e);
        }
        result
    }

    async fn send(
        &self,
        url: &str,
        action: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Result<String, GatewayError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_transport_error(action, e))?;

        let status_code = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_transport_error(action, e))?;
        debug!("gateway {} status={} body_len={}", action, status_code, body.len());

        if status_code != StatusCode::OK {
            return Err(GatewayError::Transport(format!(
                "{} 返回 HTTP {}: {}",
                action, status_code, body
            )));
        }
        let parsed: GatewayResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Parse(format!("{}: {}", action, e)))?;
        if !parsed.error.trim().is_empty() {
            return Err(GatewayError::Rejected(parsed.error));
        }
        Ok(parsed.result_text())
    }

    /// 通用查询，返回原始表格
    pub async fn query(&self, client_id: &str, kind: QueryKind) -> Result<GatewayTable, GatewayError> {
        let params = [
            ("client_id", client_id.to_string()),
            ("type", kind.code().to_string()),
        ];
        let raw = self.call("query", &params, self.query_timeout).await?;
        Ok(GatewayTable::parse(&raw))
    }
}

fn map_transport_error(action: &str, e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout {
            action: action.to_string(),
        }
    } else {
        GatewayError::Transport(e.to_string())
    }
}

fn non_empty(action: &str, value: String) -> Result<String, GatewayError> {
    if value.trim().is_empty() {
        Err(GatewayError::Parse(format!("{} 返回结果为空", action)))
    } else {
        Ok(value.trim().to_string())
    }
}

#[async_trait]
impl TradeGateway for HttpTradeGateway {
    async fn login(&self, broker: &Broker) -> Result<String, GatewayError> {
        let params = [
            ("ip", broker.ip.clone()),
            ("port", broker.port.to_string()),
            ("version", broker.version.clone()),
            ("branch_no", broker.branch_no.clone()),
            ("fund_account", broker.fund_account.clone()),
            ("trade_account", broker.trade_account.clone()),
            ("trade_password", broker.trade_password.clone()),
            ("tx_password", broker.tx_password.clone()),
        ];
        let client_id = self.call("login", &params, self.login_timeout).await?;
        non_empty("login", client_id)
    }

    async fn send_order(&self, client_id: &str, order: &GatewayOrder) -> Result<String, GatewayError> {
        let params = [
            ("client_id", client_id.to_string()),
            ("type", order.side.code().to_string()),
            (
                "price_type",
                order.price_type.gateway_code(order.exchange()).to_string(),
            ),
            ("gddm", order.holder.clone()),
            ("stock_code", order.stock_code.clone()),
            ("price", format!("{:.2}", order.price)),
            ("amount", order.amount.to_string()),
        ];
        let entrust_no = self.call("send_order", &params, self.submit_timeout).await?;
        non_empty("send_order", entrust_no)
    }

    async fn query_funds(&self, client_id: &str) -> Result<FundsSnapshot, GatewayError> {
        let table = self.query(client_id, QueryKind::Funds).await?;
        parse_funds(&table)
    }

    async fn query_holdings(&self, client_id: &str) -> Result<Vec<HoldingRecord>, GatewayError> {
        let table = self.query(client_id, QueryKind::Holdings).await?;
        parse_holdings(&table)
    }

    async fn query_today_orders(
        &self,
        client_id: &str,
    ) -> Result<Vec<ExternalOrderRecord>, GatewayError> {
        let table = self.query(client_id, QueryKind::TodayOrders).await?;
        parse_orders(&table)
    }

    async fn cancel_order(
        &self,
        client_id: &str,
        exchange: Exchange,
        entrust_no: &str,
    ) -> Result<(), GatewayError> {
        let params = [
            ("client_id", client_id.to_string()),
            ("exchange_id", exchange.code().to_string()),
            ("entrust_no", entrust_no.to_string()),
        ];
        self.call("cancel_order", &params, self.cancel_timeout).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_request_masks_passwords() {
        let params = [
            ("fund_account", "F1".to_string()),
            ("trade_password", "123456".to_string()),
            ("tx_password", "654321".to_string()),
        ];
        let text = describe_request("login", &params);
        assert!(text.starts_with("login?fund_account=F1"));
        assert!(!text.contains("123456"));
        assert!(!text.contains("654321"));
    }

    #[test]
    fn test_result_text_accepts_numbers() {
        let parsed: GatewayResponse = serde_json::from_str(r#"{"result": 1024, "error": ""}"#).unwrap();
        assert_eq!(parsed.result_text(), "1024");
        let parsed: GatewayResponse = serde_json::from_str(r#"{"error": "资金不足"}"#).unwrap();
        assert_eq!(parsed.result_text(), "");
        assert_eq!(parsed.error, "资金不足");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transport_error() {
        let config = GatewayConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            login_timeout_secs: 1,
            submit_timeout_secs: 1,
            query_timeout_secs: 1,
            cancel_timeout_secs: 1,
        };
        let gateway = HttpTradeGateway::new(&config).unwrap();
        let err = gateway.query_funds("c1").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Transport(_) | GatewayError::Timeout { .. }
        ));
    }
}
