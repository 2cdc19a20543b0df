//! 券商终端查询结果解析
//!
//! 终端返回的 `result` 是一张文本表：行以换行分隔，列以制表符分隔
//! （个别终端版本使用竖线），首行为中文表头。不同券商的表头措辞略有差异，
//! 因此按别名列表查找列。

use rust_margin_domain::traits::GatewayError;
use rust_margin_domain::value_objects::{ExternalOrderRecord, FundsSnapshot, HoldingRecord};

const AVAILABLE_FUNDS: &[&str] = &["可用资金", "可用金额", "资金可用金"];
const TOTAL_ASSETS: &[&str] = &["总资产", "资产总值"];
const STOCK_CODE: &[&str] = &["证券代码", "股票代码"];
const HOLDING_AMOUNT: &[&str] = &["股份余额", "证券数量", "当前持仓", "库存数量"];
const SELLABLE_AMOUNT: &[&str] = &["可卖数量", "可用股份", "可用数量"];
const FROZEN_AMOUNT: &[&str] = &["冻结数量"];
const ENTRUST_NO: &[&str] = &["委托编号", "合同编号"];
const ENTRUST_STATUS: &[&str] = &["委托状态", "状态说明"];
const DEAL_AMOUNT: &[&str] = &["成交数量"];
const DEAL_PRICE: &[&str] = &["成交价格", "成交均价"];

/// 解析后的文本表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl GatewayTable {
    pub fn parse(raw: &str) -> Self {
        let mut lines = raw
            .split('\n')
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty());
        let Some(header_line) = lines.next() else {
            return Self::default();
        };
        let delimiter = if header_line.contains('\t') { '\t' } else { '|' };
        let split = |line: &str| -> Vec<String> {
            line.split(delimiter).map(|c| c.trim().to_string()).collect()
        };
        let headers = split(header_line);
        let rows = lines.map(split).collect();
        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 按别名查找列号
    pub fn column(&self, aliases: &[&str]) -> Option<usize> {
        aliases
            .iter()
            .find_map(|alias| self.headers.iter().position(|h| h == alias))
    }

    fn require_column(&self, aliases: &[&str]) -> Result<usize, GatewayError> {
        self.column(aliases)
            .ok_or_else(|| GatewayError::Parse(format!("缺少列: {}", aliases.join("/"))))
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(col)).map(|s| s.as_str())
    }
}

fn parse_f64(raw: Option<&str>) -> f64 {
    raw.map(|s| s.replace(',', ""))
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn parse_i64(raw: Option<&str>) -> i64 {
    parse_f64(raw).round() as i64
}

/// 资金查询（type=0），取首行
pub fn parse_funds(table: &GatewayTable) -> Result<FundsSnapshot, GatewayError> {
    if table.is_empty() {
        return Err(GatewayError::Parse("资金查询结果为空".to_string()));
    }
    let available = table.require_column(AVAILABLE_FUNDS)?;
    let total = table.column(TOTAL_ASSETS);
    Ok(FundsSnapshot {
        available: parse_f64(table.cell(0, available)),
        total_assets: total.map(|c| parse_f64(table.cell(0, c))).unwrap_or(0.0),
    })
}

/// 持仓查询（type=1）
///
/// 有冻结数量列时直接使用，否则用 股份余额 - 可卖数量 推算。
pub fn parse_holdings(table: &GatewayTable) -> Result<Vec<HoldingRecord>, GatewayError> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    let code = table.require_column(STOCK_CODE)?;
    let amount = table.require_column(HOLDING_AMOUNT)?;
    let frozen = table.column(FROZEN_AMOUNT);
    let sellable = table.column(SELLABLE_AMOUNT);
    if frozen.is_none() && sellable.is_none() {
        return Err(GatewayError::Parse("持仓缺少可卖/冻结数量列".to_string()));
    }

    let mut holdings = Vec::with_capacity(table.rows.len());
    for row in 0..table.rows.len() {
        let stock_code = table.cell(row, code).unwrap_or_default().to_string();
        if stock_code.is_empty() {
            continue;
        }
        let amount = parse_i64(table.cell(row, amount));
        let frozen = match (frozen, sellable) {
            (Some(col), _) => parse_i64(table.cell(row, col)),
            (None, Some(col)) => (amount - parse_i64(table.cell(row, col))).max(0),
            (None, None) => 0,
        };
        holdings.push(HoldingRecord {
            stock_code,
            amount,
            frozen: frozen.min(amount),
        });
    }
    Ok(holdings)
}

/// 当日委托查询（type=2）
pub fn parse_orders(table: &GatewayTable) -> Result<Vec<ExternalOrderRecord>, GatewayError> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    let no = table.require_column(ENTRUST_NO)?;
    let status = table.require_column(ENTRUST_STATUS)?;
    let code = table.column(STOCK_CODE);
    let deal_amount = table.column(DEAL_AMOUNT);
    let deal_price = table.column(DEAL_PRICE);

    let mut records = Vec::with_capacity(table.rows.len());
    for row in 0..table.rows.len() {
        let entrust_no = table.cell(row, no).unwrap_or_default().to_string();
        if entrust_no.is_empty() {
            continue;
        }
        records.push(ExternalOrderRecord {
            entrust_no,
            stock_code: code
                .and_then(|c| table.cell(row, c))
                .unwrap_or_default()
                .to_string(),
            raw_status: table.cell(row, status).unwrap_or_default().to_string(),
            deal_amount: deal_amount.map(|c| parse_i64(table.cell(row, c))).unwrap_or(0),
            deal_price: deal_price.map(|c| parse_f64(table.cell(row, c))).unwrap_or(0.0),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_margin_domain::enums::BrokerEntrustStatus;

    #[test]
    fn test_parse_funds() {
        let raw = "资金余额\t可用资金\t总资产\r\n100000.00\t98,500.50\t150000.00\r\n";
        let funds = parse_funds(&GatewayTable::parse(raw)).unwrap();
        assert_eq!(funds.available, 98_500.5);
        assert_eq!(funds.total_assets, 150_000.0);
    }

    #[test]
    fn test_parse_holdings_derives_frozen_from_sellable() {
        let raw = "证券代码\t证券名称\t股份余额\t可卖数量\n600000\t浦发银行\t1000\t600\n000001\t平安银行\t250\t250\n";
        let holdings = parse_holdings(&GatewayTable::parse(raw)).unwrap();
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].frozen, 400);
        assert_eq!(holdings[0].sellable(), 600);
        assert_eq!(holdings[1].sellable(), 250);
    }

    #[test]
    fn test_parse_orders_with_pipe_delimiter() {
        let raw = "委托编号|证券代码|状态说明|成交数量|成交价格\nA1|600000|已成|500|10.02\nA2|600000|部成|100|10.01";
        let records = parse_orders(&GatewayTable::parse(raw)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status(), Some(BrokerEntrustStatus::Filled));
        assert_eq!(records[0].deal_amount, 500);
        assert_eq!(records[1].status(), Some(BrokerEntrustStatus::PartFilled));
    }

    #[test]
    fn test_missing_columns_is_parse_error() {
        let raw = "证券名称\t备注\nfoo\tbar";
        assert!(matches!(
            parse_orders(&GatewayTable::parse(raw)),
            Err(GatewayError::Parse(_))
        ));
        assert!(parse_orders(&GatewayTable::parse("")).unwrap().is_empty());
    }
}
