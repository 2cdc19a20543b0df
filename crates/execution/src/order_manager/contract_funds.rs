//! 合约可用资金重算
//!
//! 可用资金 = 保证金 + 借入资金 - 持仓成本 - 未终结买单占用，下限为 0。

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use rust_margin_domain::traits::UnitOfWorkFactory;

pub struct ContractFundsService {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
}

impl ContractFundsService {
    pub fn new(uow_factory: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self { uow_factory }
    }

    /// 重算并保存合约的可用资金，合约不存在时返回 `None`
    ///
    /// 先锁合约行再读取持仓与在途委托，与下单占用资金串行。
    pub async fn recompute(&self, contract_id: i64) -> Result<Option<f64>> {
        let mut uow = self.uow_factory.begin().await?;
        let Some(mut contract) = uow.get_contract(contract_id).await? else {
            uow.rollback().await?;
            return Ok(None);
        };
        let position_cost: f64 = uow
            .find_positions(contract_id)
            .await?
            .iter()
            .map(|p| p.cost_basis())
            .sum();
        let pending_buy: f64 = uow
            .find_open_entrusts(contract_id)
            .await?
            .iter()
            .map(|e| e.pending_buy_exposure())
            .sum();

        contract.recompute_val_money(position_cost, pending_buy);
        uow.update_contract(&contract).await?;
        uow.commit().await?;

        debug!(
            "重算可用资金: contract_id={}, money={}, position_cost={}, pending_buy={}, val_money={}",
            contract_id, contract.money, position_cost, pending_buy, contract.val_money
        );
        Ok(Some(contract.val_money))
    }
}
