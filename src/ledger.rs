use crate::api::*;
use crate::error::{OracleError, Result};
use crate::registry::ContractRegistry;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use tokio::sync::broadcast;

/// The authoritative contract store as seen by the bridge.
#[async_trait]
pub trait Ledger {
    fn mode(&self) -> LedgerMode;
    async fn create_contract(
        &self,
        creator: Identity,
        contract_type: String,
        threshold: i64,
    ) -> Result<Contract>;
    async fn submit_prediction(
        &self,
        contract: ContractId,
        prediction_type: String,
        value: i64,
        confidence: u8,
        submitter: Identity,
    ) -> Result<Submission>;
    async fn get_contract(&self, contract: ContractId) -> Result<Option<Contract>>;
    async fn list_contracts(&self) -> Result<Vec<Contract>>;
    /// Fails with [`OracleError::ContractNotFound`] for an unknown contract.
    async fn list_predictions(&self, contract: ContractId) -> Result<Vec<Prediction>>;
    async fn get_latest_prediction(&self, contract: ContractId) -> Result<Option<Prediction>>;
    /// Feed of ledger notifications, where the ledger offers one.
    fn subscribe(&self) -> Option<broadcast::Receiver<LedgerEvent>> {
        None
    }
}

/// The in-process registry acting as the chain.
pub struct RegistryLedger {
    registry: Arc<ContractRegistry>,
}
impl RegistryLedger {
    pub fn new(registry: Arc<ContractRegistry>) -> Self {
        Self { registry }
    }
}
#[async_trait]
impl Ledger for RegistryLedger {
    fn mode(&self) -> LedgerMode {
        LedgerMode::Local
    }
    async fn create_contract(
        &self,
        creator: Identity,
        contract_type: String,
        threshold: i64,
    ) -> Result<Contract> {
        self.registry
            .create_contract(creator, contract_type, threshold)
            .await
    }
    async fn submit_prediction(
        &self,
        contract: ContractId,
        prediction_type: String,
        value: i64,
        confidence: u8,
        submitter: Identity,
    ) -> Result<Submission> {
        let settlement = self
            .registry
            .settle(contract, prediction_type, value, confidence, submitter)
            .await?;
        Ok(Submission {
            mode: LedgerMode::Local,
            prediction: Some(settlement.prediction),
            executed: settlement.executed,
            events: settlement.events,
        })
    }
    async fn get_contract(&self, contract: ContractId) -> Result<Option<Contract>> {
        self.registry.get_contract(contract).await
    }
    async fn list_contracts(&self) -> Result<Vec<Contract>> {
        self.registry.list_contracts().await
    }
    async fn list_predictions(&self, contract: ContractId) -> Result<Vec<Prediction>> {
        self.registry.list_predictions(contract).await
    }
    async fn get_latest_prediction(&self, contract: ContractId) -> Result<Option<Prediction>> {
        self.registry.get_latest_prediction(contract).await
    }
    fn subscribe(&self) -> Option<broadcast::Receiver<LedgerEvent>> {
        Some(self.registry.subscribe())
    }
}

/// Stand-in used when no ledger is configured: submissions are accepted
/// without any effect.
#[derive(Debug, Default)]
pub struct DemoLedger;
#[async_trait]
impl Ledger for DemoLedger {
    fn mode(&self) -> LedgerMode {
        LedgerMode::Demo
    }
    async fn create_contract(
        &self,
        _creator: Identity,
        _contract_type: String,
        _threshold: i64,
    ) -> Result<Contract> {
        Err(OracleError::LedgerUnavailable(
            "no ledger configured".to_string(),
        ))
    }
    async fn submit_prediction(
        &self,
        contract: ContractId,
        prediction_type: String,
        value: i64,
        confidence: u8,
        _submitter: Identity,
    ) -> Result<Submission> {
        info!(
            "Demo mode, would submit {} = {} ({}%) to contract {}",
            prediction_type, value, confidence, contract
        );
        Ok(Submission {
            mode: LedgerMode::Demo,
            prediction: None,
            executed: false,
            events: vec![],
        })
    }
    async fn get_contract(&self, _contract: ContractId) -> Result<Option<Contract>> {
        Ok(None)
    }
    async fn list_contracts(&self) -> Result<Vec<Contract>> {
        Ok(vec![])
    }
    async fn list_predictions(&self, contract: ContractId) -> Result<Vec<Prediction>> {
        Err(OracleError::ContractNotFound(contract))
    }
    async fn get_latest_prediction(&self, _contract: ContractId) -> Result<Option<Prediction>> {
        Ok(None)
    }
}
