use crate::api::*;
use crate::error::{OracleError, Result};
use crate::ledger::Ledger;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;

/// Ledger resolver reached over HTTP, speaking the contract routes of this
/// service.
#[derive(Debug, Clone)]
pub struct RemoteLedger {
    client: Client,
    pub url: String,
    api_key: String,
}

impl RemoteLedger {
    pub fn new(url: String, api_key: String) -> Self {
        let client = Client::new();
        Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
    pub async fn connect(url: String, api_key: String) -> Result<Self> {
        let ledger = Self::new(url, api_key);
        ledger.is_reachable().await?;
        Ok(ledger)
    }
    pub async fn is_reachable(&self) -> Result<()> {
        self.get("/health".to_string(), StatusCode::OK).await?;
        debug!("Ledger at {} is reachable", self.url);
        Ok(())
    }
    async fn post(
        &self,
        path: String,
        request: impl Serialize,
        expected_code: StatusCode,
    ) -> Result<Response> {
        let response = self
            .client
            .post(self.url.clone() + path.as_str())
            .header("X-Api-Key", self.api_key.clone())
            .json(&request)
            .send()
            .await?;
        check(response, expected_code).await
    }
    async fn get(&self, path: String, expected_code: StatusCode) -> Result<Response> {
        let response = self
            .client
            .get(self.url.clone() + path.as_str())
            .header("X-Api-Key", self.api_key.clone())
            .send()
            .await?;
        check(response, expected_code).await
    }
    async fn get_optional(&self, path: String) -> Result<Option<Response>> {
        match self.get(path, StatusCode::OK).await {
            Ok(response) => Ok(Some(response)),
            Err(OracleError::Remote {
                kind: ErrorKind::NotFound,
                ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

async fn check(response: Response, expected_code: StatusCode) -> Result<Response> {
    let status = response.status();
    if status == expected_code {
        Ok(response)
    } else {
        let body = response.text().await?;
        Err(OracleError::from_response(status, body))
    }
}

#[async_trait]
impl Ledger for RemoteLedger {
    fn mode(&self) -> LedgerMode {
        LedgerMode::Remote
    }
    async fn create_contract(
        &self,
        creator: Identity,
        contract_type: String,
        threshold: i64,
    ) -> Result<Contract> {
        let request = NewContractRequest {
            creator,
            contract_type,
            threshold,
        };
        let response = self
            .post("/contracts".to_string(), request, StatusCode::CREATED)
            .await?;
        Ok(response.json::<Contract>().await?)
    }
    async fn submit_prediction(
        &self,
        contract: ContractId,
        prediction_type: String,
        value: i64,
        confidence: u8,
        submitter: Identity,
    ) -> Result<Submission> {
        let request = SubmitPredictionRequest {
            prediction_type,
            value,
            confidence,
            submitter,
        };
        let response = self
            .post(
                format!("/contracts/{}/submissions", contract),
                request,
                StatusCode::CREATED,
            )
            .await?;
        let settlement = response.json::<Settlement>().await?;
        Ok(Submission {
            mode: LedgerMode::Remote,
            prediction: Some(settlement.prediction),
            executed: settlement.executed,
            events: settlement.events,
        })
    }
    async fn get_contract(&self, contract: ContractId) -> Result<Option<Contract>> {
        match self.get_optional(format!("/contracts/{}", contract)).await? {
            Some(response) => Ok(Some(response.json::<Contract>().await?)),
            None => Ok(None),
        }
    }
    async fn list_contracts(&self) -> Result<Vec<Contract>> {
        let response = self.get("/contracts".to_string(), StatusCode::OK).await?;
        Ok(response.json::<Vec<Contract>>().await?)
    }
    async fn list_predictions(&self, contract: ContractId) -> Result<Vec<Prediction>> {
        let response = self
            .get(
                format!("/contracts/{}/predictions", contract),
                StatusCode::OK,
            )
            .await?;
        Ok(response.json::<Vec<Prediction>>().await?)
    }
    async fn get_latest_prediction(&self, contract: ContractId) -> Result<Option<Prediction>> {
        match self
            .get_optional(format!("/contracts/{}/predictions/latest", contract))
            .await?
        {
            Some(response) => Ok(Some(response.json::<Prediction>().await?)),
            None => Ok(None),
        }
    }
}
