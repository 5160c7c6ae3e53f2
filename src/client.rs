use anyhow::{bail, Result};
use reqwest::{Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::api::*;

#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    client: reqwest::Client,
}
pub async fn bail_if_err(response: Response, expected_code: StatusCode) -> Result<Response> {
    let status = response.status();
    if status != expected_code {
        let text = response.text().await?;
        match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(error) => bail!("{} ({}): {}", status, error.kind, error.error),
            Err(_) => bail!("{}: {}", status, text),
        }
    }
    Ok(response)
}
impl Client {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::new();
        Self { url, client }
    }
    async fn post(
        &self,
        path: &str,
        request: impl Serialize,
        expected_code: StatusCode,
    ) -> Result<Response> {
        let response = self
            .client
            .post(self.url.clone() + path)
            .json(&request)
            .send()
            .await?;
        bail_if_err(response, expected_code).await
    }
    async fn get(&self, path: &str, expected_code: StatusCode) -> Result<Response> {
        let response = self.client.get(self.url.clone() + path).send().await?;
        bail_if_err(response, expected_code).await
    }
    /// `GET` that maps `404` to `None`.
    async fn get_optional(&self, path: &str) -> Result<Option<Response>> {
        let response = self.client.get(self.url.clone() + path).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(bail_if_err(response, StatusCode::OK).await?))
    }
    /// Posts without checking the status, for callers that inspect errors.
    pub async fn post_raw(&self, path: &str, request: impl Serialize) -> Result<Response> {
        Ok(self
            .client
            .post(self.url.clone() + path)
            .json(&request)
            .send()
            .await?)
    }
    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.get("/health", StatusCode::OK).await?;
        Ok(response.json::<HealthResponse>().await?)
    }
    pub async fn models(&self) -> Result<ModelsResponse> {
        let response = self.get("/models", StatusCode::OK).await?;
        Ok(response.json::<ModelsResponse>().await?)
    }
    pub async fn predict(&self, model_name: String, input: Value) -> Result<ScoreResult> {
        let request = PredictRequest { model_name, input };
        let response = self.post("/predict", request, StatusCode::OK).await?;
        Ok(response.json::<ScoreResult>().await?)
    }
    pub async fn new_contract(&self, request: NewContractRequest) -> Result<Contract> {
        let response = self
            .post("/contracts", request, StatusCode::CREATED)
            .await?;
        Ok(response.json::<Contract>().await?)
    }
    pub async fn get_contracts(&self) -> Result<Vec<Contract>> {
        let response = self.get("/contracts", StatusCode::OK).await?;
        Ok(response.json::<Vec<Contract>>().await?)
    }
    pub async fn get_contract(&self, contract: ContractId) -> Result<Option<Contract>> {
        match self
            .get_optional(format!("/contracts/{}", contract).as_str())
            .await?
        {
            Some(response) => Ok(Some(response.json::<Contract>().await?)),
            None => Ok(None),
        }
    }
    pub async fn get_predictions(&self, contract: ContractId) -> Result<Vec<Prediction>> {
        let response = self
            .get(
                format!("/contracts/{}/predictions", contract).as_str(),
                StatusCode::OK,
            )
            .await?;
        Ok(response.json::<Vec<Prediction>>().await?)
    }
    pub async fn get_latest_prediction(&self, contract: ContractId) -> Result<Option<Prediction>> {
        match self
            .get_optional(format!("/contracts/{}/predictions/latest", contract).as_str())
            .await?
        {
            Some(response) => Ok(Some(response.json::<Prediction>().await?)),
            None => Ok(None),
        }
    }
    pub async fn request_prediction(
        &self,
        contract: ContractId,
        request: RequestPredictionRequest,
    ) -> Result<PredictionResponse> {
        let response = self
            .post(
                format!("/contracts/{}/predictions", contract).as_str(),
                request,
                StatusCode::CREATED,
            )
            .await?;
        Ok(response.json::<PredictionResponse>().await?)
    }
    pub async fn authorize_oracle(&self, request: AuthorizeOracleRequest) -> Result<()> {
        self.post("/oracle/authorize", request, StatusCode::OK)
            .await?;
        Ok(())
    }
}
