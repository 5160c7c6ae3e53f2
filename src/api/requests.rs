use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::*;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    #[serde(alias = "model_type")]
    pub model_name: String,
    #[serde(default, alias = "data")]
    pub input: Value,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewContractRequest {
    pub creator: Identity,
    pub contract_type: String,
    pub threshold: i64,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestPredictionRequest {
    pub model_name: String,
    #[serde(default)]
    pub input: Value,
    pub submitter: Option<Identity>,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPredictionRequest {
    pub prediction_type: String,
    pub value: i64,
    pub confidence: u8,
    pub submitter: Identity,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeOracleRequest {
    pub address: Identity,
    pub caller: Identity,
}
