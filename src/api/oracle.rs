use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RowId = i64;
pub type ContractId = RowId;
pub type PredictionId = RowId;
/// Opaque identity of a creator or an oracle (an address on a real ledger).
pub type Identity = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: ContractId,
    pub creator: Identity,
    pub contract_type: String,
    pub threshold: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub id: PredictionId,
    pub contract_id: ContractId,
    pub prediction_type: String,
    pub value: i64,
    pub confidence: u8,
    pub oracle: Identity,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    PricePrediction,
    RiskAnalysis,
    FraudDetection,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}
/// Model specific part of a score, flattened into [`ScoreResult`] on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ModelOutput {
    Price { prediction: f64 },
    Risk { risk_score: u8, risk_level: RiskLevel },
    Fraud { fraud_score: u8, is_fraud: bool },
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreResult {
    #[serde(flatten)]
    pub output: ModelOutput,
    pub confidence: u8,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "modelName")]
    pub model: ModelKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum LedgerEvent {
    ContractCreated {
        contract_id: ContractId,
        creator: Identity,
        contract_type: String,
    },
    PredictionReceived {
        contract_id: ContractId,
        prediction_type: String,
        value: i64,
        confidence: u8,
    },
    ContractExecuted {
        contract_id: ContractId,
        reason: String,
    },
}
/// Outcome of one accepted prediction on the authoritative store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub prediction: Prediction,
    pub executed: bool,
    pub events: Vec<LedgerEvent>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerMode {
    Local,
    Remote,
    Demo,
}
/// Receipt of a bridge submission. In [`LedgerMode::Demo`] it is an
/// acceptance without any ledger effect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub mode: LedgerMode,
    pub prediction: Option<Prediction>,
    pub executed: bool,
    pub events: Vec<LedgerEvent>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    NotFound,
    State,
    Authorization,
    Transport,
    Unavailable,
    Internal,
}
