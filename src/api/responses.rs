use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::*;

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct PredictionResponse {
    pub prediction: ScoreResult,
    pub submission: Submission,
}
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<ScoreResult>,
}
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub ledger: LedgerMode,
    pub timestamp: DateTime<Utc>,
}
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct ModelsResponse {
    pub models: Vec<ModelKind>,
    pub timestamp: DateTime<Utc>,
}
