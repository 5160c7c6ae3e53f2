use crate::api::*;
use axum::http::StatusCode;
use axum::Json;
use log::{debug, warn};
use thiserror::Error;

pub type Result<T, E = OracleError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("threshold must be non-negative but was {0}")]
    InvalidThreshold(i64),
    #[error("confidence must be within 0..=100 but was {0}")]
    InvalidConfidence(u8),
    #[error("invalid input for {model}: {reason}")]
    InvalidInput { model: ModelKind, reason: String },
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("{model} produced a non-finite value")]
    NonFiniteScore { model: ModelKind },
    #[error("{model} produced {value}, which does not fit a ledger integer")]
    ScoreOutOfRange { model: ModelKind, value: f64 },
    #[error("contract {0} not found")]
    ContractNotFound(ContractId),
    #[error("prediction {0} not found")]
    PredictionNotFound(PredictionId),
    #[error("contract {0} is not active")]
    ContractInactive(ContractId),
    #[error("{0} is not authorized")]
    NotAuthorized(Identity),
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("ledger responded with {status}: {body}")]
    Ledger { status: u16, body: String },
    #[error("remote {kind} error: {message}")]
    Remote { kind: ErrorKind, message: String },
    #[error("submission failed after scoring: {source}")]
    Submission {
        score: Box<ScoreResult>,
        source: Box<OracleError>,
    },
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl OracleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidThreshold(_)
            | Self::InvalidConfidence(_)
            | Self::InvalidInput { .. }
            | Self::InsufficientData(_)
            | Self::ModelNotFound(_)
            | Self::NonFiniteScore { .. }
            | Self::ScoreOutOfRange { .. } => ErrorKind::Input,
            Self::ContractNotFound(_) | Self::PredictionNotFound(_) => ErrorKind::NotFound,
            Self::ContractInactive(_) => ErrorKind::State,
            Self::NotAuthorized(_) => ErrorKind::Authorization,
            Self::LedgerUnavailable(_) => ErrorKind::Unavailable,
            Self::Transport(_) | Self::Ledger { .. } => ErrorKind::Transport,
            Self::Remote { kind, .. } => *kind,
            Self::Submission { source, .. } => source.kind(),
            Self::Storage(_) | Self::Corrupt(_) => ErrorKind::Internal,
        }
    }
    /// The scoring result a failed submission still carries.
    pub fn score(&self) -> Option<&ScoreResult> {
        match self {
            Self::Submission { score, .. } => Some(score),
            _ => None,
        }
    }
    /// Rebuilds a typed error from a peer's error body.
    pub fn from_response(status: StatusCode, body: String) -> Self {
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(response) => Self::Remote {
                kind: response.kind,
                message: response.error,
            },
            Err(_) => Self::Ledger {
                status: status.as_u16(),
                body,
            },
        }
    }
}

pub fn map_err_and_code(e: OracleError) -> (StatusCode, Json<ErrorResponse>) {
    let kind = e.kind();
    match kind {
        ErrorKind::Authorization => warn!("Rejected: {}", e),
        _ => debug!("Error: {:#}", e),
    }
    let response = ErrorResponse {
        kind,
        error: e.to_string(),
        prediction: e.score().cloned(),
    };
    (kind.status_code(), Json(response))
}
