use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use anyhow::bail;
use reqwest::StatusCode;

use super::*;

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::PricePrediction,
        ModelKind::RiskAnalysis,
        ModelKind::FraudDetection,
    ];
    pub fn name(&self) -> &'static str {
        match self {
            Self::PricePrediction => "price_prediction",
            Self::RiskAnalysis => "risk_analysis",
            Self::FraudDetection => "fraud_detection",
        }
    }
}
impl Display for ModelKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "price_prediction" => Ok(Self::PricePrediction),
            "risk_analysis" => Ok(Self::RiskAnalysis),
            "fraud_detection" => Ok(Self::FraudDetection),
            e => bail!("Unknown model: {}", e),
        }
    }
}
impl RiskLevel {
    /// HIGH above 70, MEDIUM above 40, LOW otherwise.
    pub fn from_score(score: f64) -> Self {
        if score > 70.0 {
            Self::High
        } else if score > 40.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}
impl Display for RiskLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        };
        write!(f, "{}", output)
    }
}
impl Display for LedgerMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Demo => "demo",
        };
        write!(f, "{}", output)
    }
}
impl Display for LedgerEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContractCreated {
                contract_id,
                creator,
                contract_type,
            } => write!(
                f,
                "ContractCreated({}, {}, {})",
                contract_id, creator, contract_type
            ),
            Self::PredictionReceived {
                contract_id,
                prediction_type,
                value,
                confidence,
            } => write!(
                f,
                "PredictionReceived({}, {}, {}, {}%)",
                contract_id, prediction_type, value, confidence
            ),
            Self::ContractExecuted {
                contract_id,
                reason,
            } => write!(f, "ContractExecuted({}, {})", contract_id, reason),
        }
    }
}
impl ErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Input => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::State => StatusCode::CONFLICT,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::Transport => StatusCode::BAD_GATEWAY,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::Input => "Input",
            Self::NotFound => "NotFound",
            Self::State => "State",
            Self::Authorization => "Authorization",
            Self::Transport => "Transport",
            Self::Unavailable => "Unavailable",
            Self::Internal => "Internal",
        };
        write!(f, "{}", output)
    }
}
