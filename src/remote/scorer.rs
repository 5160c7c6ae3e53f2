use crate::api::*;
use crate::error::{OracleError, Result};
use crate::scoring::Scorer;
use async_trait::async_trait;
use log::trace;
use reqwest::Client;
use serde_json::{json, Value};

/// Scoring service reached over HTTP (`POST /predict`).
#[derive(Debug, Clone)]
pub struct RemoteScorer {
    client: Client,
    pub url: String,
}
impl RemoteScorer {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
        }
    }
}

/// Scoring services may answer `200` with an `{"error": ...}` body.
fn error_from_body(model_name: &str, error: &str) -> OracleError {
    let lowered = error.to_lowercase();
    if lowered.contains("model not found") {
        OracleError::ModelNotFound(model_name.to_string())
    } else if lowered.contains("insufficient data") {
        OracleError::InsufficientData(error.to_string())
    } else {
        OracleError::Remote {
            kind: ErrorKind::Transport,
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl Scorer for RemoteScorer {
    async fn score(&self, model_name: &str, input: &Value) -> Result<ScoreResult> {
        trace!("Requesting {} score from {}", model_name, self.url);
        let response = self
            .client
            .post(self.url.clone() + "/predict")
            .json(&json!({ "model_type": model_name, "data": input }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::from_response(status, response.text().await?));
        }
        let body = response.json::<Value>().await?;
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(error_from_body(model_name, error));
        }
        serde_json::from_value(body).map_err(|e| OracleError::Remote {
            kind: ErrorKind::Transport,
            message: format!("undecodable score: {}", e),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scoring_service_errors_keep_their_kind() {
        assert!(matches!(
            error_from_body("weather", "Model not found"),
            OracleError::ModelNotFound(model) if model == "weather"
        ));
        assert!(matches!(
            error_from_body("price_prediction", "Insufficient data"),
            OracleError::InsufficientData(_)
        ));
        assert_eq!(
            error_from_body("risk_analysis", "boom").kind(),
            ErrorKind::Transport
        );
    }
}
