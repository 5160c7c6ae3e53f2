use crate::api::*;
use crate::error::{OracleError, Result};
use crate::ledger::Ledger;
use crate::scoring::Scorer;
use log::debug;
use serde_json::Value;
use std::sync::Arc;

/// Stateless coordinator: score, reduce to one integer, submit.
///
/// Nothing is retried here; a retried call may submit the same score twice.
pub struct OracleBridge {
    scorer: Arc<Box<dyn Scorer + Send + Sync>>,
    ledger: Arc<Box<dyn Ledger + Send + Sync>>,
    oracle: Identity,
}

impl OracleBridge {
    pub fn new(
        scorer: Box<dyn Scorer + Send + Sync>,
        ledger: Box<dyn Ledger + Send + Sync>,
        oracle: Identity,
    ) -> Self {
        Self {
            scorer: Arc::new(scorer),
            ledger: Arc::new(ledger),
            oracle,
        }
    }
    pub fn ledger_mode(&self) -> LedgerMode {
        self.ledger.mode()
    }
    /// The ledger predictions are submitted to, for contract queries.
    pub fn ledger(&self) -> &(dyn Ledger + Send + Sync) {
        &**self.ledger
    }
    pub async fn predict(&self, model_name: &str, input: &Value) -> Result<ScoreResult> {
        self.scorer.score(model_name, input).await
    }
    pub async fn request_and_submit(
        &self,
        contract: ContractId,
        model_name: &str,
        input: &Value,
        submitter: Option<Identity>,
    ) -> Result<PredictionResponse> {
        let score = self.scorer.score(model_name, input).await?;
        let value = extract_value(&score)?;
        debug!(
            "Submitting {} = {} ({}%) to contract {}",
            score.model, value, score.confidence, contract
        );
        let submission = self
            .ledger
            .submit_prediction(
                contract,
                score.model.to_string(),
                value,
                score.confidence,
                submitter.unwrap_or_else(|| self.oracle.clone()),
            )
            .await;
        match submission {
            Ok(submission) => Ok(PredictionResponse {
                prediction: score,
                submission,
            }),
            Err(e) => Err(OracleError::Submission {
                score: Box::new(score),
                source: Box::new(e),
            }),
        }
    }
}

/// The single integer a score contributes to a contract: the price
/// prediction, else the risk score, else the fraud score, floored.
pub fn extract_value(score: &ScoreResult) -> Result<i64> {
    match score.output {
        ModelOutput::Price { prediction } => {
            if !prediction.is_finite() {
                return Err(OracleError::NonFiniteScore { model: score.model });
            }
            let value = prediction.floor();
            // i64::MAX as f64 rounds up to 2^63, which no longer fits
            if value < i64::MIN as f64 || value >= i64::MAX as f64 {
                return Err(OracleError::ScoreOutOfRange {
                    model: score.model,
                    value: prediction,
                });
            }
            Ok(value as i64)
        }
        ModelOutput::Risk { risk_score, .. } => Ok(risk_score.into()),
        ModelOutput::Fraud { fraud_score, .. } => Ok(fraud_score.into()),
    }
}
