use crate::api::*;
use crate::error::{OracleError, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};

/// Anything able to turn a model name and an input record into a score.
#[async_trait]
pub trait Scorer {
    async fn score(&self, model_name: &str, input: &Value) -> Result<ScoreResult>;
}

const PRICE_WINDOW: usize = 5;
const FRAUD_JITTER: u32 = 20;

#[derive(Debug, Deserialize)]
struct PriceInput {
    #[serde(default)]
    prices: Vec<f64>,
}
#[derive(Debug, Deserialize)]
struct RiskInput {
    #[serde(default)]
    amount: f64,
    #[serde(default = "default_history_score")]
    history_score: f64,
    #[serde(default = "default_volatility")]
    volatility: f64,
}
#[derive(Debug, Deserialize)]
struct FraudInput {
    #[serde(default)]
    amount: f64,
    #[serde(default)]
    user_history: Vec<f64>,
    #[serde(default = "default_speed")]
    speed: f64,
}
fn default_history_score() -> f64 {
    50.0
}
fn default_volatility() -> f64 {
    0.5
}
fn default_speed() -> f64 {
    1.0
}

/// In-process scoring for the supported models.
///
/// Fraud scoring adds random jitter; the source of randomness can be
/// swapped with [`ScoringEngine::with_rng`] to pin it in tests.
pub struct ScoringEngine {
    rng: Mutex<Box<dyn RngCore + Send>>,
}
impl Default for ScoringEngine {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}
impl ScoringEngine {
    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
        }
    }
    pub fn score_model(&self, model: ModelKind, input: &Value) -> Result<ScoreResult> {
        let (output, confidence) = match model {
            ModelKind::PricePrediction => {
                let input: PriceInput = parse_input(model, input)?;
                let (prediction, confidence) = predict_price(&input.prices)?;
                (ModelOutput::Price { prediction }, confidence)
            }
            ModelKind::RiskAnalysis => {
                let input: RiskInput = parse_input(model, input)?;
                let (risk_score, risk_level) =
                    analyse_risk(input.amount, input.history_score, input.volatility);
                (
                    ModelOutput::Risk {
                        risk_score,
                        risk_level,
                    },
                    85,
                )
            }
            ModelKind::FraudDetection => {
                let input: FraudInput = parse_input(model, input)?;
                let jitter = self
                    .rng
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .gen_range(0..FRAUD_JITTER);
                let fraud_score =
                    detect_fraud(input.amount, &input.user_history, input.speed, jitter);
                (
                    ModelOutput::Fraud {
                        fraud_score,
                        is_fraud: fraud_score > 60,
                    },
                    fraud_confidence(fraud_score),
                )
            }
        };
        trace!("Scored {}: {:?} ({}%)", model, output, confidence);
        Ok(ScoreResult {
            output,
            confidence,
            timestamp: Utc::now(),
            model,
        })
    }
}
#[async_trait]
impl Scorer for ScoringEngine {
    async fn score(&self, model_name: &str, input: &Value) -> Result<ScoreResult> {
        let model = model_name
            .parse::<ModelKind>()
            .map_err(|_| OracleError::ModelNotFound(model_name.to_string()))?;
        self.score_model(model, input)
    }
}

fn parse_input<T: DeserializeOwned>(model: ModelKind, input: &Value) -> Result<T> {
    let input = match input {
        Value::Null => Value::Object(Default::default()),
        input => input.clone(),
    };
    serde_json::from_value(input).map_err(|e| OracleError::InvalidInput {
        model,
        reason: e.to_string(),
    })
}

/// Trailing mean plus twice the average drift over the whole series.
///
/// Confidence is `100 - 10 * stddev` of the trailing window, floored and
/// then clamped to `50..=95`.
pub fn predict_price(prices: &[f64]) -> Result<(f64, u8)> {
    if prices.len() < 2 {
        return Err(OracleError::InsufficientData(format!(
            "price_prediction needs at least 2 prices but got {}",
            prices.len()
        )));
    }
    let window = &prices[prices.len().saturating_sub(PRICE_WINDOW)..];
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let drift = (prices[prices.len() - 1] - prices[0]) / prices.len() as f64;
    let prediction = mean + drift * 2.0;

    let variance = window.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / window.len() as f64;
    let confidence = (100.0 - variance.sqrt() * 10.0).floor();
    // NaN lands on the lower bound
    let confidence = if confidence.is_nan() {
        50
    } else {
        confidence.clamp(50.0, 95.0) as u8
    };
    Ok((prediction, confidence))
}

/// Amount tier plus history and volatility penalties, clamped to
/// `0..=100`. The level is taken from the clamped value, the reported
/// score is floored.
pub fn analyse_risk(amount: f64, history_score: f64, volatility: f64) -> (u8, RiskLevel) {
    let mut risk = if amount > 10000.0 {
        30.0
    } else if amount > 5000.0 {
        20.0
    } else {
        10.0
    };
    risk += (100.0 - history_score) * 0.3;
    risk += volatility * 40.0;
    if risk.is_nan() {
        return (0, RiskLevel::Low);
    }
    let risk = risk.clamp(0.0, 100.0);
    (risk.floor() as u8, RiskLevel::from_score(risk))
}

pub fn detect_fraud(amount: f64, user_history: &[f64], speed: f64, jitter: u32) -> u8 {
    let mut score = 0u32;
    if !user_history.is_empty() {
        let average = user_history.iter().sum::<f64>() / user_history.len() as f64;
        if amount > average * 3.0 {
            score += 40;
        }
    }
    if speed > 10.0 {
        score += 30;
    }
    score += jitter.min(FRAUD_JITTER - 1);
    score.min(100) as u8
}

/// Decisive scores (above 70 or below 30) are trusted more than the
/// ambiguous band between them.
pub fn fraud_confidence(fraud_score: u8) -> u8 {
    if fraud_score > 70 || fraud_score < 30 {
        80
    } else {
        65
    }
}
