use crate::api::*;
use crate::bridge::OracleBridge;
use crate::db::SQLite;
use crate::error::{map_err_and_code, OracleError};
use crate::ledger::{DemoLedger, Ledger, RegistryLedger};
use crate::registry::ContractRegistry;
use crate::remote::{RemoteLedger, RemoteScorer};
use crate::scoring::{Scorer, ScoringEngine};
use crate::settings::{LedgerChoice, Settings};
use anyhow::Result;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use axum_macros::debug_handler;
use chrono::Utc;
use clap::Parser;
use env_logger::{Builder, WriteStyle};
use log::{debug, error, info, trace, warn, LevelFilter};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

mod api;
mod bridge;
mod client;
mod db;
mod error;
mod ledger;
mod registry;
mod remote;
mod scoring;
mod settings;

type ApiError = (StatusCode, Json<ErrorResponse>);

struct AppState {
    /// Backs the resolver routes; contract routes go through the bridge's ledger.
    registry: Arc<ContractRegistry>,
    bridge: OracleBridge,
    api_key: Option<String>,
}

#[debug_handler]
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        ledger: state.bridge.ledger_mode(),
        timestamp: Utc::now(),
    })
}
async fn models() -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: ModelKind::ALL.to_vec(),
        timestamp: Utc::now(),
    })
}
#[debug_handler]
async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<ScoreResult>, ApiError> {
    trace!("Scoring {} without submission", request.model_name);
    let score = state
        .bridge
        .predict(&request.model_name, &request.input)
        .await
        .map_err(map_err_and_code)?;
    Ok(Json(score))
}
#[debug_handler]
async fn new_contract(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewContractRequest>,
) -> Result<(StatusCode, Json<Contract>), ApiError> {
    let contract = state
        .bridge
        .ledger()
        .create_contract(request.creator, request.contract_type, request.threshold)
        .await
        .map_err(map_err_and_code)?;
    Ok((StatusCode::CREATED, Json(contract)))
}
async fn get_contracts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Contract>>, ApiError> {
    let contracts = state
        .bridge
        .ledger()
        .list_contracts()
        .await
        .map_err(map_err_and_code)?;
    Ok(Json(contracts))
}
async fn get_contract(
    State(state): State<Arc<AppState>>,
    Path(contract): Path<ContractId>,
) -> Result<Json<Contract>, ApiError> {
    let found = state
        .bridge
        .ledger()
        .get_contract(contract)
        .await
        .map_err(map_err_and_code)?;
    found
        .map(Json)
        .ok_or_else(|| map_err_and_code(OracleError::ContractNotFound(contract)))
}
async fn get_predictions(
    State(state): State<Arc<AppState>>,
    Path(contract): Path<ContractId>,
) -> Result<Json<Vec<Prediction>>, ApiError> {
    let predictions = state
        .bridge
        .ledger()
        .list_predictions(contract)
        .await
        .map_err(map_err_and_code)?;
    Ok(Json(predictions))
}
async fn get_latest_prediction(
    State(state): State<Arc<AppState>>,
    Path(contract): Path<ContractId>,
) -> Result<Json<Prediction>, ApiError> {
    let latest = state
        .bridge
        .ledger()
        .get_latest_prediction(contract)
        .await
        .map_err(map_err_and_code)?;
    latest.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                kind: ErrorKind::NotFound,
                error: format!("no prediction for contract {}", contract),
                prediction: None,
            }),
        )
    })
}
#[debug_handler]
async fn request_prediction(
    State(state): State<Arc<AppState>>,
    Path(contract): Path<ContractId>,
    Json(request): Json<RequestPredictionRequest>,
) -> Result<(StatusCode, Json<PredictionResponse>), ApiError> {
    let response = state
        .bridge
        .request_and_submit(
            contract,
            &request.model_name,
            &request.input,
            request.submitter,
        )
        .await
        .map_err(map_err_and_code)?;
    debug!(
        "Bridged {} into contract {} ({} ledger)",
        response.prediction.model, contract, response.submission.mode
    );
    Ok((StatusCode::CREATED, Json(response)))
}
/// Raw resolver route: records an already computed prediction.
#[debug_handler]
async fn submit_prediction(
    State(state): State<Arc<AppState>>,
    Path(contract): Path<ContractId>,
    headers: HeaderMap,
    Json(request): Json<SubmitPredictionRequest>,
) -> Result<(StatusCode, Json<Settlement>), ApiError> {
    if let Some(api_key) = &state.api_key {
        let given = headers.get("X-Api-Key").and_then(|v| v.to_str().ok());
        if given != Some(api_key.as_str()) {
            return Err(map_err_and_code(OracleError::NotAuthorized(
                "caller without a valid api key".to_string(),
            )));
        }
    }
    let settlement = state
        .registry
        .settle(
            contract,
            request.prediction_type,
            request.value,
            request.confidence,
            request.submitter,
        )
        .await
        .map_err(map_err_and_code)?;
    Ok((StatusCode::CREATED, Json(settlement)))
}
#[debug_handler]
async fn authorize_oracle(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AuthorizeOracleRequest>,
) -> Result<(), ApiError> {
    state
        .registry
        .authorize_oracle(&request.caller, request.address)
        .await
        .map_err(map_err_and_code)?;
    Ok(())
}

#[derive(Parser)]
struct Args {
    /// Configuration file (toml, yaml or json)
    #[arg(short, long)]
    config: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(short, long)]
    db: Option<String>,
    #[arg(long)]
    owner: Option<String>,
    /// Pre-authorized oracle, may be repeated
    #[arg(short, long)]
    oracle: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    Builder::default()
        .filter_level(LevelFilter::Info)
        .write_style(WriteStyle::Always)
        .parse_default_env()
        .init();
    let cli = Args::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if cli.db.is_some() {
        settings.server.db = cli.db;
    }
    if let Some(owner) = cli.owner {
        settings.registry.owner = owner;
    }
    settings.registry.oracles.extend(cli.oracle);
    let (_port, handle) = run_server(settings).await?;
    handle.await?;
    Ok(())
}

async fn build_ledger(
    settings: &Settings,
    registry: &Arc<ContractRegistry>,
) -> Box<dyn Ledger + Send + Sync> {
    match settings.ledger_choice() {
        LedgerChoice::Local => Box::new(RegistryLedger::new(registry.clone())),
        LedgerChoice::Remote { endpoint, api_key } => {
            match RemoteLedger::connect(endpoint.clone(), api_key.clone()).await {
                Ok(ledger) => {
                    info!("Submitting predictions to ledger at {}", endpoint);
                    Box::new(ledger)
                }
                // submissions fail with transport errors until the peer is up
                Err(e) => {
                    warn!("Ledger at {} is not reachable yet: {}", endpoint, e);
                    Box::new(RemoteLedger::new(endpoint, api_key))
                }
            }
        }
        LedgerChoice::Demo => {
            warn!("No ledger configured, running in demo mode");
            Box::new(DemoLedger)
        }
    }
}

fn build_scorer(settings: &Settings) -> Box<dyn Scorer + Send + Sync> {
    match &settings.scoring.endpoint {
        Some(endpoint) => {
            info!("Using scoring service at {}", endpoint);
            Box::new(RemoteScorer::new(endpoint.clone()))
        }
        None => Box::new(ScoringEngine::default()),
    }
}

async fn run_server(settings: Settings) -> Result<(u16, JoinHandle<()>)> {
    let registry = Arc::new(
        ContractRegistry::new(
            Box::new(SQLite::new(settings.server.db.clone()).await?),
            settings.registry.owner.clone(),
            settings.registry.oracles.clone(),
        )
        .await?,
    );
    let ledger = build_ledger(&settings, &registry).await;
    if let Some(mut events) = ledger.subscribe() {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => debug!("Ledger event: {}", event),
                    Err(RecvError::Lagged(missed)) => warn!("Missed {} ledger events", missed),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
    let bridge = OracleBridge::new(
        build_scorer(&settings),
        ledger,
        settings.ledger.oracle.clone(),
    );
    let state = Arc::new(AppState {
        registry,
        bridge,
        api_key: settings.server.api_key.clone(),
    });
    let app = Router::new()
        .route("/health", get(health))
        .route("/models", get(models))
        .route("/predict", post(predict))
        .route("/contracts", get(get_contracts).post(new_contract))
        .route("/contracts/:id", get(get_contract))
        .route(
            "/contracts/:id/predictions",
            get(get_predictions).post(request_prediction),
        )
        .route(
            "/contracts/:id/predictions/latest",
            get(get_latest_prediction),
        )
        .route("/contracts/:id/submissions", post(submit_prediction))
        .route("/oracle/authorize", post(authorize_oracle))
        .with_state(state);

    let addr: SocketAddr = format!("127.0.0.1:{}", settings.server.port).parse()?;
    let server = axum::Server::try_bind(&addr)?.serve(app.into_make_service());
    let port = server.local_addr().port();
    info!("Listening on {}", server.local_addr());
    let handle = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Server stopped: {}", e);
        }
    });
    Ok((port, handle))
}
