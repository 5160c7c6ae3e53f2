use crate::api::*;
use crate::db::{NewContract, NewPrediction, DB};
use crate::error::{OracleError, Result};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Owner of all contracts and predictions.
///
/// Submissions against the same contract are serialized so the threshold
/// check and the flip to inactive happen as one step; submissions against
/// different contracts run independently.
pub struct ContractRegistry {
    db: Arc<Box<dyn DB + Send + Sync>>,
    owner: Identity,
    locks: Mutex<HashMap<ContractId, Arc<tokio::sync::Mutex<()>>>>,
    events: broadcast::Sender<LedgerEvent>,
}

impl ContractRegistry {
    pub async fn new(
        db: Box<dyn DB + Send + Sync>,
        owner: Identity,
        oracles: Vec<Identity>,
    ) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let me = Self {
            db: Arc::new(db),
            owner,
            locks: Mutex::new(HashMap::new()),
            events,
        };
        for oracle in oracles {
            me.db.add_oracle(&oracle).await?;
            debug!("Pre-authorized oracle {}", oracle);
        }
        Ok(me)
    }
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }
    pub async fn create_contract(
        &self,
        creator: Identity,
        contract_type: String,
        threshold: i64,
    ) -> Result<Contract> {
        if threshold < 0 {
            return Err(OracleError::InvalidThreshold(threshold));
        }
        let contract = self
            .db
            .add_contract(
                NewContract {
                    creator,
                    contract_type,
                    threshold,
                },
                Utc::now(),
            )
            .await?;
        debug!(
            "Created contract {} ({}) with threshold {}",
            contract.id, contract.contract_type, contract.threshold
        );
        self.publish(LedgerEvent::ContractCreated {
            contract_id: contract.id,
            creator: contract.creator.clone(),
            contract_type: contract.contract_type.clone(),
        });
        Ok(contract)
    }
    pub async fn authorize_oracle(&self, caller: &Identity, oracle: Identity) -> Result<()> {
        if *caller != self.owner {
            warn!("{} tried to authorize oracle {} without being owner", caller, oracle);
            return Err(OracleError::NotAuthorized(caller.clone()));
        }
        self.db.add_oracle(&oracle).await?;
        debug!("Authorized oracle {}", oracle);
        Ok(())
    }
    pub async fn is_oracle_authorized(&self, oracle: &Identity) -> Result<bool> {
        self.db.is_oracle(oracle).await
    }
    pub async fn submit_prediction(
        &self,
        contract: ContractId,
        prediction_type: String,
        value: i64,
        confidence: u8,
        submitter: Identity,
    ) -> Result<Prediction> {
        let settlement = self
            .settle(contract, prediction_type, value, confidence, submitter)
            .await?;
        Ok(settlement.prediction)
    }
    /// Records a prediction and reports whether it executed the contract.
    pub async fn settle(
        &self,
        contract: ContractId,
        prediction_type: String,
        value: i64,
        confidence: u8,
        submitter: Identity,
    ) -> Result<Settlement> {
        if !self.db.is_oracle(&submitter).await? {
            warn!(
                "Unauthorized prediction submission by {} on contract {}",
                submitter, contract
            );
            return Err(OracleError::NotAuthorized(submitter));
        }
        if confidence > 100 {
            return Err(OracleError::InvalidConfidence(confidence));
        }
        if self.db.get_contract(contract).await?.is_none() {
            return Err(OracleError::ContractNotFound(contract));
        }

        let lock = self.contract_lock(contract);
        let _guard = lock.lock().await;
        let recorded = self
            .db
            .add_prediction(
                NewPrediction {
                    contract,
                    prediction_type,
                    value,
                    confidence,
                    oracle: submitter,
                },
                Utc::now(),
            )
            .await
            .map_err(|e| {
                if let OracleError::ContractInactive(_) = e {
                    self.release_lock(contract);
                }
                e
            })?;
        if recorded.executed {
            self.release_lock(contract);
        }
        let prediction = recorded.prediction;
        debug!(
            "Recorded prediction {} on contract {}: {} = {} ({}%)",
            prediction.id,
            contract,
            prediction.prediction_type,
            prediction.value,
            prediction.confidence
        );

        let mut events = vec![LedgerEvent::PredictionReceived {
            contract_id: contract,
            prediction_type: prediction.prediction_type.clone(),
            value: prediction.value,
            confidence: prediction.confidence,
        }];
        if recorded.executed {
            let reason = format!(
                "threshold reached: {} >= {}",
                prediction.value.unsigned_abs(),
                recorded.contract.threshold
            );
            info!("Contract {} auto-executed, {}", contract, reason);
            events.push(LedgerEvent::ContractExecuted {
                contract_id: contract,
                reason,
            });
        }
        for event in &events {
            self.publish(event.clone());
        }
        Ok(Settlement {
            prediction,
            executed: recorded.executed,
            events,
        })
    }
    pub async fn get_contract(&self, contract: ContractId) -> Result<Option<Contract>> {
        self.db.get_contract(contract).await
    }
    pub async fn list_contracts(&self) -> Result<Vec<Contract>> {
        self.db.get_contracts().await
    }
    pub async fn get_prediction(&self, prediction: PredictionId) -> Result<Option<Prediction>> {
        self.db.get_prediction(prediction).await
    }
    pub async fn list_predictions(&self, contract: ContractId) -> Result<Vec<Prediction>> {
        if self.db.get_contract(contract).await?.is_none() {
            return Err(OracleError::ContractNotFound(contract));
        }
        self.db.get_predictions(contract).await
    }
    pub async fn get_latest_prediction(&self, contract: ContractId) -> Result<Option<Prediction>> {
        self.db.get_latest_prediction(contract).await
    }
    fn contract_lock(&self, contract: ContractId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(contract)
            .or_default()
            .clone()
    }
    /// Executed contracts never change again, so their lock can go. Late
    /// waiters still hold their clone and fail inside the store.
    fn release_lock(&self, contract: ContractId) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&contract);
    }
    fn publish(&self, event: LedgerEvent) {
        // Nobody listening is fine
        self.events.send(event).ok();
    }
}

#[allow(unused)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::db::SQLite;
    use futures_util::future::join_all;

    const OWNER: &str = "owner";
    const ORACLE: &str = "oracle";

    async fn registry() -> ContractRegistry {
        ContractRegistry::new(
            Box::new(SQLite::new(None).await.unwrap()),
            OWNER.to_string(),
            vec![ORACLE.to_string()],
        )
        .await
        .unwrap()
    }
    async fn submit(
        registry: &ContractRegistry,
        contract: ContractId,
        value: i64,
    ) -> Result<Prediction> {
        registry
            .submit_prediction(
                contract,
                "risk_analysis".to_string(),
                value,
                90,
                ORACLE.to_string(),
            )
            .await
    }

    #[tokio::test]
    async fn insurance_contract_executes_once() {
        let registry = registry().await;
        let contract = registry
            .create_contract("alice".to_string(), "insurance".to_string(), 1000)
            .await
            .unwrap();
        assert_eq!(contract.id, 1);
        assert!(contract.is_active);

        let prediction = submit(&registry, contract.id, 1500).await.unwrap();
        assert_eq!(prediction.contract_id, contract.id);
        assert_eq!(prediction.value, 1500);
        assert_eq!(prediction.confidence, 90);
        assert_eq!(prediction.oracle, ORACLE);
        let stored = registry.get_contract(contract.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(stored.last_updated >= contract.last_updated);

        let err = submit(&registry, contract.id, 1).await.unwrap_err();
        assert!(matches!(err, OracleError::ContractInactive(1)));
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(
            registry.list_predictions(contract.id).await.unwrap(),
            vec![prediction]
        );
    }

    #[tokio::test]
    async fn below_threshold_stays_active() {
        let registry = registry().await;
        let contract = registry
            .create_contract("alice".to_string(), "insurance".to_string(), 1000)
            .await
            .unwrap();
        submit(&registry, contract.id, 999).await.unwrap();
        submit(&registry, contract.id, -999).await.unwrap();
        assert!(registry.get_contract(contract.id).await.unwrap().unwrap().is_active);
        let settlement = registry
            .settle(contract.id, "x".to_string(), -1000, 50, ORACLE.to_string())
            .await
            .unwrap();
        assert!(settlement.executed);
        assert_eq!(settlement.events.len(), 2);
        assert!(!registry.get_contract(contract.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn zero_threshold_executes_on_first_prediction() {
        let registry = registry().await;
        let contract = registry
            .create_contract("alice".to_string(), "any".to_string(), 0)
            .await
            .unwrap();
        submit(&registry, contract.id, 0).await.unwrap();
        assert!(!registry.get_contract(contract.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn negative_threshold_is_rejected() {
        let registry = registry().await;
        let err = registry
            .create_contract("alice".to_string(), "insurance".to_string(), -1)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidThreshold(-1)));
        assert!(registry.list_contracts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unauthorized_oracle_is_always_rejected() {
        let registry = registry().await;
        let contract = registry
            .create_contract("alice".to_string(), "insurance".to_string(), 10)
            .await
            .unwrap();
        for value in [0, 5, 10, 10_000] {
            let err = registry
                .submit_prediction(
                    contract.id,
                    "risk_analysis".to_string(),
                    value,
                    90,
                    "mallory".to_string(),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, OracleError::NotAuthorized(ref who) if who == "mallory"));
        }
        // Also before the contract lookup
        let err = registry
            .submit_prediction(99, "x".to_string(), 1, 1, "mallory".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(registry.list_predictions(contract.id).await.unwrap().is_empty());
        assert!(registry.get_contract(contract.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn only_owner_authorizes_oracles() {
        let registry = registry().await;
        let err = registry
            .authorize_oracle(&"mallory".to_string(), "mallory".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::NotAuthorized(_)));
        assert!(!registry
            .is_oracle_authorized(&"mallory".to_string())
            .await
            .unwrap());

        registry
            .authorize_oracle(&OWNER.to_string(), "bob".to_string())
            .await
            .unwrap();
        registry
            .authorize_oracle(&OWNER.to_string(), "bob".to_string())
            .await
            .unwrap();
        assert!(registry.is_oracle_authorized(&"bob".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_contract_and_bad_confidence() {
        let registry = registry().await;
        let err = submit(&registry, 42, 1).await.unwrap_err();
        assert!(matches!(err, OracleError::ContractNotFound(42)));
        assert!(registry.get_contract(42).await.unwrap().is_none());
        assert!(registry.get_latest_prediction(42).await.unwrap().is_none());
        assert!(matches!(
            registry.list_predictions(42).await,
            Err(OracleError::ContractNotFound(42))
        ));

        let contract = registry
            .create_contract("alice".to_string(), "insurance".to_string(), 10)
            .await
            .unwrap();
        let err = registry
            .submit_prediction(contract.id, "x".to_string(), 1, 101, ORACLE.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidConfidence(101)));
    }

    #[tokio::test]
    async fn reads_are_idempotent() {
        let registry = registry().await;
        let contract = registry
            .create_contract("alice".to_string(), "insurance".to_string(), 1000)
            .await
            .unwrap();
        submit(&registry, contract.id, 1).await.unwrap();
        let latest = submit(&registry, contract.id, 2).await.unwrap();
        for _ in 0..3 {
            assert_eq!(
                registry.get_contract(contract.id).await.unwrap(),
                registry.get_contract(contract.id).await.unwrap()
            );
            assert_eq!(
                registry.get_latest_prediction(contract.id).await.unwrap(),
                Some(latest.clone())
            );
        }
        assert_eq!(
            registry.get_prediction(latest.id).await.unwrap(),
            Some(latest)
        );
    }

    #[tokio::test]
    async fn predictions_keep_submission_order() {
        let registry = registry().await;
        let contract = registry
            .create_contract("alice".to_string(), "insurance".to_string(), 1000)
            .await
            .unwrap();
        for value in [3, 1, 2] {
            submit(&registry, contract.id, value).await.unwrap();
        }
        let values: Vec<i64> = registry
            .list_predictions(contract.id)
            .await
            .unwrap()
            .iter()
            .map(|prediction| prediction.value)
            .collect();
        assert_eq!(values, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn concurrent_crossings_flip_exactly_once() {
        let registry = Arc::new(registry().await);
        let contract = registry
            .create_contract("alice".to_string(), "insurance".to_string(), 100)
            .await
            .unwrap();
        let other = registry
            .create_contract("bob".to_string(), "insurance".to_string(), 100)
            .await
            .unwrap();
        let results = join_all((0..10).map(|i| {
            let registry = registry.clone();
            let id = if i % 2 == 0 { contract.id } else { other.id };
            tokio::spawn(async move { submit(&registry, id, 500).await })
        }))
        .await;
        let mut accepted = 0;
        for result in results {
            match result.unwrap() {
                Ok(_) => accepted += 1,
                Err(OracleError::ContractInactive(_)) => {}
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        assert_eq!(accepted, 2);
        assert_eq!(registry.list_predictions(contract.id).await.unwrap().len(), 1);
        assert_eq!(registry.list_predictions(other.id).await.unwrap().len(), 1);
    }

    fn temp_db_url(name: &str) -> (std::path::PathBuf, String) {
        let path = std::env::temp_dir().join(format!(
            "oracle-{}-{}-{}.db",
            name,
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let url = format!("sqlite://{}?mode=rwc", path.display());
        (path, url)
    }
    fn remove_db(path: &std::path::Path) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.as_os_str().to_owned();
            file.push(suffix);
            std::fs::remove_file(file).ok();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn file_store_accepts_concurrent_contracts() {
        let (path, url) = temp_db_url("independent");
        let registry = Arc::new(
            ContractRegistry::new(
                Box::new(SQLite::new(Some(url)).await.unwrap()),
                OWNER.to_string(),
                vec![ORACLE.to_string()],
            )
            .await
            .unwrap(),
        );
        let mut contracts = vec![];
        for _ in 0..16 {
            let contract = registry
                .create_contract("alice".to_string(), "insurance".to_string(), 1000)
                .await
                .unwrap();
            contracts.push(contract.id);
        }
        let results = join_all((0..128).map(|i| {
            let registry = registry.clone();
            let id = contracts[i % contracts.len()];
            tokio::spawn(async move { submit(&registry, id, 1).await })
        }))
        .await;
        for result in results {
            result.unwrap().unwrap();
        }
        for id in contracts {
            assert_eq!(registry.list_predictions(id).await.unwrap().len(), 8);
        }
        remove_db(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn file_store_flips_exactly_once() {
        let (path, url) = temp_db_url("crossing");
        let registry = Arc::new(
            ContractRegistry::new(
                Box::new(SQLite::new(Some(url)).await.unwrap()),
                OWNER.to_string(),
                vec![ORACLE.to_string()],
            )
            .await
            .unwrap(),
        );
        let contract = registry
            .create_contract("alice".to_string(), "insurance".to_string(), 100)
            .await
            .unwrap();
        let results = join_all((0..32).map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { submit(&registry, contract.id, 500).await })
        }))
        .await;
        let mut accepted = 0;
        for result in results {
            match result.unwrap() {
                Ok(_) => accepted += 1,
                Err(OracleError::ContractInactive(_)) => {}
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(registry.list_predictions(contract.id).await.unwrap().len(), 1);
        remove_db(&path);
    }

    #[tokio::test]
    async fn executed_contracts_release_their_lock() {
        let registry = registry().await;
        let open = registry
            .create_contract("alice".to_string(), "insurance".to_string(), 100)
            .await
            .unwrap();
        let executed = registry
            .create_contract("bob".to_string(), "insurance".to_string(), 100)
            .await
            .unwrap();
        submit(&registry, open.id, 1).await.unwrap();
        submit(&registry, executed.id, 100).await.unwrap();
        {
            let locks = registry.locks.lock().unwrap();
            assert!(locks.contains_key(&open.id));
            assert!(!locks.contains_key(&executed.id));
        }
        submit(&registry, executed.id, 1).await.unwrap_err();
        assert!(!registry.locks.lock().unwrap().contains_key(&executed.id));
    }

    #[tokio::test]
    async fn events_are_published() {
        let registry = registry().await;
        let mut events = registry.subscribe();
        let contract = registry
            .create_contract("alice".to_string(), "insurance".to_string(), 10)
            .await
            .unwrap();
        submit(&registry, contract.id, 10).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            LedgerEvent::ContractCreated {
                contract_id: contract.id,
                creator: "alice".to_string(),
                contract_type: "insurance".to_string(),
            }
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            LedgerEvent::PredictionReceived { value: 10, .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            LedgerEvent::ContractExecuted { contract_id, .. } if contract_id == contract.id
        ));
    }
}
