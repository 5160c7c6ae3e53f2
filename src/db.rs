use crate::api::*;
use crate::error::{OracleError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{query, Executor, Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct NewContract {
    pub creator: Identity,
    pub contract_type: String,
    pub threshold: i64,
}
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub contract: ContractId,
    pub prediction_type: String,
    pub value: i64,
    pub confidence: u8,
    pub oracle: Identity,
}
/// What an accepted prediction did to its contract.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub prediction: Prediction,
    pub contract: Contract,
    pub executed: bool,
}

#[async_trait]
pub trait DB {
    async fn add_contract(&self, contract: NewContract, now: DateTime<Utc>) -> Result<Contract>;
    async fn get_contract(&self, contract: ContractId) -> Result<Option<Contract>>;
    async fn get_contracts(&self) -> Result<Vec<Contract>>;
    /// Stores the prediction and applies the threshold rule in one step.
    ///
    /// Fails with [`OracleError::ContractNotFound`] or
    /// [`OracleError::ContractInactive`] without storing anything.
    async fn add_prediction(&self, prediction: NewPrediction, now: DateTime<Utc>)
        -> Result<Recorded>;
    async fn get_prediction(&self, prediction: PredictionId) -> Result<Option<Prediction>>;
    async fn get_predictions(&self, contract: ContractId) -> Result<Vec<Prediction>>;
    async fn get_latest_prediction(&self, contract: ContractId) -> Result<Option<Prediction>>;
    async fn add_oracle(&self, oracle: &Identity) -> Result<()>;
    async fn is_oracle(&self, oracle: &Identity) -> Result<bool>;
}
pub struct SQLite {
    connection: SqlitePool,
}
impl SQLite {
    pub async fn new(db_conn: Option<String>) -> Result<Self> {
        let url = db_conn.unwrap_or("sqlite::memory:".to_string());
        let connect = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        // Every connection to :memory: opens its own database
        let connection = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(connect)
                .await?
        } else {
            SqlitePoolOptions::new()
                .connect_with(connect.journal_mode(SqliteJournalMode::Wal))
                .await?
        };
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS contracts (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                creator TEXT NOT NULL,\
                contract_type TEXT NOT NULL,\
                threshold INTEGER NOT NULL,\
                is_active BOOLEAN NOT NULL,\
                created_at INTEGER NOT NULL,\
                last_updated INTEGER NOT NULL\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS predictions (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                contract_id INTEGER NOT NULL REFERENCES contracts(id),\
                prediction_type TEXT NOT NULL,\
                value INTEGER NOT NULL,\
                confidence INTEGER NOT NULL,\
                oracle TEXT NOT NULL,\
                timestamp INTEGER NOT NULL\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE INDEX IF NOT EXISTS predictions_contract \
                ON predictions (contract_id, timestamp)",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS oracles (\
                address TEXT PRIMARY KEY\
                )",
            )
            .await?;
        Ok(Self { connection })
    }
}

fn to_micros(time: DateTime<Utc>) -> i64 {
    time.timestamp_micros()
}
fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(
        micros.div_euclid(1_000_000),
        (micros.rem_euclid(1_000_000) * 1_000) as u32,
    )
    .single()
    .ok_or_else(|| OracleError::Corrupt(format!("timestamp {} out of range", micros)))
}
fn contract_from_row(row: &SqliteRow) -> Result<Contract> {
    Ok(Contract {
        id: row.try_get("id")?,
        creator: row.try_get("creator")?,
        contract_type: row.try_get("contract_type")?,
        threshold: row.try_get("threshold")?,
        is_active: row.try_get("is_active")?,
        created_at: from_micros(row.try_get("created_at")?)?,
        last_updated: from_micros(row.try_get("last_updated")?)?,
    })
}
fn prediction_from_row(row: &SqliteRow) -> Result<Prediction> {
    let confidence: i64 = row.try_get("confidence")?;
    Ok(Prediction {
        id: row.try_get("id")?,
        contract_id: row.try_get("contract_id")?,
        prediction_type: row.try_get("prediction_type")?,
        value: row.try_get("value")?,
        confidence: u8::try_from(confidence)
            .map_err(|_| OracleError::Corrupt(format!("confidence {}", confidence)))?,
        oracle: row.try_get("oracle")?,
        timestamp: from_micros(row.try_get("timestamp")?)?,
    })
}
const CONTRACT_COLUMNS: &str =
    "id, creator, contract_type, threshold, is_active, created_at, last_updated";
const PREDICTION_COLUMNS: &str =
    "id, contract_id, prediction_type, value, confidence, oracle, timestamp";

#[async_trait]
impl DB for SQLite {
    async fn add_contract(&self, contract: NewContract, now: DateTime<Utc>) -> Result<Contract> {
        let id = self
            .connection
            .execute(
                query(
                    "INSERT INTO contracts (\
                creator,\
                contract_type,\
                threshold,\
                is_active,\
                created_at,\
                last_updated)\
                VALUES (?,?,?,1,?,?)",
                )
                .bind(&contract.creator)
                .bind(&contract.contract_type)
                .bind(contract.threshold)
                .bind(to_micros(now))
                .bind(to_micros(now)),
            )
            .await?
            .last_insert_rowid();
        self.get_contract(id)
            .await?
            .ok_or(OracleError::ContractNotFound(id))
    }
    async fn get_contract(&self, contract: ContractId) -> Result<Option<Contract>> {
        let stmt = format!("SELECT {} FROM contracts WHERE id = ?", CONTRACT_COLUMNS);
        let row = self
            .connection
            .fetch_optional(query(&stmt).bind(contract))
            .await?;
        row.as_ref().map(contract_from_row).transpose()
    }
    async fn get_contracts(&self) -> Result<Vec<Contract>> {
        let stmt = format!("SELECT {} FROM contracts ORDER BY id", CONTRACT_COLUMNS);
        let rows = self.connection.fetch_all(query(&stmt)).await?;
        rows.iter().map(contract_from_row).collect()
    }
    async fn add_prediction(
        &self,
        prediction: NewPrediction,
        now: DateTime<Utc>,
    ) -> Result<Recorded> {
        let now = from_micros(to_micros(now))?;
        // Dropping the transaction on an early return rolls it back
        let mut tx = self.connection.begin().await?;
        // Write first so the transaction holds the write lock before it reads.
        // Concurrent writers then wait on the busy timeout instead of failing
        // to upgrade a read lock.
        query("UPDATE contracts SET last_updated = last_updated WHERE id = ?")
            .bind(prediction.contract)
            .execute(&mut *tx)
            .await?;
        let stmt = format!("SELECT {} FROM contracts WHERE id = ?", CONTRACT_COLUMNS);
        let mut contract = match query(&stmt)
            .bind(prediction.contract)
            .fetch_optional(&mut *tx)
            .await?
        {
            Some(row) => contract_from_row(&row)?,
            None => return Err(OracleError::ContractNotFound(prediction.contract)),
        };
        if !contract.is_active {
            return Err(OracleError::ContractInactive(contract.id));
        }
        let id = query(
            "INSERT INTO predictions (\
            contract_id,\
            prediction_type,\
            value,\
            confidence,\
            oracle,\
            timestamp)\
            VALUES (?,?,?,?,?,?)",
        )
        .bind(prediction.contract)
        .bind(&prediction.prediction_type)
        .bind(prediction.value)
        .bind(i64::from(prediction.confidence))
        .bind(&prediction.oracle)
        .bind(to_micros(now))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let executed = prediction.value.unsigned_abs() >= contract.threshold.unsigned_abs();
        let last_updated = contract.last_updated.max(now);
        query(
            "UPDATE contracts SET \
            is_active = ?, \
            last_updated = ? \
            WHERE id = ?",
        )
        .bind(!executed)
        .bind(to_micros(last_updated))
        .bind(contract.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        contract.is_active = !executed;
        contract.last_updated = last_updated;
        Ok(Recorded {
            prediction: Prediction {
                id,
                contract_id: prediction.contract,
                prediction_type: prediction.prediction_type,
                value: prediction.value,
                confidence: prediction.confidence,
                oracle: prediction.oracle,
                timestamp: now,
            },
            contract,
            executed,
        })
    }
    async fn get_prediction(&self, prediction: PredictionId) -> Result<Option<Prediction>> {
        let stmt = format!("SELECT {} FROM predictions WHERE id = ?", PREDICTION_COLUMNS);
        let row = self
            .connection
            .fetch_optional(query(&stmt).bind(prediction))
            .await?;
        row.as_ref().map(prediction_from_row).transpose()
    }
    async fn get_predictions(&self, contract: ContractId) -> Result<Vec<Prediction>> {
        let stmt = format!(
            "SELECT {} FROM predictions WHERE contract_id = ? ORDER BY id",
            PREDICTION_COLUMNS
        );
        let rows = self
            .connection
            .fetch_all(query(&stmt).bind(contract))
            .await?;
        rows.iter().map(prediction_from_row).collect()
    }
    async fn get_latest_prediction(&self, contract: ContractId) -> Result<Option<Prediction>> {
        let stmt = format!(
            "SELECT {} FROM predictions WHERE contract_id = ? \
            ORDER BY timestamp DESC, id DESC LIMIT 1",
            PREDICTION_COLUMNS
        );
        let row = self
            .connection
            .fetch_optional(query(&stmt).bind(contract))
            .await?;
        row.as_ref().map(prediction_from_row).transpose()
    }
    async fn add_oracle(&self, oracle: &Identity) -> Result<()> {
        self.connection
            .execute(query("INSERT OR IGNORE INTO oracles (address) VALUES (?)").bind(oracle))
            .await?;
        Ok(())
    }
    async fn is_oracle(&self, oracle: &Identity) -> Result<bool> {
        let row = self
            .connection
            .fetch_optional(query("SELECT address FROM oracles WHERE address = ?").bind(oracle))
            .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration;

    fn new_contract(threshold: i64) -> NewContract {
        NewContract {
            creator: "alice".to_string(),
            contract_type: "insurance".to_string(),
            threshold,
        }
    }
    fn new_prediction(contract: ContractId, value: i64) -> NewPrediction {
        NewPrediction {
            contract,
            prediction_type: "risk_analysis".to_string(),
            value,
            confidence: 90,
            oracle: "oracle".to_string(),
        }
    }

    #[tokio::test]
    async fn ids_are_assigned_in_order() {
        let db = SQLite::new(None).await.unwrap();
        let now = Utc::now();
        let first = db.add_contract(new_contract(10), now).await.unwrap();
        let second = db.add_contract(new_contract(10), now).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(first.is_active);
        assert_eq!(first.created_at, first.last_updated);
        assert_eq!(db.get_contracts().await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn rejected_prediction_leaves_no_trace() {
        let db = SQLite::new(None).await.unwrap();
        let now = Utc::now();
        let contract = db.add_contract(new_contract(10), now).await.unwrap();
        let recorded = db
            .add_prediction(new_prediction(contract.id, -10), now)
            .await
            .unwrap();
        assert!(recorded.executed);
        assert!(!recorded.contract.is_active);
        let err = db
            .add_prediction(new_prediction(contract.id, 1), now)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::ContractInactive(id) if id == contract.id));
        let err = db
            .add_prediction(new_prediction(99, 1), now)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::ContractNotFound(99)));
        assert_eq!(db.get_predictions(contract.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn last_updated_never_moves_back() {
        let db = SQLite::new(None).await.unwrap();
        let now = Utc::now();
        let contract = db.add_contract(new_contract(1000), now).await.unwrap();
        let recorded = db
            .add_prediction(new_prediction(contract.id, 1), now - Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(recorded.contract.last_updated, contract.last_updated);
        let stored = db.get_contract(contract.id).await.unwrap().unwrap();
        assert_eq!(stored.last_updated, contract.last_updated);
    }

    #[tokio::test]
    async fn latest_prediction_breaks_ties_by_id() {
        let db = SQLite::new(None).await.unwrap();
        let now = Utc::now();
        let contract = db.add_contract(new_contract(1000), now).await.unwrap();
        db.add_prediction(new_prediction(contract.id, 1), now)
            .await
            .unwrap();
        let second = db
            .add_prediction(new_prediction(contract.id, 2), now)
            .await
            .unwrap();
        db.add_prediction(new_prediction(contract.id, 3), now - Duration::seconds(5))
            .await
            .unwrap();
        let latest = db.get_latest_prediction(contract.id).await.unwrap();
        assert_eq!(latest, Some(second.prediction));
    }
}
