use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;
use tars_models::analysis::AgentType;
use tars_models::recommendation::{
    Action, AgentRun, AgentRunStatus, MissingAgentInfo, Recommendation, RecommendationStatus,
};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::RecommendationStore;

pub const STORE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS recommendations (
    id                  TEXT PRIMARY KEY,
    symbol              TEXT NOT NULL,
    action              TEXT NOT NULL,
    score               REAL NOT NULL,
    confidence          REAL NOT NULL,
    reasoning           TEXT NOT NULL,
    fundamental_score   REAL NOT NULL,
    sentiment_score     REAL NOT NULL,
    technical_score     REAL NOT NULL,
    data_completeness   REAL NOT NULL,
    missing_agents_json TEXT NOT NULL,
    status              TEXT NOT NULL,
    quantity            TEXT NOT NULL,
    created_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_recommendations_symbol ON recommendations(symbol);

CREATE TABLE IF NOT EXISTS agent_runs (
    id            TEXT PRIMARY KEY,
    symbol        TEXT NOT NULL,
    agent_name    TEXT NOT NULL,
    agent_type    TEXT NOT NULL,
    status        TEXT NOT NULL,
    started_at    TEXT NOT NULL,
    completed_at  TEXT,
    duration_ms   INTEGER,
    score         REAL,
    confidence    REAL,
    error         TEXT
);
CREATE INDEX IF NOT EXISTS idx_agent_runs_symbol ON agent_runs(symbol);
";

const RECOMMENDATION_COLUMNS: &str = "id, symbol, action, score, confidence, reasoning, \
     fundamental_score, sentiment_score, technical_score, data_completeness, \
     missing_agents_json, status, quantity, created_at";

/// Raw recommendation row as read from SQLite, before parsing enums and decimals.
struct RecommendationRow {
    id: String,
    symbol: String,
    action: String,
    score: f64,
    confidence: f64,
    reasoning: String,
    fundamental_score: f64,
    sentiment_score: f64,
    technical_score: f64,
    data_completeness: f64,
    missing_agents_json: String,
    status: String,
    quantity: String,
    created_at: String,
}

impl RecommendationRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            symbol: row.get(1)?,
            action: row.get(2)?,
            score: row.get(3)?,
            confidence: row.get(4)?,
            reasoning: row.get(5)?,
            fundamental_score: row.get(6)?,
            sentiment_score: row.get(7)?,
            technical_score: row.get(8)?,
            data_completeness: row.get(9)?,
            missing_agents_json: row.get(10)?,
            status: row.get(11)?,
            quantity: row.get(12)?,
            created_at: row.get(13)?,
        })
    }

    fn into_recommendation(self) -> Result<Recommendation, StoreError> {
        let missing_agents: Vec<MissingAgentInfo> =
            serde_json::from_str(&self.missing_agents_json)?;
        Ok(Recommendation {
            id: parse_uuid(&self.id)?,
            symbol: self.symbol,
            action: Action::from_str(&self.action).map_err(StoreError::Corrupt)?,
            score: self.score,
            confidence: self.confidence,
            reasoning: self.reasoning,
            fundamental_score: self.fundamental_score,
            sentiment_score: self.sentiment_score,
            technical_score: self.technical_score,
            data_completeness: self.data_completeness,
            missing_agents,
            status: RecommendationStatus::from_str(&self.status).map_err(StoreError::Corrupt)?,
            quantity: Decimal::from_str(&self.quantity)
                .map_err(|e| StoreError::Corrupt(format!("quantity {}: {e}", self.quantity)))?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("id {value}: {e}")))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {value}: {e}")))
}

/// SQLite-backed recommendation store.
///
/// `rusqlite::Connection` is not `Sync`, so access goes through a `Mutex`.
/// The lock is never held across an await point.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store database. Creates the schema and enables WAL.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(STORE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(STORE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    pub fn get_recommendation(&self, id: Uuid) -> Result<Option<Recommendation>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM recommendations WHERE id = ?1"
        ))?;
        let row = stmt
            .query_row(rusqlite::params![id.to_string()], RecommendationRow::from_row)
            .optional()?;
        row.map(RecommendationRow::into_recommendation).transpose()
    }

    /// Most recent recommendations for a symbol, newest first.
    pub fn recommendations_for_symbol(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Recommendation>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM recommendations \
             WHERE symbol = ?1 ORDER BY created_at DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(
                rusqlite::params![symbol, limit as i64],
                RecommendationRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(RecommendationRow::into_recommendation)
            .collect()
    }

    pub fn agent_runs_for_symbol(&self, symbol: &str) -> Result<Vec<AgentRun>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, agent_name, agent_type, status, started_at, completed_at, \
             duration_ms, score, confidence, error \
             FROM agent_runs WHERE symbol = ?1 ORDER BY started_at",
        )?;
        #[allow(clippy::type_complexity)]
        let rows: Vec<(
            String,
            String,
            String,
            String,
            String,
            Option<String>,
            Option<i64>,
            Option<f64>,
            Option<f64>,
            Option<String>,
        )> = stmt
            .query_map(rusqlite::params![symbol], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(id, agent_name, agent_type, status, started_at, completed_at, duration_ms, score, confidence, error)| {
                    Ok(AgentRun {
                        id: parse_uuid(&id)?,
                        symbol: symbol.to_string(),
                        agent_name,
                        agent_type: AgentType::from_str(&agent_type).map_err(StoreError::Corrupt)?,
                        status: AgentRunStatus::from_str(&status).map_err(StoreError::Corrupt)?,
                        started_at: parse_timestamp(&started_at)?,
                        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
                        duration_ms: duration_ms.map(|ms| ms.max(0) as u64),
                        score,
                        confidence,
                        error,
                    })
                },
            )
            .collect()
    }
}

#[async_trait]
impl RecommendationStore for SqliteStore {
    async fn create_agent_run(&self, run: &AgentRun) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO agent_runs \
             (id, symbol, agent_name, agent_type, status, started_at, completed_at, \
              duration_ms, score, confidence, error) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                run.id.to_string(),
                run.symbol,
                run.agent_name,
                run.agent_type.as_str(),
                run.status.as_str(),
                run.started_at.to_rfc3339(),
                run.completed_at.map(|t| t.to_rfc3339()),
                run.duration_ms.map(|ms| ms as i64),
                run.score,
                run.confidence,
                run.error,
            ],
        )?;
        Ok(())
    }

    async fn update_agent_run(&self, run: &AgentRun) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE agent_runs SET status = ?2, completed_at = ?3, duration_ms = ?4, \
             score = ?5, confidence = ?6, error = ?7 WHERE id = ?1",
            rusqlite::params![
                run.id.to_string(),
                run.status.as_str(),
                run.completed_at.map(|t| t.to_rfc3339()),
                run.duration_ms.map(|ms| ms as i64),
                run.score,
                run.confidence,
                run.error,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::Corrupt(format!("agent run {} not found", run.id)));
        }
        Ok(())
    }

    async fn create_recommendation(&self, rec: &Recommendation) -> Result<(), StoreError> {
        let missing_agents_json = serde_json::to_string(&rec.missing_agents)?;
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO recommendations ({RECOMMENDATION_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            rusqlite::params![
                rec.id.to_string(),
                rec.symbol,
                rec.action.as_str(),
                rec.score,
                rec.confidence,
                rec.reasoning,
                rec.fundamental_score,
                rec.sentiment_score,
                rec.technical_score,
                rec.data_completeness,
                missing_agents_json,
                rec.status.as_str(),
                rec.quantity.to_string(),
                rec.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_recommendation(symbol: &str, action: Action) -> Recommendation {
        Recommendation {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            action,
            score: 42.5,
            confidence: 63.0,
            reasoning: "Analysis based on 2 of 3 expected agents".to_string(),
            fundamental_score: 50.0,
            sentiment_score: 0.0,
            technical_score: 35.0,
            data_completeness: 66.67,
            missing_agents: vec![MissingAgentInfo::failed(
                AgentType::News,
                "news_analyst",
                "timed out",
            )],
            status: RecommendationStatus::Pending,
            quantity: dec!(12),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn recommendation_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rec = make_recommendation("AAPL", Action::Buy);
        store.create_recommendation(&rec).await.unwrap();

        let loaded = store.get_recommendation(rec.id).unwrap().unwrap();
        assert_eq!(loaded.symbol, "AAPL");
        assert_eq!(loaded.action, Action::Buy);
        assert_eq!(loaded.quantity, dec!(12));
        assert_eq!(loaded.missing_agents, rec.missing_agents);
        assert_eq!(loaded.created_at.timestamp_micros(), rec.created_at.timestamp_micros());
    }

    #[tokio::test]
    async fn get_missing_recommendation() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_recommendation(Uuid::new_v4()).unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_recommendation_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rec = make_recommendation("AAPL", Action::Hold);
        store.create_recommendation(&rec).await.unwrap();
        let err = store.create_recommendation(&rec).await.unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }

    #[tokio::test]
    async fn recommendations_for_symbol_filters_and_limits() {
        let store = SqliteStore::open_in_memory().unwrap();
        for _ in 0..3 {
            store
                .create_recommendation(&make_recommendation("AAPL", Action::Buy))
                .await
                .unwrap();
        }
        store
            .create_recommendation(&make_recommendation("TSLA", Action::Sell))
            .await
            .unwrap();

        assert_eq!(store.recommendations_for_symbol("AAPL", 10).unwrap().len(), 3);
        assert_eq!(store.recommendations_for_symbol("AAPL", 2).unwrap().len(), 2);
        let tsla = store.recommendations_for_symbol("TSLA", 10).unwrap();
        assert_eq!(tsla.len(), 1);
        assert_eq!(tsla[0].action, Action::Sell);
    }

    #[tokio::test]
    async fn agent_run_create_and_update() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut run = AgentRun::start("NVDA", "technical_analyst", AgentType::Technical);
        store.create_agent_run(&run).await.unwrap();

        run.complete(61.0, 72.0, 850);
        store.update_agent_run(&run).await.unwrap();

        let runs = store.agent_runs_for_symbol("NVDA").unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, AgentRunStatus::Completed);
        assert_eq!(runs[0].score, Some(61.0));
        assert_eq!(runs[0].duration_ms, Some(850));
        assert!(runs[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn updating_unknown_run_fails() {
        let store = SqliteStore::open_in_memory().unwrap();
        let run = AgentRun::start("NVDA", "news_analyst", AgentType::News);
        assert!(store.update_agent_run(&run).await.is_err());
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tars.db");
        let path = path.to_str().unwrap();

        let rec = make_recommendation("MSFT", Action::Buy);
        {
            let store = SqliteStore::open(path).unwrap();
            store.create_recommendation(&rec).await.unwrap();
        }

        let reopened = SqliteStore::open(path).unwrap();
        let loaded = reopened.get_recommendation(rec.id).unwrap().unwrap();
        assert_eq!(loaded.id, rec.id);
    }
}
