use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use spar_core::events::SourceDoc;
use spar_core::ids::{RunId, SessionId};

use crate::database::Database;
use crate::error::StoreError;

/// One persona's outcome within a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaResponse {
    pub model: String,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// One run of the debate: both persona responses and their summaries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub minimizer: PersonaResponse,
    pub hawk: PersonaResponse,
}

/// A finished debate as persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateRecord {
    pub id: SessionId,
    pub topic: String,
    pub created_at: String,
    pub is_multi_run: bool,
    pub runs: Vec<RunRecord>,
    pub sources: Vec<SourceDoc>,
}

pub struct DebateRepo {
    db: Database,
}

impl DebateRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a finished debate.
    #[instrument(skip(self, runs, sources), fields(topic, runs = runs.len()))]
    pub fn insert(
        &self,
        topic: &str,
        is_multi_run: bool,
        runs: Vec<RunRecord>,
        sources: Vec<SourceDoc>,
    ) -> Result<DebateRecord, StoreError> {
        let id = SessionId::new();
        let now = Utc::now().to_rfc3339();
        let runs_json = serde_json::to_string(&runs)?;
        let sources_json = serde_json::to_string(&sources)?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO debates (id, topic, created_at, is_multi_run, runs, sources)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.as_str(),
                    topic,
                    now,
                    is_multi_run,
                    runs_json,
                    sources_json,
                ],
            )?;
            Ok(())
        })?;

        Ok(DebateRecord {
            id,
            topic: topic.to_string(),
            created_at: now,
            is_multi_run,
            runs,
            sources,
        })
    }

    /// Get one debate by id.
    #[instrument(skip(self), fields(debate_id = %id))]
    pub fn get(&self, id: &SessionId) -> Result<DebateRecord, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, topic, created_at, is_multi_run, runs, sources
                 FROM debates WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_record(row),
                None => Err(StoreError::NotFound(format!("debate {id}"))),
            }
        })
    }

    /// List debates newest first.
    #[instrument(skip(self))]
    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<DebateRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, topic, created_at, is_multi_run, runs, sources
                 FROM debates ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map([limit, offset], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (id, topic, created_at, is_multi_run, runs, sources) = row?;
                records.push(DebateRecord {
                    id: SessionId::from_raw(&id),
                    topic,
                    created_at,
                    is_multi_run,
                    runs: serde_json::from_str(&runs)?,
                    sources: serde_json::from_str(&sources)?,
                });
            }
            Ok(records)
        })
    }

    /// Delete one debate. NotFound when nothing matched.
    #[instrument(skip(self), fields(debate_id = %id))]
    pub fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM debates WHERE id = ?1", [id.as_str()])?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("debate {id}")));
            }
            Ok(())
        })
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<DebateRecord, StoreError> {
    let id: String = row.get(0)?;
    let runs: String = row.get(4)?;
    let sources: String = row.get(5)?;
    Ok(DebateRecord {
        id: SessionId::from_raw(&id),
        topic: row.get(1)?,
        created_at: row.get(2)?,
        is_multi_run: row.get(3)?,
        runs: serde_json::from_str(&runs)?,
        sources: serde_json::from_str(&sources)?,
    })
}
