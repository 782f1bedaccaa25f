//! Per-project key/value memory, keyed by `(project_id, category, key)`.
//! Atomic upsert lets multiple workers converge on the same fact (e.g.
//! "this repo's test command") without losing updates.

use std::path::Path;

use chrono::Utc;
use tokio_rusqlite::Connection;

use crate::store::{self, parse_rfc3339, rfc3339};
use crate::types::ProjectMemoryEntry;

#[derive(Debug, thiserror::Error)]
pub enum ProjectMemoryError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
}

pub struct ProjectMemoryStore {
    conn: Connection,
}

impl ProjectMemoryStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ProjectMemoryError> {
        let conn = store::open(path).await?;
        let s = Self { conn };
        s.init_schema().await?;
        Ok(s)
    }

    pub async fn open_in_memory() -> Result<Self, ProjectMemoryError> {
        let conn = store::open_in_memory().await?;
        let s = Self { conn };
        s.init_schema().await?;
        Ok(s)
    }

    async fn init_schema(&self) -> Result<(), ProjectMemoryError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    CREATE TABLE IF NOT EXISTS project_memory (
                        project_id  TEXT NOT NULL,
                        category    TEXT NOT NULL,
                        key         TEXT NOT NULL,
                        value       TEXT NOT NULL,
                        confidence  REAL NOT NULL,
                        updated_at  TEXT NOT NULL,
                        source_bead TEXT,
                        PRIMARY KEY (project_id, category, key)
                    );
                    ",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn set(
        &self,
        project_id: &str,
        category: &str,
        key: &str,
        value: &str,
        confidence: f64,
        source_bead: Option<String>,
    ) -> Result<(), ProjectMemoryError> {
        let project_id = project_id.to_string();
        let category = category.to_string();
        let key = key.to_string();
        let value = value.to_string();
        let updated_at = rfc3339(&Utc::now());

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO project_memory (project_id, category, key, value, confidence, updated_at, source_bead)
                     VALUES (?1,?2,?3,?4,?5,?6,?7)
                     ON CONFLICT(project_id, category, key) DO UPDATE SET
                        value=excluded.value, confidence=excluded.confidence,
                        updated_at=excluded.updated_at, source_bead=excluded.source_bead",
                    rusqlite::params![project_id, category, key, value, confidence, updated_at, source_bead],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get(&self, project_id: &str, category: &str, key: &str) -> Result<Option<ProjectMemoryEntry>, ProjectMemoryError> {
        let project_id_owned = project_id.to_string();
        let category_owned = category.to_string();
        let key_owned = key.to_string();

        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT project_id, category, key, value, confidence, updated_at, source_bead
                     FROM project_memory WHERE project_id = ?1 AND category = ?2 AND key = ?3",
                )?;
                let mut rows = stmt.query(rusqlite::params![project_id_owned, category_owned, key_owned])?;
                match rows.next()? {
                    Some(row) => Ok(Some((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))),
                    None => Ok(None),
                }
            })
            .await?;

        Ok(row.map(|(project_id, category, key, value, confidence, updated_at, source_bead)| ProjectMemoryEntry {
            project_id,
            category,
            key,
            value,
            confidence,
            updated_at: parse_rfc3339(&updated_at),
            source_bead,
        }))
    }

    pub async fn list_by_category(&self, project_id: &str, category: &str) -> Result<Vec<ProjectMemoryEntry>, ProjectMemoryError> {
        let project_id_owned = project_id.to_string();
        let category_owned = category.to_string();

        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT project_id, category, key, value, confidence, updated_at, source_bead
                     FROM project_memory WHERE project_id = ?1 AND category = ?2",
                )?;
                let mut rows = stmt.query(rusqlite::params![project_id_owned, category_owned])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(ProjectMemoryEntry {
                        project_id: row.get(0)?,
                        category: row.get(1)?,
                        key: row.get(2)?,
                        value: row.get(3)?,
                        confidence: row.get(4)?,
                        updated_at: parse_rfc3339(&row.get::<_, String>(5)?),
                        source_bead: row.get(6)?,
                    });
                }
                Ok(out)
            })
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let s = ProjectMemoryStore::open_in_memory().await.unwrap();
        s.set("proj", "build", "test_command", "cargo test", 0.9, None).await.unwrap();
        let entry = s.get("proj", "build", "test_command").await.unwrap().unwrap();
        assert_eq!(entry.value, "cargo test");
    }

    #[tokio::test]
    async fn set_overwrites_existing_key() {
        let s = ProjectMemoryStore::open_in_memory().await.unwrap();
        s.set("proj", "build", "test_command", "old", 0.5, None).await.unwrap();
        s.set("proj", "build", "test_command", "new", 0.95, None).await.unwrap();
        let entry = s.get("proj", "build", "test_command").await.unwrap().unwrap();
        assert_eq!(entry.value, "new");
        assert_eq!(entry.confidence, 0.95);
    }

    #[tokio::test]
    async fn list_by_category_scopes_to_project_and_category() {
        let s = ProjectMemoryStore::open_in_memory().await.unwrap();
        s.set("proj", "build", "a", "1", 0.5, None).await.unwrap();
        s.set("proj", "build", "b", "2", 0.5, None).await.unwrap();
        s.set("proj", "style", "c", "3", 0.5, None).await.unwrap();
        let build = s.list_by_category("proj", "build").await.unwrap();
        assert_eq!(build.len(), 2);
    }
}
