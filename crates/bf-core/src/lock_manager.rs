//! File lock manager: the sole owner of `FileLock` state, keyed by
//! `(projectId, filePath)`. Backed by its own sqlite connection, separate
//! from the bead store's, per the ownership rule that each component's state
//! is exclusively its own.

use std::path::Path;

use chrono::{Duration, Utc};
use tokio_rusqlite::Connection;

use crate::store::{self, parse_rfc3339, rfc3339};
use crate::types::FileLock;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("lock held by another agent: {0}")]
    Conflict(String),
    #[error("not held by this agent")]
    NotHolder,
}

pub struct LockManager {
    conn: Connection,
    default_ttl: Duration,
}

impl LockManager {
    pub async fn open(path: impl AsRef<Path>, default_ttl: Duration) -> Result<Self, LockError> {
        let conn = store::open(path).await?;
        let m = Self { conn, default_ttl };
        m.init_schema().await?;
        Ok(m)
    }

    pub async fn open_in_memory(default_ttl: Duration) -> Result<Self, LockError> {
        let conn = store::open_in_memory().await?;
        let m = Self { conn, default_ttl };
        m.init_schema().await?;
        Ok(m)
    }

    async fn init_schema(&self) -> Result<(), LockError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    CREATE TABLE IF NOT EXISTS file_locks (
                        project_id  TEXT NOT NULL,
                        file_path   TEXT NOT NULL,
                        agent_id    TEXT NOT NULL,
                        bead_id     TEXT NOT NULL,
                        acquired_at TEXT NOT NULL,
                        expires_at  TEXT NOT NULL,
                        PRIMARY KEY (project_id, file_path)
                    );
                    ",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// `acquire`: if no active lock exists, create one with the default TTL.
    /// If the existing lock has expired, reclaim it for the new caller.
    /// Otherwise fail with `Conflict`.
    pub async fn acquire(&self, project_id: &str, file_path: &str, agent_id: &str, bead_id: &str) -> Result<FileLock, LockError> {
        let project_id_owned = project_id.to_string();
        let file_path_owned = file_path.to_string();
        let agent_id_owned = agent_id.to_string();
        let bead_id_owned = bead_id.to_string();
        let now = Utc::now();
        let expires_at = now + self.default_ttl;
        let now_str = rfc3339(&now);
        let expires_str = rfc3339(&expires_at);

        let result = self
            .conn
            .call(move |conn| {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT expires_at FROM file_locks WHERE project_id = ?1 AND file_path = ?2",
                        rusqlite::params![project_id_owned, file_path_owned],
                        |r| r.get(0),
                    )
                    .ok();

                if let Some(expires_at_str) = &existing {
                    let held_until = chrono::DateTime::parse_from_rfc3339(expires_at_str)
                        .expect("valid date")
                        .with_timezone(&Utc);
                    if held_until > now {
                        return Ok(false);
                    }
                }

                conn.execute(
                    "INSERT INTO file_locks (project_id, file_path, agent_id, bead_id, acquired_at, expires_at)
                     VALUES (?1,?2,?3,?4,?5,?6)
                     ON CONFLICT(project_id, file_path) DO UPDATE SET
                        agent_id=excluded.agent_id, bead_id=excluded.bead_id,
                        acquired_at=excluded.acquired_at, expires_at=excluded.expires_at",
                    rusqlite::params![project_id_owned, file_path_owned, agent_id_owned, bead_id_owned, now_str, expires_str],
                )?;
                Ok(true)
            })
            .await?;

        if !result {
            return Err(LockError::Conflict(format!("{project_id}:{file_path}")));
        }

        Ok(FileLock {
            project_id: project_id.to_string(),
            file_path: file_path.to_string(),
            agent_id: agent_id.to_string(),
            bead_id: bead_id.to_string(),
            acquired_at: now,
            expires_at,
        })
    }

    pub async fn release(&self, project_id: &str, file_path: &str, agent_id: &str) -> Result<(), LockError> {
        let project_id = project_id.to_string();
        let file_path = file_path.to_string();
        let agent_id_owned = agent_id.to_string();

        let n = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM file_locks WHERE project_id = ?1 AND file_path = ?2 AND agent_id = ?3",
                    rusqlite::params![project_id, file_path, agent_id_owned],
                )?;
                Ok(n)
            })
            .await?;

        if n == 0 {
            return Err(LockError::NotHolder);
        }
        Ok(())
    }

    pub async fn extend(&self, project_id: &str, file_path: &str, agent_id: &str, duration: Duration) -> Result<(), LockError> {
        let project_id = project_id.to_string();
        let file_path = file_path.to_string();
        let agent_id_owned = agent_id.to_string();
        let new_expiry = rfc3339(&(Utc::now() + duration));

        let n = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE file_locks SET expires_at = ?1
                     WHERE project_id = ?2 AND file_path = ?3 AND agent_id = ?4",
                    rusqlite::params![new_expiry, project_id, file_path, agent_id_owned],
                )?;
                Ok(n)
            })
            .await?;

        if n == 0 {
            return Err(LockError::NotHolder);
        }
        Ok(())
    }

    /// Bulk release on worker stop or cancel.
    pub async fn release_agent_locks(&self, agent_id: &str) -> Result<u64, LockError> {
        let agent_id = agent_id.to_string();
        let n = self
            .conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM file_locks WHERE agent_id = ?1", rusqlite::params![agent_id])?;
                Ok(n)
            })
            .await?;
        Ok(n as u64)
    }

    /// Periodic sweep: remove locks past their TTL regardless of holder.
    pub async fn clean_expired(&self) -> Result<u64, LockError> {
        let now = rfc3339(&Utc::now());
        let n = self
            .conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM file_locks WHERE expires_at <= ?1", rusqlite::params![now])?;
                Ok(n)
            })
            .await?;
        Ok(n as u64)
    }

    pub async fn list_for_project(&self, project_id: &str) -> Result<Vec<FileLock>, LockError> {
        let project_id = project_id.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT project_id, file_path, agent_id, bead_id, acquired_at, expires_at
                     FROM file_locks WHERE project_id = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![project_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(FileLock {
                        project_id: row.get(0)?,
                        file_path: row.get(1)?,
                        agent_id: row.get(2)?,
                        bead_id: row.get(3)?,
                        acquired_at: parse_rfc3339(&row.get::<_, String>(4)?),
                        expires_at: parse_rfc3339(&row.get::<_, String>(5)?),
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

    async fn manager() -> LockManager {
        LockManager::open_in_memory(Duration::minutes(10)).await.unwrap()
    }

    #[tokio::test]
    async fn acquire_then_conflict_for_second_agent() {
        let m = manager().await;
        m.acquire("proj", "src/lib.rs", "agent-1", "bf-1").await.unwrap();
        let err = m.acquire("proj", "src/lib.rs", "agent-2", "bf-2").await.unwrap_err();
        assert!(matches!(err, LockError::Conflict(_)));
    }

    #[tokio::test]
    async fn release_only_by_holder() {
        let m = manager().await;
        m.acquire("proj", "a.rs", "agent-1", "bf-1").await.unwrap();
        let err = m.release("proj", "a.rs", "agent-2").await.unwrap_err();
        assert!(matches!(err, LockError::NotHolder));
        m.release("proj", "a.rs", "agent-1").await.unwrap();
    }

    #[tokio::test]
    async fn expired_lock_is_reclaimable() {
        let m = LockManager::open_in_memory(Duration::milliseconds(-1)).await.unwrap();
        m.acquire("proj", "a.rs", "agent-1", "bf-1").await.unwrap();
        // TTL already negative, so the lock is immediately expired.
        m.acquire("proj", "a.rs", "agent-2", "bf-2").await.unwrap();
    }

    #[tokio::test]
    async fn release_agent_locks_clears_all_of_that_agents_holds() {
        let m = manager().await;
        m.acquire("proj", "a.rs", "agent-1", "bf-1").await.unwrap();
        m.acquire("proj", "b.rs", "agent-1", "bf-1").await.unwrap();
        let n = m.release_agent_locks("agent-1").await.unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn clean_expired_sweeps_past_ttl_locks() {
        let m = LockManager::open_in_memory(Duration::milliseconds(-1)).await.unwrap();
        m.acquire("proj", "a.rs", "agent-1", "bf-1").await.unwrap();
        let n = m.clean_expired().await.unwrap();
        assert_eq!(n, 1);
    }
}
