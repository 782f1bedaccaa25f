//! The bead store: the only component that mutates bead records and their
//! dependency edges. Every other crate references beads by id only.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use tokio_rusqlite::Connection;

use crate::store::{self, enum_from_sql, enum_to_sql, parse_rfc3339, rfc3339};
use crate::types::{Bead, BeadStatus, BeadType, DecisionDetails, Edge, EdgeKind, WorkGraph};

#[derive(Debug, thiserror::Error)]
pub enum BeadStoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already claimed: {0}")]
    AlreadyClaimed(String),
}

#[derive(Debug, Default, Clone)]
pub struct BeadFilter {
    pub project_id: Option<String>,
    pub status: Option<BeadStatus>,
    pub bead_type: Option<BeadType>,
    pub priority: Option<u8>,
    pub assigned_to: Option<HashSet<String>>,
    pub tag: Option<String>,
}

/// Partial update applied by `update`. `None` fields are left untouched.
#[derive(Debug, Default)]
pub struct BeadPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<BeadStatus>,
    pub priority: Option<u8>,
    pub assigned_to: Option<Option<String>>,
    pub tags: Option<HashSet<String>>,
    pub context: Option<HashMap<String, String>>,
    pub decision: Option<DecisionDetails>,
}

/// Per-project monotone id counters, held in memory. A production deployment
/// would persist the counter alongside the project record; this store keeps
/// it here because `Project` records live in the caller's own table.
#[derive(Debug, Default)]
struct Counters(DashMap<String, AtomicU64>);

impl Counters {
    fn next(&self, project_id: &str) -> u64 {
        let entry = self.0.entry(project_id.to_string()).or_insert_with(|| AtomicU64::new(0));
        entry.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub struct BeadStore {
    conn: Connection,
    counters: Counters,
}

impl BeadStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, BeadStoreError> {
        let conn = store::open(path).await?;
        let s = Self { conn, counters: Counters::default() };
        s.init_schema().await?;
        Ok(s)
    }

    pub async fn open_in_memory() -> Result<Self, BeadStoreError> {
        let conn = store::open_in_memory().await?;
        let s = Self { conn, counters: Counters::default() };
        s.init_schema().await?;
        Ok(s)
    }

    async fn init_schema(&self) -> Result<(), BeadStoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    CREATE TABLE IF NOT EXISTS beads (
                        id           TEXT PRIMARY KEY,
                        project_id   TEXT NOT NULL,
                        title        TEXT NOT NULL,
                        description  TEXT NOT NULL,
                        bead_type    TEXT NOT NULL,
                        priority     INTEGER NOT NULL,
                        status       TEXT NOT NULL,
                        assigned_to  TEXT,
                        parent       TEXT,
                        children     TEXT NOT NULL,
                        blocked_by   TEXT NOT NULL,
                        blocks       TEXT NOT NULL,
                        related_to   TEXT NOT NULL,
                        tags         TEXT NOT NULL,
                        context      TEXT NOT NULL,
                        created_at   TEXT NOT NULL,
                        updated_at   TEXT NOT NULL,
                        closed_at    TEXT,
                        decision     TEXT
                    );

                    CREATE INDEX IF NOT EXISTS idx_beads_project ON beads(project_id);
                    CREATE INDEX IF NOT EXISTS idx_beads_status ON beads(project_id, status);

                    CREATE TABLE IF NOT EXISTS bead_edges (
                        from_id TEXT NOT NULL,
                        to_id   TEXT NOT NULL,
                        kind    TEXT NOT NULL,
                        PRIMARY KEY (from_id, to_id, kind)
                    );
                    ",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // create / get / list
    // -----------------------------------------------------------------------

    pub async fn create(&self, project_id: &str, prefix: &str, title: String, bead_type: BeadType) -> Result<String, BeadStoreError> {
        let counter = self.counters.next(project_id);
        let id = crate::types::bead_id(prefix, counter);
        let bead = Bead::new(id.clone(), project_id.to_string(), title, bead_type);
        self.upsert(&bead).await?;
        Ok(id)
    }

    async fn upsert(&self, bead: &Bead) -> Result<(), BeadStoreError> {
        let bead = bead.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO beads (id, project_id, title, description, bead_type, priority,
                        status, assigned_to, parent, children, blocked_by, blocks, related_to,
                        tags, context, created_at, updated_at, closed_at, decision)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)
                     ON CONFLICT(id) DO UPDATE SET
                        title=excluded.title, description=excluded.description,
                        bead_type=excluded.bead_type, priority=excluded.priority,
                        status=excluded.status, assigned_to=excluded.assigned_to,
                        parent=excluded.parent, children=excluded.children,
                        blocked_by=excluded.blocked_by, blocks=excluded.blocks,
                        related_to=excluded.related_to, tags=excluded.tags,
                        context=excluded.context, updated_at=excluded.updated_at,
                        closed_at=excluded.closed_at, decision=excluded.decision",
                    rusqlite::params![
                        bead.id,
                        bead.project_id,
                        bead.title,
                        bead.description,
                        enum_to_sql(&bead.bead_type),
                        bead.priority,
                        enum_to_sql(&bead.status),
                        bead.assigned_to,
                        bead.parent,
                        serde_json::to_string(&bead.children).unwrap(),
                        serde_json::to_string(&bead.blocked_by).unwrap(),
                        serde_json::to_string(&bead.blocks).unwrap(),
                        serde_json::to_string(&bead.related_to).unwrap(),
                        serde_json::to_string(&bead.tags).unwrap(),
                        serde_json::to_string(&bead.context).unwrap(),
                        rfc3339(&bead.created_at),
                        rfc3339(&bead.updated_at),
                        bead.closed_at.as_ref().map(rfc3339),
                        bead.decision.as_ref().map(|d| serde_json::to_string(d).unwrap()),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Bead>, BeadStoreError> {
        let id = id.to_string();
        let bead = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!("{SELECT_BEAD_FIELDS_SQL} WHERE id = ?1"))?;
                let mut rows = stmt.query(rusqlite::params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_bead(row)?)),
                    None => Ok(None),
                }
            })
            .await?;
        Ok(bead)
    }

    pub async fn list(&self, filter: BeadFilter) -> Result<Vec<Bead>, BeadStoreError> {
        let all = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!("{SELECT_BEAD_FIELDS_SQL} ORDER BY priority ASC, created_at ASC"))?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_bead(row)?);
                }
                Ok(out)
            })
            .await?;

        Ok(all
            .into_iter()
            .filter(|b| filter.project_id.as_deref().map_or(true, |p| b.project_id == p))
            .filter(|b| filter.status.map_or(true, |s| b.status == s))
            .filter(|b| filter.bead_type.map_or(true, |t| b.bead_type == t))
            .filter(|b| filter.priority.map_or(true, |p| b.priority == p))
            .filter(|b| {
                filter
                    .assigned_to
                    .as_ref()
                    .map_or(true, |set| b.assigned_to.as_ref().map_or(false, |a| set.contains(a)))
            })
            .filter(|b| filter.tag.as_ref().map_or(true, |t| b.tags.contains(t)))
            .collect())
    }

    // -----------------------------------------------------------------------
    // update
    // -----------------------------------------------------------------------

    pub async fn update(&self, id: &str, patch: BeadPatch) -> Result<Bead, BeadStoreError> {
        let mut bead = self.get(id).await?.ok_or_else(|| BeadStoreError::NotFound(id.to_string()))?;

        if let Some(title) = patch.title {
            bead.title = title;
        }
        if let Some(description) = patch.description {
            bead.description = description;
        }
        if let Some(priority) = patch.priority {
            bead.priority = priority;
        }
        if let Some(assigned_to) = patch.assigned_to {
            bead.assigned_to = assigned_to;
        }
        if let Some(tags) = patch.tags {
            bead.tags = tags;
        }
        if let Some(context) = patch.context {
            bead.context = context;
        }
        if let Some(decision) = patch.decision {
            bead.decision = Some(decision);
        }
        if let Some(status) = patch.status {
            let was_closed = bead.status == BeadStatus::Closed;
            bead.status = status;
            if status == BeadStatus::Closed {
                bead.closed_at = Some(Utc::now());
                bead.assigned_to = None;
            } else if was_closed {
                bead.closed_at = None;
            }
        }
        bead.updated_at = Utc::now();

        self.upsert(&bead).await?;
        Ok(bead)
    }

    // -----------------------------------------------------------------------
    // claim
    // -----------------------------------------------------------------------

    /// Atomic compare-and-set: `assignedTo` must be empty or already
    /// `agent_id`, set it to `agent_id` and move the bead to `in_progress`.
    /// Fails with `AlreadyClaimed` only when a *different* agent holds it —
    /// the single SQL statement with the `WHERE` guard makes this race-free
    /// regardless of concurrent callers, and lets the current holder
    /// re-claim idempotently (e.g. after a crashed session resumes).
    pub async fn claim(&self, id: &str, agent_id: &str) -> Result<Bead, BeadStoreError> {
        let id_owned = id.to_string();
        let agent_owned = agent_id.to_string();
        let now = rfc3339(&Utc::now());
        let status = enum_to_sql(&BeadStatus::InProgress);

        let updated = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE beads SET assigned_to = ?1, status = ?2, updated_at = ?3
                     WHERE id = ?4 AND (assigned_to IS NULL OR assigned_to = ?1)",
                    rusqlite::params![agent_owned, status, now, id_owned],
                )?;
                Ok(n)
            })
            .await?;

        if updated == 0 {
            return Err(BeadStoreError::AlreadyClaimed(id.to_string()));
        }
        self.get(id).await?.ok_or_else(|| BeadStoreError::NotFound(id.to_string()))
    }

    // -----------------------------------------------------------------------
    // dependency edges
    // -----------------------------------------------------------------------

    /// Update both endpoints under a single transaction. On `Blocks`, if the
    /// child was `in_progress` it moves to `blocked` — an in-flight claim
    /// does not protect a bead from a dependency added after the fact.
    pub async fn add_dependency(&self, child: &str, parent: &str, kind: EdgeKind) -> Result<(), BeadStoreError> {
        let mut child_bead = self.get(child).await?.ok_or_else(|| BeadStoreError::NotFound(child.to_string()))?;
        let mut parent_bead = self.get(parent).await?.ok_or_else(|| BeadStoreError::NotFound(parent.to_string()))?;

        match kind {
            EdgeKind::Blocks => {
                child_bead.blocked_by.insert(parent.to_string());
                parent_bead.blocks.insert(child.to_string());
                if child_bead.status == BeadStatus::InProgress {
                    child_bead.status = BeadStatus::Blocked;
                }
            }
            EdgeKind::Parent => {
                child_bead.parent = Some(parent.to_string());
                parent_bead.children.insert(child.to_string());
            }
            EdgeKind::Related => {
                child_bead.related_to.insert(parent.to_string());
                parent_bead.related_to.insert(child.to_string());
            }
        }
        child_bead.updated_at = Utc::now();
        parent_bead.updated_at = Utc::now();

        let child_id = child.to_string();
        let parent_id = parent.to_string();
        let kind_str = enum_to_sql(&kind);
        self.upsert(&child_bead).await?;
        self.upsert(&parent_bead).await?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO bead_edges (from_id, to_id, kind) VALUES (?1,?2,?3)",
                    rusqlite::params![child_id, parent_id, kind_str],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Remove one blocker; if none remain and the bead was `blocked`, reopen
    /// it to `open`.
    pub async fn unblock(&self, child: &str, blocker: &str) -> Result<Bead, BeadStoreError> {
        let mut child_bead = self.get(child).await?.ok_or_else(|| BeadStoreError::NotFound(child.to_string()))?;
        let mut blocker_bead = self.get(blocker).await?.ok_or_else(|| BeadStoreError::NotFound(blocker.to_string()))?;

        child_bead.blocked_by.remove(blocker);
        blocker_bead.blocks.remove(child);
        if child_bead.blocked_by.is_empty() && child_bead.status == BeadStatus::Blocked {
            child_bead.status = BeadStatus::Open;
        }
        child_bead.updated_at = Utc::now();
        blocker_bead.updated_at = Utc::now();

        self.upsert(&blocker_bead).await?;
        self.upsert(&child_bead).await?;

        let child_id = child.to_string();
        let blocker_id = blocker.to_string();
        let kind_str = enum_to_sql(&EdgeKind::Blocks);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM bead_edges WHERE from_id = ?1 AND to_id = ?2 AND kind = ?3",
                    rusqlite::params![child_id, blocker_id, kind_str],
                )?;
                Ok(())
            })
            .await?;
        Ok(child_bead)
    }

    // -----------------------------------------------------------------------
    // ready set
    // -----------------------------------------------------------------------

    /// `status = open` and every entry in `blockedBy` is closed, ordered
    /// stably by (priority asc, createdAt asc).
    pub async fn ready(&self, project_id: &str) -> Result<Vec<Bead>, BeadStoreError> {
        let candidates = self
            .list(BeadFilter {
                project_id: Some(project_id.to_string()),
                status: Some(BeadStatus::Open),
                ..Default::default()
            })
            .await?;

        let mut out = Vec::new();
        for bead in candidates {
            let mut all_blockers_closed = true;
            for blocker_id in &bead.blocked_by {
                match self.get(blocker_id).await? {
                    Some(b) if b.status == BeadStatus::Closed => {}
                    _ => {
                        all_blockers_closed = false;
                        break;
                    }
                }
            }
            if all_blockers_closed {
                out.push(bead);
            }
        }
        out.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(out)
    }

    pub async fn work_graph(&self, project_id: &str) -> Result<WorkGraph, BeadStoreError> {
        let beads = self
            .list(BeadFilter { project_id: Some(project_id.to_string()), ..Default::default() })
            .await?;
        let ids: HashSet<String> = beads.iter().map(|b| b.id.clone()).collect();

        let edges = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT from_id, to_id, kind FROM bead_edges")?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let from_id: String = row.get(0)?;
                    let to_id: String = row.get(1)?;
                    let kind_str: String = row.get(2)?;
                    out.push(Edge { from: from_id, to: to_id, kind: enum_from_sql(&kind_str) });
                }
                Ok(out)
            })
            .await?
            .into_iter()
            .filter(|e| ids.contains(&e.from) && ids.contains(&e.to))
            .collect();

        Ok(WorkGraph {
            beads: beads.into_iter().map(|b| (b.id.clone(), b)).collect(),
            edges,
            computed_at: Utc::now(),
        })
    }
}

const SELECT_BEAD_FIELDS_SQL: &str = "SELECT id, project_id, title, description, bead_type, priority,
            status, assigned_to, parent, children, blocked_by, blocks, related_to,
            tags, context, created_at, updated_at, closed_at, decision FROM beads";

fn row_to_bead(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bead> {
    let bead_type_str: String = row.get(4)?;
    let status_str: String = row.get(6)?;
    let children_str: String = row.get(9)?;
    let blocked_by_str: String = row.get(10)?;
    let blocks_str: String = row.get(11)?;
    let related_to_str: String = row.get(12)?;
    let tags_str: String = row.get(13)?;
    let context_str: String = row.get(14)?;
    let created_at_str: String = row.get(15)?;
    let updated_at_str: String = row.get(16)?;
    let closed_at_str: Option<String> = row.get(17)?;
    let decision_str: Option<String> = row.get(18)?;

    Ok(Bead {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        bead_type: enum_from_sql(&bead_type_str),
        priority: row.get(5)?,
        status: enum_from_sql(&status_str),
        assigned_to: row.get(7)?,
        parent: row.get(8)?,
        children: serde_json::from_str(&children_str).unwrap_or_default(),
        blocked_by: serde_json::from_str(&blocked_by_str).unwrap_or_default(),
        blocks: serde_json::from_str(&blocks_str).unwrap_or_default(),
        related_to: serde_json::from_str(&related_to_str).unwrap_or_default(),
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        context: serde_json::from_str(&context_str).unwrap_or_default(),
        created_at: parse_rfc3339(&created_at_str),
        updated_at: parse_rfc3339(&updated_at_str),
        closed_at: closed_at_str.map(|s| parse_rfc3339(&s)),
        decision: decision_str.map(|s| serde_json::from_str(&s).expect("valid decision json")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> BeadStore {
        BeadStore::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn create_allocates_sequential_ids_per_project() {
        let s = store().await;
        let a = s.create("proj", "bf", "first".into(), BeadType::Task).await.unwrap();
        let b = s.create("proj", "bf", "second".into(), BeadType::Task).await.unwrap();
        assert_eq!(a, "bf-1");
        assert_eq!(b, "bf-2");
    }

    #[tokio::test]
    async fn claim_is_compare_and_set() {
        let s = store().await;
        let id = s.create("proj", "bf", "task".into(), BeadType::Task).await.unwrap();
        s.claim(&id, "agent-1").await.unwrap();
        let err = s.claim(&id, "agent-2").await.unwrap_err();
        assert!(matches!(err, BeadStoreError::AlreadyClaimed(_)));
    }

    #[tokio::test]
    async fn claim_by_the_current_holder_is_idempotent() {
        let s = store().await;
        let id = s.create("proj", "bf", "task".into(), BeadType::Task).await.unwrap();
        s.claim(&id, "agent-1").await.unwrap();
        let bead = s.claim(&id, "agent-1").await.unwrap();
        assert_eq!(bead.assigned_to.as_deref(), Some("agent-1"));
        assert_eq!(bead.status, BeadStatus::InProgress);
    }

    #[tokio::test]
    async fn add_dependency_blocks_in_progress_child() {
        let s = store().await;
        let child = s.create("proj", "bf", "child".into(), BeadType::Task).await.unwrap();
        let parent = s.create("proj", "bf", "parent".into(), BeadType::Task).await.unwrap();
        s.claim(&child, "agent-1").await.unwrap();
        s.add_dependency(&child, &parent, EdgeKind::Blocks).await.unwrap();
        let c = s.get(&child).await.unwrap().unwrap();
        assert_eq!(c.status, BeadStatus::Blocked);
        assert!(c.blocked_by.contains(&parent));
    }

    #[tokio::test]
    async fn unblock_reopens_once_all_blockers_clear() {
        let s = store().await;
        let child = s.create("proj", "bf", "child".into(), BeadType::Task).await.unwrap();
        let parent = s.create("proj", "bf", "parent".into(), BeadType::Task).await.unwrap();
        s.add_dependency(&child, &parent, EdgeKind::Blocks).await.unwrap();
        s.update(&child, BeadPatch { status: Some(BeadStatus::Blocked), ..Default::default() }).await.unwrap();
        let c = s.unblock(&child, &parent).await.unwrap();
        assert_eq!(c.status, BeadStatus::Open);
        assert!(c.blocked_by.is_empty());
    }

    #[tokio::test]
    async fn ready_excludes_beads_with_open_blockers() {
        let s = store().await;
        let child = s.create("proj", "bf", "child".into(), BeadType::Task).await.unwrap();
        let parent = s.create("proj", "bf", "parent".into(), BeadType::Task).await.unwrap();
        s.add_dependency(&child, &parent, EdgeKind::Blocks).await.unwrap();

        let ready = s.ready("proj").await.unwrap();
        assert!(ready.iter().all(|b| b.id != child));
        assert!(ready.iter().any(|b| b.id == parent));

        s.update(&parent, BeadPatch { status: Some(BeadStatus::Closed), ..Default::default() }).await.unwrap();
        let ready = s.ready("proj").await.unwrap();
        assert!(ready.iter().any(|b| b.id == child));
    }

    #[tokio::test]
    async fn closing_a_bead_clears_assignment_and_stamps_closed_at() {
        let s = store().await;
        let id = s.create("proj", "bf", "task".into(), BeadType::Task).await.unwrap();
        s.claim(&id, "agent-1").await.unwrap();
        let closed = s.update(&id, BeadPatch { status: Some(BeadStatus::Closed), ..Default::default() }).await.unwrap();
        assert!(closed.assigned_to.is_none());
        assert!(closed.closed_at.is_some());
    }

    #[tokio::test]
    async fn work_graph_includes_edges_among_listed_beads() {
        let s = store().await;
        let child = s.create("proj", "bf", "child".into(), BeadType::Task).await.unwrap();
        let parent = s.create("proj", "bf", "parent".into(), BeadType::Task).await.unwrap();
        s.add_dependency(&child, &parent, EdgeKind::Blocks).await.unwrap();
        let graph = s.work_graph("proj").await.unwrap();
        assert_eq!(graph.beads.len(), 2);
        assert_eq!(graph.edges.len(), 1);
    }
}
