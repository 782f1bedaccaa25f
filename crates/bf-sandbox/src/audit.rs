//! Structured audit record appended to a per-project log for every sandbox
//! adapter call, whether it succeeded or not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub operation: String,
    pub bead_id: String,
    pub project_id: String,
    pub git_ref: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

pub struct AuditLog {
    path: std::path::PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn append(&self, record: AuditRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let line = serde_json::to_string(&record).expect("audit record is always serializable");
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.log"));
        log.append(AuditRecord {
            operation: "git_commit".into(),
            bead_id: "bf-1".into(),
            project_id: "proj".into(),
            git_ref: Some("agent/bf-1/fix-bug".into()),
            success: true,
            duration_ms: 12,
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

        let contents = tokio::fs::read_to_string(dir.path().join("audit.log")).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("git_commit"));
    }
}
