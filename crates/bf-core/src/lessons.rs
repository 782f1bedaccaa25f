//! Append-only lessons journal, rendered as markdown for prompt injection.
//! `category_shortcuts` gives the two callers named in the contract
//! (`build_failure`, `edit_failure`) a one-line way to record the common
//! case without hand-assembling a detail string.

use std::path::Path;

use chrono::Utc;
use tokio_rusqlite::Connection;

use crate::store::{self, enum_from_sql, enum_to_sql, parse_rfc3339, rfc3339};
use crate::types::LessonEntry;
pub use crate::types::LessonCategory;

#[derive(Debug, thiserror::Error)]
pub enum LessonsError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
}

pub struct LessonsJournal {
    conn: Connection,
}

impl LessonsJournal {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LessonsError> {
        let conn = store::open(path).await?;
        let j = Self { conn };
        j.init_schema().await?;
        Ok(j)
    }

    pub async fn open_in_memory() -> Result<Self, LessonsError> {
        let conn = store::open_in_memory().await?;
        let j = Self { conn };
        j.init_schema().await?;
        Ok(j)
    }

    async fn init_schema(&self) -> Result<(), LessonsError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    CREATE TABLE IF NOT EXISTS lessons (
                        id        INTEGER PRIMARY KEY AUTOINCREMENT,
                        category  TEXT NOT NULL,
                        title     TEXT NOT NULL,
                        detail    TEXT NOT NULL,
                        bead_id   TEXT,
                        agent_id  TEXT,
                        timestamp TEXT NOT NULL
                    );
                    ",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn record_lesson(
        &self,
        category: LessonCategory,
        title: impl Into<String>,
        detail: impl Into<String>,
        bead_id: Option<String>,
        agent_id: Option<String>,
    ) -> Result<(), LessonsError> {
        let category_str = enum_to_sql(&category);
        let title = title.into();
        let detail = detail.into();
        let timestamp = rfc3339(&Utc::now());

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO lessons (category, title, detail, bead_id, agent_id, timestamp)
                     VALUES (?1,?2,?3,?4,?5,?6)",
                    rusqlite::params![category_str, title, detail, bead_id, agent_id, timestamp],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// `build_failure`: extracts the top 3 lines mentioning "error",
    /// "undefined", or "cannot" from raw build/test output.
    pub async fn record_build_failure(&self, raw_output: &str, bead_id: Option<String>, agent_id: Option<String>) -> Result<(), LessonsError> {
        let lines: Vec<&str> = raw_output
            .lines()
            .filter(|l| {
                let lower = l.to_lowercase();
                lower.contains("error") || lower.contains("undefined") || lower.contains("cannot")
            })
            .take(3)
            .collect();
        let detail = if lines.is_empty() {
            "build failed with no recognizable error lines".to_string()
        } else {
            lines.join("\n")
        };
        self.record_lesson(LessonCategory::BuildFailure, "build failed", detail, bead_id, agent_id).await
    }

    /// `edit_failure`: fixed reminder — always read the file before editing.
    pub async fn record_edit_failure(&self, detail: impl Into<String>, bead_id: Option<String>, agent_id: Option<String>) -> Result<(), LessonsError> {
        self.record_lesson(
            LessonCategory::EditFailure,
            "edit failed",
            format!("always read the file first. {}", detail.into()),
            bead_id,
            agent_id,
        )
        .await
    }

    pub async fn all(&self) -> Result<Vec<LessonEntry>, LessonsError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT category, title, detail, bead_id, agent_id, timestamp FROM lessons ORDER BY id ASC",
                )?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let category_str: String = row.get(0)?;
                    out.push(LessonEntry {
                        category: enum_from_sql(&category_str),
                        title: row.get(1)?,
                        detail: row.get(2)?,
                        bead_id: row.get(3)?,
                        agent_id: row.get(4)?,
                        timestamp: parse_rfc3339(&row.get::<_, String>(5)?),
                    });
                }
                Ok(out)
            })
            .await?;
        Ok(rows)
    }

    /// Renders the whole journal as markdown, then returns at most the last
    /// `max_chars` characters with a leading ellipsis marker if truncated —
    /// this is what gets tail-injected into a worker's system prompt.
    pub async fn get_lessons_for_prompt(&self, max_chars: usize) -> Result<String, LessonsError> {
        let entries = self.all().await?;
        let mut markdown = String::new();
        for entry in &entries {
            markdown.push_str(&format!(
                "## {} — {}\n{}\n\n",
                entry.category,
                entry.title,
                entry.detail
            ));
        }

        if markdown.len() <= max_chars {
            return Ok(markdown);
        }

        // The marker itself counts against the cap — property 10 ("never
        // returns more than max_chars") must hold on the final string, not
        // just the sliced content.
        const MARKER: &str = "...(truncated)...\n";
        if max_chars <= MARKER.len() {
            let mut start = markdown.len().saturating_sub(max_chars);
            while !markdown.is_char_boundary(start) {
                start += 1;
            }
            return Ok(markdown[start..].to_string());
        }

        let budget = max_chars - MARKER.len();
        let mut start = markdown.len() - budget;
        while !markdown.is_char_boundary(start) {
            start += 1;
        }
        Ok(format!("{MARKER}{}", &markdown[start..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_and_read_back_a_lesson() {
        let j = LessonsJournal::open_in_memory().await.unwrap();
        j.record_lesson(LessonCategory::General, "title", "detail", None, None).await.unwrap();
        let all = j.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "title");
    }

    #[tokio::test]
    async fn build_failure_extracts_top_three_error_lines() {
        let j = LessonsJournal::open_in_memory().await.unwrap();
        let output = "compiling...\nerror: missing semicolon\nundefined reference to foo\ncannot find type Bar\nwarning: unused import\nerror: second";
        j.record_build_failure(output, None, None).await.unwrap();
        let all = j.all().await.unwrap();
        let lines: Vec<&str> = all[0].detail.lines().collect();
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn prompt_tail_is_truncated_with_ellipsis_marker() {
        let j = LessonsJournal::open_in_memory().await.unwrap();
        for i in 0..50 {
            j.record_lesson(LessonCategory::General, format!("t{i}"), "x".repeat(50), None, None).await.unwrap();
        }
        let tail = j.get_lessons_for_prompt(200).await.unwrap();
        assert!(tail.starts_with("...(truncated)..."));
        assert!(tail.len() <= 200, "marker must be reserved within max_chars, got {} chars", tail.len());
    }

    #[tokio::test]
    async fn prompt_tail_never_exceeds_max_chars_even_when_smaller_than_marker() {
        let j = LessonsJournal::open_in_memory().await.unwrap();
        for i in 0..10 {
            j.record_lesson(LessonCategory::General, format!("t{i}"), "x".repeat(50), None, None).await.unwrap();
        }
        for cap in [0, 1, 5, 10, 18, 19, 20] {
            let tail = j.get_lessons_for_prompt(cap).await.unwrap();
            assert!(tail.len() <= cap, "cap {cap} violated with {} chars", tail.len());
        }
    }

    #[tokio::test]
    async fn edit_failure_always_includes_fixed_reminder() {
        let j = LessonsJournal::open_in_memory().await.unwrap();
        j.record_edit_failure("matched the wrong block", None, None).await.unwrap();
        let all = j.all().await.unwrap();
        assert!(all[0].detail.starts_with("always read the file first."));
    }
}
