//! Shared SQLite setup used by every store in this crate. Each store opens
//! its own `tokio_rusqlite::Connection` (bead store, lock manager, lessons,
//! project memory each own their state exclusively) but all of them apply
//! the same PRAGMAs and the same enum<->string convention.

use std::path::Path;

use tokio_rusqlite::Connection;

pub async fn open(path: impl AsRef<Path>) -> Result<Connection, tokio_rusqlite::Error> {
    let conn = Connection::open(path.as_ref()).await?;
    apply_pragmas(&conn).await?;
    Ok(conn)
}

pub async fn open_in_memory() -> Result<Connection, tokio_rusqlite::Error> {
    let conn = Connection::open_in_memory().await?;
    apply_pragmas(&conn).await?;
    Ok(conn)
}

async fn apply_pragmas(conn: &Connection) -> Result<(), tokio_rusqlite::Error> {
    conn.call(|conn| {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA cache_size=-64000;
            PRAGMA mmap_size=268435456;
            PRAGMA temp_store=MEMORY;
            PRAGMA busy_timeout=5000;
            ",
        )?;
        Ok(())
    })
    .await
}

/// Serialize an enum to the bare string SQLite stores it as (no surrounding
/// quotes from the JSON round-trip).
pub fn enum_to_sql<T: serde::Serialize>(val: &T) -> String {
    let s = serde_json::to_string(val).expect("serialize enum");
    s.trim_matches('"').to_string()
}

pub fn enum_from_sql<T: serde::de::DeserializeOwned>(raw: &str) -> T {
    let quoted = format!("\"{raw}\"");
    serde_json::from_str(&quoted).expect("deserialize enum")
}

pub fn rfc3339(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339()
}

pub fn parse_rfc3339(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .expect("valid date")
        .with_timezone(&chrono::Utc)
}
