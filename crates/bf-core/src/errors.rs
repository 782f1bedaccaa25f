/// Errors shared by the stores in this crate. Each store also exposes
/// narrower variants where the distinction matters to callers (see
/// `bead_store::BeadStoreError`, `lock_manager::LockError`).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
}
