//! Resolves where `beadctl`'s sqlite files live. A thin, CLI-local concern:
//! `bf_core::config::Config` carries operational knobs, not storage paths,
//! so the data directory is resolved here the same way `at-daemon`'s own
//! `main` resolves its `~/.auto-tundra` directory.

use std::path::PathBuf;

const DATA_DIR_ENV: &str = "BEADFORGE_DATA_DIR";

pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".beadforge")
        .join("data")
}

pub fn ensure_data_dir() -> anyhow::Result<PathBuf> {
    let dir = data_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn beads_db(dir: &std::path::Path) -> PathBuf {
    dir.join("beads.db")
}

pub fn locks_db(dir: &std::path::Path) -> PathBuf {
    dir.join("locks.db")
}

pub fn lessons_db(dir: &std::path::Path) -> PathBuf {
    dir.join("lessons.db")
}

pub fn memory_db(dir: &std::path::Path) -> PathBuf {
    dir.join("memory.db")
}
