//! Opens the sqlite-backed stores every subcommand needs. Grounded in
//! `at-cli::commands::status::run`'s load-config/open-db shape, widened
//! from one cache handle to the full set of stores this crate exposes.

use std::sync::Arc;

use bf_core::bead_store::BeadStore;
use bf_core::config::Config;
use bf_core::lessons::LessonsJournal;
use bf_core::lock_manager::LockManager;
use bf_core::project_memory::ProjectMemoryStore;

use crate::paths;

pub struct AppContext {
    pub config: Config,
    pub store: Arc<BeadStore>,
    pub locks: Arc<LockManager>,
    pub lessons: Arc<LessonsJournal>,
    pub memory: Arc<ProjectMemoryStore>,
}

impl AppContext {
    pub async fn open() -> anyhow::Result<Self> {
        let config = Config::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            Config::default()
        });

        let dir = paths::ensure_data_dir()?;
        let store = BeadStore::open(paths::beads_db(&dir)).await?;
        let locks = LockManager::open(paths::locks_db(&dir), chrono::Duration::seconds(config.locks.default_ttl_secs as i64)).await?;
        let lessons = LessonsJournal::open(paths::lessons_db(&dir)).await?;
        let memory = ProjectMemoryStore::open(paths::memory_db(&dir)).await?;

        Ok(Self {
            config,
            store: Arc::new(store),
            locks: Arc::new(locks),
            lessons: Arc::new(lessons),
            memory: Arc::new(memory),
        })
    }
}
