//! `beadctl` — a small binary wrapping the core engine for local
//! operation: create/show/list beads, the ready set, worker and workflow
//! state, locks, lessons, and KPIs, plus an in-process dispatcher loop.
//! Grounded in `at-cli::main`'s clap `Parser`/`Subcommand` shape, adapted
//! from an HTTP client (talking to `at-daemon`) to direct calls against the
//! local sqlite-backed stores: this binary opens no sockets.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod context;
mod paths;
mod personas;

use clap::{Parser, Subcommand};

use bf_core::types::{BeadStatus, BeadType, LessonCategory};
use context::AppContext;

#[derive(Parser)]
#[command(name = "beadctl", version, about)]
struct Cli {
    /// Output machine-readable JSON instead of plain text.
    #[arg(short = 'j', long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bead operations.
    Bead {
        #[command(subcommand)]
        command: BeadCommands,
    },
    /// Show the ready set for a project.
    Ready {
        /// Project id.
        project_id: String,
    },
    /// Worker status (derived from currently assigned beads).
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },
    /// File lock operations.
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },
    /// Lessons journal operations.
    Lessons {
        #[command(subcommand)]
        command: LessonsCommands,
    },
    /// Workflow execution state.
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommands,
    },
    /// Per-project key/value memory.
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },
    /// KPI snapshot.
    Kpi {
        #[command(subcommand)]
        command: KpiCommands,
    },
    /// Run the dispatcher loop in-process for one project until Ctrl-C.
    Run {
        /// Project id.
        #[arg(long)]
        project_id: String,
        /// Project display name.
        #[arg(long)]
        project_name: String,
        /// Bead id prefix for this project.
        #[arg(long, default_value = "bf")]
        prefix: String,
        /// Repository root on disk.
        #[arg(long, default_value = ".")]
        repo_root: String,
        /// Maximum beads worked concurrently for this project.
        #[arg(long, default_value_t = 4)]
        concurrency_cap: u32,
        /// Number of workers to spawn across the seeded personas.
        #[arg(long, default_value_t = 4)]
        worker_count: u32,
    },
}

#[derive(Subcommand)]
enum BeadCommands {
    /// Create a new bead.
    Create {
        /// Project id.
        #[arg(long)]
        project_id: String,
        /// Bead id prefix for this project.
        #[arg(long, default_value = "bf")]
        prefix: String,
        /// Bead title.
        title: String,
        /// Bead type.
        #[arg(long, value_enum, default_value = "task")]
        bead_type: BeadTypeArg,
        /// Tags (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Priority, 0 (highest) through 3 (lowest).
        #[arg(long)]
        priority: Option<u8>,
    },
    /// Show a single bead.
    Show {
        /// Bead id.
        id: String,
    },
    /// List beads, optionally filtered.
    List {
        /// Project id.
        #[arg(long)]
        project_id: Option<String>,
        /// Status filter.
        #[arg(long, value_enum)]
        status: Option<BeadStatusArg>,
        /// Tag filter.
        #[arg(long)]
        tag: Option<String>,
    },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// List currently assigned workers.
    List {
        /// Project id.
        #[arg(long)]
        project_id: Option<String>,
    },
}

#[derive(Subcommand)]
enum LockCommands {
    /// List locks held for a project.
    List {
        /// Project id.
        project_id: String,
    },
}

#[derive(Subcommand)]
enum LessonsCommands {
    /// Show the tail of the lessons journal.
    Tail {
        /// Maximum characters to print.
        #[arg(long, default_value_t = 4000)]
        max_chars: usize,
    },
    /// Record a manual lesson.
    Record {
        /// Lesson category.
        #[arg(long, value_enum)]
        category: LessonCategoryArg,
        /// Short title.
        title: String,
        /// Full detail.
        detail: String,
        /// Related bead id.
        #[arg(long)]
        bead_id: Option<String>,
    },
}

#[derive(Subcommand)]
enum WorkflowCommands {
    /// Show recorded workflow state for a bead.
    Show {
        /// Bead id.
        bead_id: String,
    },
}

#[derive(Subcommand)]
enum MemoryCommands {
    /// Set a memory entry.
    Set {
        /// Project id.
        #[arg(long)]
        project_id: String,
        /// Category.
        category: String,
        /// Key.
        key: String,
        /// Value.
        value: String,
        /// Confidence, 0.0 through 1.0.
        #[arg(long, default_value_t = 1.0)]
        confidence: f64,
    },
    /// Get a single memory entry.
    Get {
        /// Project id.
        #[arg(long)]
        project_id: String,
        /// Category.
        category: String,
        /// Key.
        key: String,
    },
    /// List entries in a category.
    List {
        /// Project id.
        #[arg(long)]
        project_id: String,
        /// Category.
        category: String,
    },
}

#[derive(Subcommand)]
enum KpiCommands {
    /// Show a project's KPI snapshot.
    Show {
        /// Project id.
        project_id: String,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum BeadTypeArg {
    Epic,
    Feature,
    Task,
    Bug,
    Decision,
    Chore,
}

impl From<BeadTypeArg> for BeadType {
    fn from(arg: BeadTypeArg) -> Self {
        match arg {
            BeadTypeArg::Epic => BeadType::Epic,
            BeadTypeArg::Feature => BeadType::Feature,
            BeadTypeArg::Task => BeadType::Task,
            BeadTypeArg::Bug => BeadType::Bug,
            BeadTypeArg::Decision => BeadType::Decision,
            BeadTypeArg::Chore => BeadType::Chore,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum BeadStatusArg {
    Open,
    InProgress,
    Blocked,
    Closed,
}

impl From<BeadStatusArg> for BeadStatus {
    fn from(arg: BeadStatusArg) -> Self {
        match arg {
            BeadStatusArg::Open => BeadStatus::Open,
            BeadStatusArg::InProgress => BeadStatus::InProgress,
            BeadStatusArg::Blocked => BeadStatus::Blocked,
            BeadStatusArg::Closed => BeadStatus::Closed,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum LessonCategoryArg {
    BuildFailure,
    EditFailure,
    TestFailure,
    ReviewFeedback,
    General,
}

impl From<LessonCategoryArg> for LessonCategory {
    fn from(arg: LessonCategoryArg) -> Self {
        match arg {
            LessonCategoryArg::BuildFailure => LessonCategory::BuildFailure,
            LessonCategoryArg::EditFailure => LessonCategory::EditFailure,
            LessonCategoryArg::TestFailure => LessonCategory::TestFailure,
            LessonCategoryArg::ReviewFeedback => LessonCategory::ReviewFeedback,
            LessonCategoryArg::General => LessonCategory::General,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bf_telemetry::logging::init_logging("beadctl", "info");

    let cli = Cli::parse();
    let ctx = AppContext::open().await?;

    match cli.command {
        Commands::Bead { command } => match command {
            BeadCommands::Create { project_id, prefix, title, bead_type, tags, priority } => {
                commands::bead::create(&ctx, &project_id, &prefix, title, bead_type.into(), tags, priority, cli.json).await?;
            }
            BeadCommands::Show { id } => {
                commands::bead::show(&ctx, &id, cli.json).await?;
            }
            BeadCommands::List { project_id, status, tag } => {
                commands::bead::list(&ctx, project_id, status.map(Into::into), tag, cli.json).await?;
            }
        },
        Commands::Ready { project_id } => {
            commands::ready::run(&ctx, &project_id, cli.json).await?;
        }
        Commands::Worker { command } => match command {
            WorkerCommands::List { project_id } => {
                commands::workers::list(&ctx, project_id, cli.json).await?;
            }
        },
        Commands::Lock { command } => match command {
            LockCommands::List { project_id } => {
                commands::locks::list(&ctx, &project_id, cli.json).await?;
            }
        },
        Commands::Lessons { command } => match command {
            LessonsCommands::Tail { max_chars } => {
                commands::lessons::tail(&ctx, max_chars, cli.json).await?;
            }
            LessonsCommands::Record { category, title, detail, bead_id } => {
                commands::lessons::record(&ctx, category.into(), title, detail, bead_id).await?;
            }
        },
        Commands::Workflow { command } => match command {
            WorkflowCommands::Show { bead_id } => {
                commands::workflow::show(&ctx, &bead_id, cli.json).await?;
            }
        },
        Commands::Memory { command } => match command {
            MemoryCommands::Set { project_id, category, key, value, confidence } => {
                commands::memory::set(&ctx, &project_id, &category, &key, &value, confidence).await?;
            }
            MemoryCommands::Get { project_id, category, key } => {
                commands::memory::get(&ctx, &project_id, &category, &key, cli.json).await?;
            }
            MemoryCommands::List { project_id, category } => {
                commands::memory::list(&ctx, &project_id, &category, cli.json).await?;
            }
        },
        Commands::Kpi { command } => match command {
            KpiCommands::Show { project_id } => {
                commands::kpi::show(&ctx, &project_id, cli.json).await?;
            }
        },
        Commands::Run { project_id, project_name, prefix, repo_root, concurrency_cap, worker_count } => {
            commands::run::run(
                &ctx,
                commands::run::RunOptions { project_id, project_name, prefix, repo_root, concurrency_cap, worker_count },
            )
            .await?;
        }
    }

    Ok(())
}
