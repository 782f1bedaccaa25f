//! One sandbox per project: a filesystem root, a git worktree rooted there,
//! and a command executor with an enforced environment. Every adapter call
//! is auditable.

pub mod audit;
pub mod fs;
pub mod git;
pub mod process;
pub mod secrets;
pub mod ssh;

pub use fs::{FsError, SandboxFs};
pub use git::{GitError, GitSandbox};
pub use process::{ProcessExecutor, ProcessOutcome};
