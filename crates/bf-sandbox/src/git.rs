//! Git adapter: git2 for reads, shell-out for writes — the teacher's own
//! reasoning (no process-spawn overhead for hot-path queries; libgit2 commit
//! creation is finicky to get byte-identical to the CLI's behavior around
//! hooks and signing) applies just as well here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use std::sync::OnceLock;

use crate::process::{ProcessExecutor, ProcessOutcome};
use crate::secrets;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git2: {0}")]
    Git2(#[from] git2::Error),
    #[error("process: {0}")]
    Process(#[from] crate::process::ProcessError),
    #[error("not a git repository: {0}")]
    NotARepo(String),
    #[error("protected branch: {0}")]
    ProtectedBranch(String),
    #[error("invalid branch name: {0}")]
    InvalidBranch(String),
    #[error("missing commit attribution")]
    MissingAttribution,
    #[error("secret detected in diff")]
    SecretDetected,
    #[error("command failed: {0}")]
    CommandFailed(String),
}

const PROTECTED_BRANCHES: &[&str] = &["main", "master", "production"];

fn is_protected(branch: &str) -> bool {
    PROTECTED_BRANCHES.contains(&branch) || branch.starts_with("release/") || branch.starts_with("hotfix/")
}

fn branch_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^agent/[^/]+/[a-z0-9]+(-[a-z0-9]+)*$").unwrap())
}

/// `agent/<beadId>/<kebab-slug>`, slug capped at 72 characters.
pub fn agent_branch_name(bead_id: &str, title: &str) -> String {
    let slug = slugify(title, 72);
    format!("agent/{bead_id}/{slug}")
}

pub fn slugify(title: &str, max_len: usize) -> String {
    let mut slug = String::new();
    let mut last_was_dash = true;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = slug.trim_end_matches('-');
    let truncated: String = trimmed.chars().take(max_len).collect();
    truncated.trim_end_matches('-').to_string()
}

pub fn validate_branch_name(branch: &str) -> Result<(), GitError> {
    if is_protected(branch) {
        return Err(GitError::ProtectedBranch(branch.to_string()));
    }
    if !branch_pattern().is_match(branch) {
        return Err(GitError::InvalidBranch(branch.to_string()));
    }
    Ok(())
}

/// A commit message must contain a line matching `^Bead: ` and a line
/// matching either `^Agent: ` or `^Co-Authored-By: `.
pub fn validate_commit_message(message: &str) -> Result<(), GitError> {
    let has_bead = message.lines().any(|l| l.starts_with("Bead: "));
    let has_agent = message.lines().any(|l| l.starts_with("Agent: ") || l.starts_with("Co-Authored-By: "));
    if has_bead && has_agent {
        Ok(())
    } else {
        Err(GitError::MissingAttribution)
    }
}

pub struct GitSandbox {
    workdir: PathBuf,
    ssh_command: Option<String>,
}

impl GitSandbox {
    pub fn new(workdir: impl Into<PathBuf>, ssh_command: Option<String>) -> Self {
        Self { workdir: workdir.into(), ssh_command }
    }

    fn executor(&self) -> ProcessExecutor {
        let mut exec = ProcessExecutor::new(&self.workdir);
        if let Some(cmd) = &self.ssh_command {
            exec = exec.with_env("GIT_SSH_COMMAND", cmd.clone());
        }
        exec
    }

    fn open(&self) -> Result<git2::Repository, GitError> {
        git2::Repository::discover(&self.workdir).map_err(|_| GitError::NotARepo(self.workdir.display().to_string()))
    }

    // -- reads (git2) --------------------------------------------------

    pub fn current_branch(&self) -> Result<String, GitError> {
        let repo = self.open()?;
        let head = repo.head()?;
        if head.is_branch() {
            Ok(head.shorthand().unwrap_or("HEAD").to_string())
        } else {
            let oid = head.target().ok_or_else(|| GitError::CommandFailed("HEAD has no target".into()))?;
            Ok(format!("{oid:.7}"))
        }
    }

    pub fn status_paths(&self) -> Result<Vec<String>, GitError> {
        let repo = self.open()?;
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = repo.statuses(Some(&mut opts))?;
        Ok(statuses.iter().filter_map(|e| e.path().map(str::to_string)).collect())
    }

    pub fn list_branches(&self) -> Result<Vec<String>, GitError> {
        let repo = self.open()?;
        let branches = repo.branches(Some(git2::BranchType::Local))?;
        let mut out = Vec::new();
        for branch in branches {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                out.push(name.to_string());
            }
        }
        Ok(out)
    }

    // -- writes (shell-out) ---------------------------------------------

    pub async fn checkout_new_branch(&self, branch: &str) -> Result<ProcessOutcome, GitError> {
        validate_branch_name(branch)?;
        Ok(self.executor().run("git", &["checkout".into(), "-b".into(), branch.into()], Duration::from_secs(30)).await?)
    }

    pub async fn add(&self, paths: &[String]) -> Result<ProcessOutcome, GitError> {
        let mut args = vec!["add".to_string()];
        args.extend(paths.iter().cloned());
        Ok(self.executor().run("git", &args, Duration::from_secs(30)).await?)
    }

    pub async fn diff_cached(&self) -> Result<String, GitError> {
        let out = self.executor().run("git", &["diff".into(), "--cached".into()], Duration::from_secs(30)).await?;
        Ok(out.stdout)
    }

    /// Secret-scan the staged diff and validate attribution before shelling
    /// out to `git commit`. Either check failing aborts before the commit
    /// is created.
    pub async fn commit(&self, message: &str) -> Result<ProcessOutcome, GitError> {
        let branch = self.current_branch()?;
        if is_protected(&branch) {
            return Err(GitError::ProtectedBranch(branch));
        }
        validate_commit_message(message)?;

        let diff = self.diff_cached().await?;
        if secrets::contains_secret(&diff) {
            return Err(GitError::SecretDetected);
        }

        let outcome = self.executor().run("git", &["commit".into(), "-m".into(), message.into()], Duration::from_secs(30)).await?;
        if !outcome.success() {
            return Err(GitError::CommandFailed(outcome.stderr));
        }
        Ok(outcome)
    }

    pub async fn push(&self, remote: &str, branch: &str) -> Result<ProcessOutcome, GitError> {
        validate_branch_name(branch)?;
        let outcome = self
            .executor()
            .run("git", &["push".into(), remote.into(), branch.into()], Duration::from_secs(60))
            .await?;
        if !outcome.success() {
            return Err(GitError::CommandFailed(outcome.stderr));
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_dashes() {
        assert_eq!(slugify("Fix the Login Bug!!", 72), "fix-the-login-bug");
    }

    #[test]
    fn slugify_truncates_to_max_len() {
        let long = "a ".repeat(100);
        let slug = slugify(&long, 10);
        assert!(slug.len() <= 10);
    }

    #[test]
    fn agent_branch_name_matches_the_expected_pattern() {
        let branch = agent_branch_name("bf-12", "Fix login bug");
        assert_eq!(branch, "agent/bf-12/fix-login-bug");
        assert!(validate_branch_name(&branch).is_ok());
    }

    #[test]
    fn protected_branches_are_rejected() {
        for name in ["main", "master", "production", "release/1.0", "hotfix/urgent"] {
            assert!(matches!(validate_branch_name(name), Err(GitError::ProtectedBranch(_))));
        }
    }

    #[test]
    fn commit_message_requires_bead_and_agent_lines() {
        assert!(validate_commit_message("fix bug\n\nBead: bf-1\nAgent: agent-1").is_ok());
        assert!(validate_commit_message("fix bug\n\nBead: bf-1\nCo-Authored-By: agent-1 <a@x>").is_ok());
        assert!(matches!(validate_commit_message("fix bug"), Err(GitError::MissingAttribution)));
        assert!(matches!(validate_commit_message("Bead: bf-1"), Err(GitError::MissingAttribution)));
    }
}
