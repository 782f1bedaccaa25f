//! Cancellable, timeout-bounded subprocess execution for `run_command`,
//! `build_project`, and `run_tests` actions. Mirrors the spawn/wait/cancel
//! shape used for git writes, generalized to arbitrary commands.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub struct ProcessExecutor {
    pub workdir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl ProcessExecutor {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self { workdir: workdir.into(), env: Vec::new() }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run `program args...` under `timeout`, killing the whole process
    /// group on expiry so shell pipelines don't leak children (§4.A:
    /// "timeout kills process group"). The child is made its own process
    /// group leader via `setsid` at spawn time so `killpg` only ever
    /// reaches this command's descendants, never the executor's own group.
    pub async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<ProcessOutcome, ProcessError> {
        let start = std::time::Instant::now();

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir).kill_on_drop(true);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn()?;
        let pid = child.id();

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                #[cfg(unix)]
                if let Some(pid) = pid {
                    // SIGKILL the whole group; `kill_on_drop` alone only
                    // reaches the direct child, leaving any grandchildren
                    // a shell command spawned (e.g. a backgrounded build
                    // step) running past the deadline.
                    unsafe {
                        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
                    }
                }
                return Err(ProcessError::TimedOut(timeout));
            }
        };

        Ok(ProcessOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// What kind of project this repo looks like, used to pick default
/// build/test/lint commands when a worker emits `build_project`/`run_tests`
/// without an explicit command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectType {
    Cargo,
    Npm,
    Go,
    Python,
    Make,
    Unknown,
}

impl ProjectType {
    pub fn detect(root: &std::path::Path) -> Self {
        if root.join("Cargo.toml").is_file() {
            ProjectType::Cargo
        } else if root.join("package.json").is_file() {
            ProjectType::Npm
        } else if root.join("go.mod").is_file() {
            ProjectType::Go
        } else if root.join("pyproject.toml").is_file() {
            ProjectType::Python
        } else if root.join("Makefile").is_file() {
            ProjectType::Make
        } else {
            ProjectType::Unknown
        }
    }

    pub fn default_build_command(&self) -> Option<(&'static str, &'static [&'static str])> {
        match self {
            ProjectType::Cargo => Some(("cargo", &["build"])),
            ProjectType::Npm => Some(("npm", &["run", "build"])),
            ProjectType::Go => Some(("go", &["build", "./..."])),
            ProjectType::Python => None,
            ProjectType::Make => Some(("make", &[])),
            ProjectType::Unknown => None,
        }
    }

    pub fn default_test_command(&self) -> Option<(&'static str, &'static [&'static str])> {
        match self {
            ProjectType::Cargo => Some(("cargo", &["test"])),
            ProjectType::Npm => Some(("npm", &["test"])),
            ProjectType::Go => Some(("go", &["test", "./..."])),
            ProjectType::Python => Some(("pytest", &[])),
            ProjectType::Make => Some(("make", &["test"])),
            ProjectType::Unknown => None,
        }
    }

    pub fn default_lint_command(&self) -> Option<(&'static str, &'static [&'static str])> {
        match self {
            ProjectType::Cargo => Some(("cargo", &["clippy"])),
            ProjectType::Npm => Some(("npm", &["run", "lint"])),
            ProjectType::Go => Some(("go", &["vet", "./..."])),
            ProjectType::Python => Some(("ruff", &["check", "."])),
            ProjectType::Make => Some(("make", &["lint"])),
            ProjectType::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captures_stdout_and_exit_code() {
        let exec = ProcessExecutor::new(std::env::temp_dir());
        let out = exec.run("echo", &["hi".to_string()], Duration::from_secs(5)).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn run_times_out_on_a_sleeping_command() {
        let exec = ProcessExecutor::new(std::env::temp_dir());
        let result = exec.run("sleep", &["5".to_string()], Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ProcessError::TimedOut(_))));
    }

    #[test]
    fn detects_cargo_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        assert_eq!(ProjectType::detect(dir.path()), ProjectType::Cargo);
    }

    #[test]
    fn unknown_when_no_markers_present() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ProjectType::detect(dir.path()), ProjectType::Unknown);
    }
}
