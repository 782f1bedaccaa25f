//! Filesystem confinement: every path an action touches is normalized and
//! rejected if it would escape the project root after normalization (so
//! `../../etc/passwd` and symlink-through-root tricks both fail the same
//! way).

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("path escapes sandbox root: {0}")]
    OutsideSandbox(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub struct SandboxFs {
    root: PathBuf,
}

impl SandboxFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `relative` against the sandbox root, collapsing `.`/`..`
    /// components purely lexically (the path need not exist), then confirm
    /// the result is still under the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, FsError> {
        let joined = self.root.join(relative);
        let normalized = normalize(&joined);

        if !normalized.starts_with(&self.root) {
            return Err(FsError::OutsideSandbox(relative.to_string()));
        }
        Ok(normalized)
    }

    pub async fn read_to_string(&self, relative: &str) -> Result<String, FsError> {
        let path = self.resolve(relative)?;
        Ok(tokio::fs::read_to_string(path).await?)
    }

    pub async fn write(&self, relative: &str, content: &str) -> Result<(), FsError> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub async fn remove(&self, relative: &str) -> Result<(), FsError> {
        let path = self.resolve(relative)?;
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    pub async fn exists(&self, relative: &str) -> Result<bool, FsError> {
        let path = self.resolve(relative)?;
        Ok(tokio::fs::try_exists(path).await?)
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_relative_path() {
        let fs = SandboxFs::new("/repo");
        let p = fs.resolve("src/main.rs").unwrap();
        assert_eq!(p, PathBuf::from("/repo/src/main.rs"));
    }

    #[test]
    fn rejects_parent_dir_escape() {
        let fs = SandboxFs::new("/repo");
        let err = fs.resolve("../etc/passwd").unwrap_err();
        assert!(matches!(err, FsError::OutsideSandbox(_)));
    }

    #[test]
    fn rejects_escape_buried_inside_a_longer_path() {
        let fs = SandboxFs::new("/repo");
        let err = fs.resolve("src/../../etc/passwd").unwrap_err();
        assert!(matches!(err, FsError::OutsideSandbox(_)));
    }

    #[test]
    fn allows_internal_dot_dot_that_stays_inside_root() {
        let fs = SandboxFs::new("/repo");
        let p = fs.resolve("src/../lib.rs").unwrap();
        assert_eq!(p, PathBuf::from("/repo/lib.rs"));
    }
}
