//! Per-project SSH key handling. Keys live under a keys root, one file per
//! project; the adapter only ever sets `GIT_SSH_COMMAND` to point at the
//! key path and never reads or logs the key's contents.

use std::path::{Path, PathBuf};

pub struct SshKeyRing {
    keys_root: PathBuf,
}

impl SshKeyRing {
    pub fn new(keys_root: impl Into<PathBuf>) -> Self {
        Self { keys_root: keys_root.into() }
    }

    fn key_path(&self, project_id: &str) -> PathBuf {
        self.keys_root.join(format!("{project_id}.key"))
    }

    pub fn has_key(&self, project_id: &str) -> bool {
        self.key_path(project_id).is_file()
    }

    /// The value to set `GIT_SSH_COMMAND` to for this project, if a key
    /// exists. `None` means git should use whatever ambient SSH config is
    /// already in effect.
    pub fn ssh_command(&self, project_id: &str) -> Option<String> {
        let path = self.key_path(project_id);
        if path.is_file() {
            Some(format!(
                "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
                shell_quote(&path)
            ))
        } else {
            None
        }
    }
}

fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_key_means_no_ssh_command() {
        let ring = SshKeyRing::new("/nonexistent-keys-root");
        assert!(ring.ssh_command("proj").is_none());
    }

    #[test]
    fn existing_key_produces_command_referencing_only_its_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("proj.key"), "not-a-real-key").unwrap();
        let ring = SshKeyRing::new(dir.path());
        let cmd = ring.ssh_command("proj").unwrap();
        assert!(cmd.contains("proj.key"));
        assert!(!cmd.contains("not-a-real-key"));
    }
}
