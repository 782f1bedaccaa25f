//! `Project` is not named explicitly in the component contracts, but every
//! one of them assumes it: the bead store needs a prefix/counter per
//! project, the sandbox needs a repo root and keys root, the dispatcher
//! needs a concurrency cap. Named once here so every crate shares the type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub prefix: String,
    pub repo_root: String,
    pub keys_root: Option<String>,
    pub default_branch: String,
    pub concurrency_cap: u32,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>, prefix: impl Into<String>, repo_root: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            prefix: prefix.into(),
            repo_root: repo_root.into(),
            keys_root: None,
            default_branch: "main".to_string(),
            concurrency_cap: 4,
        }
    }
}
