use crate::persist;
use serde::{Deserialize, Serialize};
use shadowgit_core::constants;
use shadowgit_core::error::StateError;
use std::path::{Path, PathBuf};

/// The record that marks a directory as an initialized mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub version: String,
    pub architecture: String,
    pub created_at: String,
    pub project_root: String,
    /// Primary HEAD when the mirror was created.
    pub primary_initial_commit: String,
    pub upstream_remote: String,
    pub upstream_branch: String,
}

impl MirrorConfig {
    pub fn new(project_root: &Path, primary_commit: &str, upstream_branch: &str) -> Self {
        Self {
            version: constants::SCHEMA_VERSION.to_string(),
            architecture: constants::ARCHITECTURE.to_string(),
            created_at: shadowgit_core::time::now_iso8601(),
            project_root: project_root.display().to_string(),
            primary_initial_commit: primary_commit.to_string(),
            upstream_remote: constants::UPSTREAM_REMOTE.to_string(),
            upstream_branch: upstream_branch.to_string(),
        }
    }

    pub fn path(mirror_root: &Path) -> PathBuf {
        mirror_root.join(constants::MIRROR_CONFIG_FILE)
    }

    pub fn load(mirror_root: &Path) -> Result<Option<Self>, StateError> {
        persist::read_json(&Self::path(mirror_root))
    }

    pub fn save(&self, mirror_root: &Path) -> Result<(), StateError> {
        persist::write_json(&Self::path(mirror_root), self)
    }
}
