pub mod conflicts;
pub mod git;
pub mod hook;
pub mod init;
pub mod resolve;
pub mod session;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use shadowgit_core::config::Config;
use shadowgit_sync::SyncEngine;
use std::path::{Path, PathBuf};

/// Load layered config and open the mirror of the project containing `path`.
pub fn open_engine(path: &Path, config_file: Option<&Path>) -> Result<SyncEngine> {
    let project_root = find_project_root(path).unwrap_or_else(|| path.to_path_buf());
    let config = Config::load_with_file(Some(&project_root), config_file)
        .context("Failed to load configuration")?;
    Ok(SyncEngine::open(&project_root, config)?)
}

/// Nearest ancestor of `start` (inclusive) that has an initialized mirror.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let start = std::fs::canonicalize(start).unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .find(|dir| shadowgit_sync::Mirror::exists(dir))
        .map(Path::to_path_buf)
}

pub fn short(id: &str) -> &str {
    id.get(..shadowgit_core::constants::SHORT_HASH_LEN).unwrap_or(id)
}
