use super::short;
use anyhow::{Context, Result};
use shadowgit_core::config::Config;
use shadowgit_sync::Mirror;
use std::path::Path;
use tracing::info;

pub fn run(project_root: &Path, config_file: Option<&Path>) -> Result<()> {
    let project_root =
        std::fs::canonicalize(project_root).context("Failed to resolve project path")?;
    let config = Config::load_with_file(Some(&project_root), config_file)?;

    let mirror = Mirror::init(&project_root, &config.identity)?;
    let record = mirror.record();

    println!("Mirror initialized successfully!");
    println!("  Project:  {}", project_root.display());
    println!("  Mirror:   {}", mirror.mirror_root().display());
    println!("  Pinned:   {}", short(&record.primary_initial_commit));
    println!("  Upstream: {}/{}", record.upstream_remote, record.upstream_branch);
    println!();
    println!("Next step: register `shadowgit hook` with your assistant's hooks,");
    println!("or drive sessions by hand with `shadowgit session start <id>`.");

    info!(
        project_root = %project_root.display(),
        pinned = %record.primary_initial_commit,
        "mirror initialized"
    );
    Ok(())
}
