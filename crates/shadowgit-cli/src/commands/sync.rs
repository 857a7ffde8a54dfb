use super::{open_engine, short};
use anyhow::Result;
use shadowgit_vcs::MergeOutcome;
use std::path::Path;
use tracing::info;

pub fn run(path: &Path, config_file: Option<&Path>) -> Result<()> {
    let engine = open_engine(path, config_file)?;
    let outcome = engine.mirror().sync_from_upstream()?;
    print_sync_outcome(engine.mirror().mirror_root(), &outcome);
    info!(outcome = ?outcome, "sync finished");
    Ok(())
}

pub fn run_user_changes(path: &Path, config_file: Option<&Path>) -> Result<()> {
    let engine = open_engine(path, config_file)?;
    let pending = engine.pending_user_changes()?;
    if pending.is_empty() {
        println!("No human changes to record.");
        return Ok(());
    }
    match engine.commit_pending_user_changes()? {
        Some(commit) => {
            println!("Recorded {} human-changed files in {}", pending.len(), short(&commit));
            for file in &pending {
                println!("  {file}");
            }
        }
        None => println!("No human changes to record."),
    }
    Ok(())
}

pub fn print_sync_outcome(mirror_root: &Path, outcome: &MergeOutcome) {
    match outcome {
        MergeOutcome::UpToDate => println!("Mirror is up to date."),
        MergeOutcome::FastForward { head } => {
            println!("Fast-forwarded mirror to {}", short(head));
        }
        MergeOutcome::Merged { commit } => println!("Merged upstream changes in {}", short(commit)),
        MergeOutcome::Skipped => println!("Merge skipped; manual merge required."),
        MergeOutcome::Failed { reason } => println!("Merge failed: {reason}"),
        MergeOutcome::Conflicted { paths } => print_conflict_guidance(mirror_root, paths),
    }
}

/// Manual steps for a mirror left with conflict markers.
pub fn print_conflict_guidance(mirror_root: &Path, paths: &[String]) {
    println!("Upstream merge conflicted in {} files:", paths.len());
    for path in paths {
        println!("  {path}");
    }
    println!();
    println!("To resolve manually:");
    println!("  cd {}", mirror_root.display());
    println!("  git status");
    println!("  # edit the files above and remove the conflict markers");
    println!("  git add <files> && git commit");
    println!();
    println!("Or let the resolver try: shadowgit resolve");
}
