use super::sync::print_conflict_guidance;
use super::{open_engine, short};
use anyhow::Result;
use shadowgit_core::constants;
use shadowgit_state::{active, session_meta};
use shadowgit_sync::{AccumulateOutcome, EndReport, Mirror, StartReport};
use shadowgit_vcs::MergeOutcome;
use std::path::Path;

pub fn start(
    path: &Path,
    config_file: Option<&Path>,
    session_id: &str,
    topic: Option<&str>,
    use_branching: Option<bool>,
) -> Result<()> {
    let mut engine = open_engine(path, config_file)?;
    let report = engine.session_start(session_id, topic, use_branching)?;
    print_start(engine.mirror(), &report);
    Ok(())
}

fn print_start(mirror: &Mirror, report: &StartReport) {
    if report.resumed {
        println!("Session {} is already active.", report.session_id);
    } else {
        println!("Session {} started.", report.session_id);
    }
    match (&report.branch_name, &report.worktree_path) {
        (Some(branch), Some(worktree)) => {
            println!("  Branch:   {branch}");
            println!("  Worktree: {}", worktree.display());
        }
        _ => println!("  Branch:   {}", constants::MIRROR_MAIN_BRANCH),
    }
    if let Some(commit) = &report.user_commit {
        println!("  Recorded human changes in {}", short(commit));
    }
    let conflicts = report.sync_conflicts();
    if !conflicts.is_empty() {
        println!();
        print_conflict_guidance(mirror.mirror_root(), conflicts);
    }
}

pub fn accumulate(
    path: &Path,
    config_file: Option<&Path>,
    file: &Path,
    tool: &str,
    session_id: Option<&str>,
    input: serde_json::Value,
) -> Result<()> {
    let mut engine = open_engine(path, config_file)?;
    engine.resume(session_id)?;
    let file = if file.is_absolute() {
        file.to_path_buf()
    } else {
        std::env::current_dir()?.join(file)
    };
    match engine.accumulate_change(&file, tool, input)? {
        AccumulateOutcome::Recorded {
            session_id,
            change_count,
        } => println!("Recorded change {change_count} in session {session_id}"),
        AccumulateOutcome::Committed { commit } => {
            println!("No active session; committed {}", short(&commit));
        }
    }
    Ok(())
}

pub fn end(
    path: &Path,
    config_file: Option<&Path>,
    session_id: Option<&str>,
    narration: Option<&str>,
) -> Result<()> {
    let mut engine = open_engine(path, config_file)?;
    if engine.resume(session_id)?.is_none() {
        println!("No active session.");
        return Ok(());
    }
    let report = engine.session_end(narration)?;
    print_end(&report);
    Ok(())
}

fn print_end(report: &EndReport) {
    let id = report.session_id.as_deref().unwrap_or("?");
    let Some(commit) = &report.commit else {
        println!("Session {id} ended with no changes.");
        return;
    };
    println!("Session {id} committed as {}", short(commit));
    for file in &report.files {
        println!("  {file}");
    }
    match &report.merge {
        Some(MergeOutcome::Conflicted { paths }) => {
            println!("Session branch conflicts with main in: {}", paths.join(", "));
            println!("The branch was kept for manual merging.");
        }
        Some(MergeOutcome::Skipped) => {
            println!("Session branch was not merged; it was kept for manual merging.");
        }
        Some(MergeOutcome::Failed { reason }) => {
            println!("Session branch could not be merged ({reason}); it was kept for manual merging.");
        }
        Some(outcome) => {
            if let Some(head) = outcome.head() {
                println!("Merged into {} at {}", constants::MIRROR_MAIN_BRANCH, short(head));
            }
        }
        None => {}
    }
    if let Some(tests) = &report.tests
        && tests.total_runs > 0
    {
        println!(
            "Tests: {} runs, {} failed, health {}",
            tests.total_runs, tests.failed_runs, tests.health
        );
    }
}

pub fn list(path: &Path, only_active: bool, json: bool) -> Result<()> {
    let project_root = super::find_project_root(path).unwrap_or_else(|| path.to_path_buf());
    let mirror = Mirror::open(&project_root)?;
    let root = mirror.mirror_root();

    let entries: Vec<_> = session_meta::list_newest_first(root)?
        .into_iter()
        .filter(|e| !only_active || e.branch.status == session_meta::BranchStatus::Active)
        .collect();
    let accumulating = active::load_all(root)?;

    if json {
        let value = serde_json::json!({
            "branches": entries,
            "accumulating": accumulating.keys().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if !accumulating.is_empty() {
        println!("Accumulating:");
        for session in accumulating.values() {
            println!("  {} ({} changes)", session.id, session.changes.len());
        }
        println!();
    }
    if entries.is_empty() {
        println!("No session branches.");
        return Ok(());
    }
    println!("Session branches:");
    for entry in &entries {
        println!(
            "  {:<10} {:<40} {} {}",
            entry.branch.status.as_str(),
            entry.branch.branch_name,
            entry.branch.created_at,
            entry.session_id
        );
    }
    Ok(())
}

pub fn prune(path: &Path, config_file: Option<&Path>) -> Result<()> {
    let engine = open_engine(path, config_file)?;
    let stale = engine.prune_stale_sessions()?;
    if stale.is_empty() {
        println!("No stale sessions.");
    } else {
        println!("Dropped {} stale sessions:", stale.len());
        for session in &stale {
            println!(
                "  {} (last active {}, {} uncommitted changes)",
                session.id,
                session.last_activity(),
                session.changes.len()
            );
        }
    }

    let removed = engine.prune_orphaned_worktrees()?;
    if removed.is_empty() {
        println!("No orphaned worktrees.");
    } else {
        println!("Removed {} orphaned worktrees:", removed.len());
        for path in &removed {
            println!("  {path}");
        }
    }
    Ok(())
}
