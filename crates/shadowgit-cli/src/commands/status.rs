use super::{open_engine, short};
use anyhow::Result;
use serde::Serialize;
use shadowgit_vcs::VcsAdapter;
use std::path::Path;

const RECENT_COMMITS: usize = 5;

#[derive(Serialize)]
struct TrackedSession {
    id: String,
    started_at: String,
    changes: usize,
    files: Vec<String>,
    branch: Option<String>,
}

#[derive(Serialize)]
struct RecentCommit {
    id: String,
    summary: String,
}

#[derive(Serialize)]
struct StatusReport {
    project_root: String,
    mirror_root: String,
    pinned_commit: String,
    upstream: String,
    primary_head: Option<String>,
    mirror_head: Option<String>,
    tracked_sessions: Vec<TrackedSession>,
    active_branches: usize,
    pending_user_changes: Vec<String>,
    unresolved_conflicts: Vec<String>,
    recent_commits: Vec<RecentCommit>,
}

pub fn run(path: &Path, config_file: Option<&Path>, json: bool) -> Result<()> {
    let engine = open_engine(path, config_file)?;
    let mirror = engine.mirror();
    let adapter = mirror.adapter();

    let report = StatusReport {
        project_root: mirror.project_root().display().to_string(),
        mirror_root: mirror.mirror_root().display().to_string(),
        pinned_commit: mirror.record().primary_initial_commit.clone(),
        upstream: format!("{}/{}", mirror.record().upstream_remote, mirror.upstream_branch()),
        primary_head: mirror.primary_head().ok(),
        mirror_head: adapter.resolve_head(mirror.mirror_root()).ok(),
        tracked_sessions: engine
            .tracked_sessions()?
            .into_iter()
            .map(|s| TrackedSession {
                files: s.unique_files(),
                changes: s.changes.len(),
                id: s.id,
                started_at: s.started_at,
                branch: s.branch_name,
            })
            .collect(),
        active_branches: engine.active_sessions()?.len(),
        pending_user_changes: engine.pending_user_changes()?,
        unresolved_conflicts: adapter.conflicted_paths(mirror.mirror_root())?,
        recent_commits: adapter
            .log(
                mirror.mirror_root(),
                "HEAD",
                RECENT_COMMITS,
                None,
            )?
            .into_iter()
            .map(|c| RecentCommit {
                id: c.id,
                summary: c.summary,
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Project:  {}", report.project_root);
    println!("Mirror:   {}", report.mirror_root);
    println!("Pinned:   {}", short(&report.pinned_commit));
    println!("Upstream: {}", report.upstream);
    if let Some(head) = &report.primary_head {
        println!("Primary HEAD: {}", short(head));
    }
    if let Some(head) = &report.mirror_head {
        println!("Mirror HEAD:  {}", short(head));
    }

    println!();
    if report.tracked_sessions.is_empty() {
        println!("No active sessions.");
    } else {
        println!("Active sessions:");
        for s in &report.tracked_sessions {
            println!(
                "  {} ({} changes, {} files) on {}",
                s.id,
                s.changes,
                s.files.len(),
                s.branch.as_deref().unwrap_or(shadowgit_core::constants::MIRROR_MAIN_BRANCH)
            );
        }
    }
    if report.active_branches > 0 {
        println!("Session branches awaiting merge: {}", report.active_branches);
    }

    if !report.pending_user_changes.is_empty() {
        println!();
        println!("Human changes not yet in the mirror:");
        for file in &report.pending_user_changes {
            println!("  {file}");
        }
    }
    if !report.unresolved_conflicts.is_empty() {
        println!();
        println!("Unresolved conflicts in the mirror:");
        for file in &report.unresolved_conflicts {
            println!("  {file}");
        }
    }

    println!();
    println!("Recent commits:");
    for c in &report.recent_commits {
        println!("  {} {}", short(&c.id), c.summary);
    }
    Ok(())
}
