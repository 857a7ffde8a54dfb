use super::open_engine;
use anyhow::Result;
use shadowgit_conflict::{CommandResolver, ResolutionOrchestrator, ResolutionReport};
use shadowgit_vcs::VcsAdapter;
use std::path::Path;
use std::time::Duration;

pub struct ResolveOptions {
    pub files: Vec<String>,
    pub budget_secs: Option<u64>,
    pub discard: bool,
    pub json: bool,
}

/// Returns whether every requested file was resolved.
pub fn run(path: &Path, config_file: Option<&Path>, options: &ResolveOptions) -> Result<bool> {
    let engine = open_engine(path, config_file)?;
    let mirror = engine.mirror();
    let files = if options.files.is_empty() {
        mirror.adapter().conflicted_paths(mirror.mirror_root())?
    } else {
        options.files.clone()
    };
    if files.is_empty() {
        println!("No conflicted files in the mirror.");
        return Ok(true);
    }

    let config = &engine.config().resolution;
    let mut orchestrator =
        ResolutionOrchestrator::new(mirror, CommandResolver::from_config(config), config);
    if let Some(secs) = options.budget_secs {
        orchestrator = orchestrator.with_budget(Duration::from_secs(secs));
    }
    let report = orchestrator.resolve(&files);
    if options.discard {
        orchestrator.discard(&report);
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, files.len(), options.discard);
    }
    Ok(report.success)
}

fn print_report(report: &ResolutionReport, requested: usize, discarded: bool) {
    println!(
        "Resolved {}/{} files in {}ms",
        report.resolved_files.len(),
        requested,
        report.duration_ms
    );
    for file in &report.resolved_files {
        println!("  {file}");
    }
    if let Some(error) = &report.error {
        println!("Stopped: {error}");
    }
    if discarded {
        return;
    }
    if let (Some(branch), Some(worktree)) = (&report.branch, &report.worktree_path) {
        println!();
        println!("Review the resolution in {}", worktree.display());
        if report.resolution_commit.is_some() {
            println!("then merge branch {branch} into the mirror.");
        }
    }
}
