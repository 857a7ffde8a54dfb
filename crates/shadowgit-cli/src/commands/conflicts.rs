use super::{find_project_root, short};
use anyhow::Result;
use shadowgit_conflict::{ChangeAnalysis, ChangeStatus, analyze_recent, repo_conflict_status};
use shadowgit_sync::Mirror;
use std::path::Path;

pub fn run(
    path: &Path,
    limit: usize,
    file: Option<&str>,
    json: bool,
) -> Result<()> {
    let project_root = find_project_root(path).unwrap_or_else(|| path.to_path_buf());
    let mirror = Mirror::open(&project_root)?;

    if let Some(target) = file {
        let status = repo_conflict_status(&mirror, target)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }
        println!(
            "{target}: {}",
            if status.has_conflicts { "potential conflict" } else { "no overlap" }
        );
        for modification in &status.human_modifications {
            println!("  {:<10} {}", modification.kind, modification.path);
        }
        for recommendation in &status.recommendations {
            println!("  - {recommendation}");
        }
        return Ok(());
    }

    let recent = analyze_recent(&mirror, limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recent)?);
        return Ok(());
    }

    let s = &recent.summary;
    println!(
        "Analyzed {} assistant changes: {} intact, {} modified by you, {} missing, {} conflicting",
        s.total, s.intact, s.user_modified, s.not_found, s.conflicts
    );
    for change in recent.changes.iter().filter(|c| c.status != ChangeStatus::Unchanged) {
        print_change(change);
    }
    Ok(())
}

fn print_change(change: &ChangeAnalysis) {
    println!();
    println!(
        "{} [{}] via {}{}",
        change.relative_path,
        change.status.as_str(),
        change.tool_name,
        change
            .commit
            .as_deref()
            .map(|c| format!(" in {}", short(c)))
            .unwrap_or_default()
    );
    for note in &change.notes {
        println!("  note: {note}");
    }
    for pattern in &change.patterns {
        println!("  pattern: {}", pattern.description);
    }
    let revert = &change.revert;
    println!(
        "  revert: {} ({:.0}% unchanged, {:?} confidence)",
        if revert.can_revert { "safe" } else { "unsafe" },
        revert.unchanged_ratio * 100.0,
        revert.confidence
    );
    for line in &change.diff_lines {
        println!("  {line}");
    }
}
