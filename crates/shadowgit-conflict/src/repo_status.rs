use serde::Serialize;
use shadowgit_core::constants;
use shadowgit_core::error::SessionError;
use shadowgit_sync::Mirror;
use shadowgit_vcs::{DiffEntry, VcsAdapter};

const BROAD_CHANGESET: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HumanModification {
    pub path: String,
    pub kind: &'static str,
}

/// Overlap between the human's uncommitted work and one assistant target.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepoConflictStatus {
    pub target: String,
    pub has_conflicts: bool,
    pub same_file_modified: bool,
    pub related_files_modified: Vec<String>,
    pub human_modifications: Vec<HumanModification>,
    pub recommendations: Vec<String>,
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Compare primary status entries against the assistant's `target` path.
pub fn conflict_status(entries: &[DiffEntry], target: &str) -> RepoConflictStatus {
    let mirror_prefix = format!("{}/", constants::MIRROR_DIR);
    let entries: Vec<&DiffEntry> = entries
        .iter()
        .filter(|e| !e.path.starts_with(&mirror_prefix) && e.path != constants::MIRROR_DIR)
        .collect();

    let mut status = RepoConflictStatus {
        target: target.to_string(),
        ..RepoConflictStatus::default()
    };
    status.human_modifications = entries
        .iter()
        .map(|e| HumanModification {
            path: e.path.clone(),
            kind: e.kind.label(),
        })
        .collect();

    status.same_file_modified = entries.iter().any(|e| e.path == target);
    if status.same_file_modified {
        status.recommendations.push(format!(
            "Both you and the assistant modified {target}; review before merging"
        ));
    }

    let dir = parent_dir(target);
    status.related_files_modified = entries
        .iter()
        .filter(|e| e.path != target && parent_dir(&e.path) == dir)
        .map(|e| e.path.clone())
        .collect();
    if !status.related_files_modified.is_empty() {
        status.recommendations.push(format!(
            "Related files modified: {}",
            status.related_files_modified.join(", ")
        ));
    }

    let count = status.human_modifications.len();
    if count > BROAD_CHANGESET {
        status.recommendations.push(format!(
            "{count} files modified by human; consider reviewing the full changeset"
        ));
    } else if count > 0 {
        status.recommendations.push(format!(
            "{count} files modified by human alongside the assistant's change"
        ));
    }

    status.has_conflicts = status.same_file_modified || !status.related_files_modified.is_empty();
    status
}

/// [`conflict_status`] against the primary repository's live status.
pub fn repo_conflict_status(mirror: &Mirror, target: &str) -> Result<RepoConflictStatus, SessionError> {
    let entries = mirror.adapter().status(mirror.project_root())?;
    Ok(conflict_status(&entries, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_file_and_same_directory_are_flagged() {
        let entries = vec![
            DiffEntry::modified("src/app.py"),
            DiffEntry::untracked("src/helpers.py"),
            DiffEntry::modified("docs/readme.md"),
            DiffEntry::untracked(".shadowgit/x"),
        ];
        let status = conflict_status(&entries, "src/app.py");
        assert!(status.has_conflicts);
        assert!(status.same_file_modified);
        assert_eq!(status.related_files_modified, vec!["src/helpers.py"]);
        assert_eq!(status.human_modifications.len(), 3);
        assert_eq!(
            status.recommendations,
            vec![
                "Both you and the assistant modified src/app.py; review before merging".to_string(),
                "Related files modified: src/helpers.py".to_string(),
                "3 files modified by human alongside the assistant's change".to_string(),
            ]
        );
    }

    #[test]
    fn unrelated_changes_only_get_a_scope_note() {
        let entries: Vec<DiffEntry> = (0..6).map(|i| DiffEntry::modified(format!("lib/m{i}.rs"))).collect();
        let status = conflict_status(&entries, "app.py");
        assert!(!status.has_conflicts);
        assert_eq!(
            status.recommendations,
            vec!["6 files modified by human; consider reviewing the full changeset".to_string()]
        );
    }

    #[test]
    fn clean_repository_has_no_recommendations() {
        let status = conflict_status(&[], "app.py");
        assert!(!status.has_conflicts);
        assert!(status.recommendations.is_empty());
    }
}
