use crate::persist;
use serde::{Deserialize, Serialize};
use shadowgit_core::constants;
use shadowgit_core::error::StateError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    Active,
    Completed,
}

impl BranchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

/// Where a concurrent session does its work, keyed by session id on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBranch {
    pub branch_name: String,
    pub worktree_path: String,
    #[serde(default)]
    pub topic: Option<String>,
    pub created_at: String,
    pub status: BranchStatus,
    /// Primary HEAD when the branch was created.
    pub primary_commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// A metadata entry together with its session id, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionBranchEntry {
    pub session_id: String,
    #[serde(flatten)]
    pub branch: SessionBranch,
}

pub fn metadata_path(mirror_root: &Path) -> PathBuf {
    mirror_root.join(constants::SESSION_METADATA_FILE)
}

pub fn load_all(mirror_root: &Path) -> Result<BTreeMap<String, SessionBranch>, StateError> {
    Ok(persist::read_json(&metadata_path(mirror_root))?.unwrap_or_default())
}

pub fn get(mirror_root: &Path, session_id: &str) -> Result<Option<SessionBranch>, StateError> {
    Ok(load_all(mirror_root)?.remove(session_id))
}

/// Insert or replace one entry. The whole file is rewritten; concurrent
/// writers race and the last one wins.
pub fn upsert(mirror_root: &Path, session_id: &str, entry: &SessionBranch) -> Result<(), StateError> {
    let mut all = load_all(mirror_root)?;
    all.insert(session_id.to_string(), entry.clone());
    persist::write_json(&metadata_path(mirror_root), &all)
}

/// Flip an active entry to completed. Returns false when there was nothing to flip.
pub fn mark_completed(mirror_root: &Path, session_id: &str) -> Result<bool, StateError> {
    let mut all = load_all(mirror_root)?;
    let Some(entry) = all.get_mut(session_id) else {
        return Ok(false);
    };
    if entry.status == BranchStatus::Completed {
        debug!(session_id, "session branch already completed");
        return Ok(false);
    }
    entry.status = BranchStatus::Completed;
    entry.completed_at = Some(shadowgit_core::time::now_iso8601());
    persist::write_json(&metadata_path(mirror_root), &all)?;
    Ok(true)
}

pub fn active(mirror_root: &Path) -> Result<BTreeMap<String, SessionBranch>, StateError> {
    let mut all = load_all(mirror_root)?;
    all.retain(|_, entry| entry.status == BranchStatus::Active);
    Ok(all)
}

/// Every entry, newest `created_at` first.
pub fn list_newest_first(mirror_root: &Path) -> Result<Vec<SessionBranchEntry>, StateError> {
    let mut entries: Vec<SessionBranchEntry> = load_all(mirror_root)?
        .into_iter()
        .map(|(session_id, branch)| SessionBranchEntry { session_id, branch })
        .collect();
    entries.sort_by(|a, b| b.branch.created_at.cmp(&a.branch.created_at));
    Ok(entries)
}

pub fn branch_name_taken(mirror_root: &Path, branch_name: &str) -> Result<bool, StateError> {
    Ok(load_all(mirror_root)?
        .values()
        .any(|entry| entry.branch_name == branch_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(branch: &str, created_at: &str) -> SessionBranch {
        SessionBranch {
            branch_name: branch.to_string(),
            worktree_path: format!("/m/sessions/{branch}"),
            topic: None,
            created_at: created_at.to_string(),
            status: BranchStatus::Active,
            primary_commit: "abc".to_string(),
            completed_at: None,
        }
    }

    #[test]
    fn upsert_then_complete_transitions_once() {
        let tmp = tempfile::tempdir().unwrap();
        upsert(tmp.path(), "s1", &entry("session-a", "2026-01-01T00:00:00Z")).unwrap();

        assert!(mark_completed(tmp.path(), "s1").unwrap());
        assert!(!mark_completed(tmp.path(), "s1").unwrap());
        assert!(!mark_completed(tmp.path(), "missing").unwrap());

        let stored = get(tmp.path(), "s1").unwrap().unwrap();
        assert_eq!(stored.status, BranchStatus::Completed);
        assert!(stored.completed_at.is_some());
        assert!(active(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn listing_is_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        upsert(tmp.path(), "old", &entry("session-old", "2026-01-01T00:00:00Z")).unwrap();
        upsert(tmp.path(), "new", &entry("session-new", "2026-03-01T00:00:00Z")).unwrap();

        let listed = list_newest_first(tmp.path()).unwrap();
        let ids: Vec<&str> = listed.iter().map(|e| e.session_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert!(branch_name_taken(tmp.path(), "session-old").unwrap());
        assert!(!branch_name_taken(tmp.path(), "session-other").unwrap());
    }

    #[test]
    fn stored_json_uses_snake_case_status() {
        let tmp = tempfile::tempdir().unwrap();
        upsert(tmp.path(), "s1", &entry("session-a", "2026-01-01T00:00:00Z")).unwrap();
        let raw = std::fs::read_to_string(metadata_path(tmp.path())).unwrap();
        assert!(raw.contains("\"status\": \"active\""));
    }
}
