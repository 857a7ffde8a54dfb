use crate::diff::DiffEntry;
use shadowgit_core::config::IdentityConfig;
use shadowgit_core::error::VcsError;
use std::path::Path;

/// Result of merging one history line into another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    UpToDate,
    FastForward { head: String },
    Merged { commit: String },
    /// The merge machinery reported conflicts on these paths.
    Conflicted { paths: Vec<String> },
    /// A real merge was needed but not allowed.
    Skipped,
    /// The merge could not be carried out; nothing was changed.
    Failed { reason: String },
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            Self::UpToDate | Self::FastForward { .. } | Self::Merged { .. }
        )
    }

    /// Commit now at the tip of the merged-into branch, when one was produced.
    pub fn head(&self) -> Option<&str> {
        match self {
            Self::FastForward { head } => Some(head),
            Self::Merged { commit } => Some(commit),
            _ => None,
        }
    }
}

/// What to do with the working tree when a three-way merge conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Leave conflict markers in the working tree for manual or AI resolution.
    WriteMarkers,
    /// Leave the branch and working tree untouched.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: String,
    pub summary: String,
    pub message: String,
    /// Commit time, seconds since the epoch.
    pub time: i64,
}

/// Version-control operations consumed by the mirror and session engine.
///
/// Every call opens the repository at `repo_root` afresh, so worktree
/// checkouts can be passed wherever a repository root is expected.
pub trait VcsAdapter: Send + Sync {
    fn detect_repo(&self, repo_root: &Path) -> Result<(), VcsError>;
    fn resolve_head(&self, repo_root: &Path) -> Result<String, VcsError>;
    fn head_branch(&self, repo_root: &Path) -> Result<String, VcsError>;
    fn resolve_ref(&self, repo_root: &Path, rev: &str) -> Result<String, VcsError>;

    /// Create `mirror_root` as a repository that borrows `primary_root`'s
    /// object store and points an `upstream` remote back at it.
    fn init_shared_mirror(
        &self,
        primary_root: &Path,
        mirror_root: &Path,
        remote_name: &str,
        identity: &IdentityConfig,
    ) -> Result<(), VcsError>;
    fn fetch(&self, repo_root: &Path, remote_name: &str) -> Result<(), VcsError>;
    /// Point `branch` at `rev` and check it out, overwriting the working tree.
    fn reset_branch_to(&self, repo_root: &Path, branch: &str, rev: &str)
    -> Result<(), VcsError>;
    fn checkout_branch(&self, repo_root: &Path, branch: &str) -> Result<(), VcsError>;

    /// Stage `paths` (relative; missing files are staged as deletions) and
    /// commit on HEAD. Returns the new commit id.
    fn stage_and_commit(
        &self,
        repo_root: &Path,
        paths: &[String],
        message: &str,
    ) -> Result<String, VcsError>;
    fn add_note(&self, repo_root: &Path, commit: &str, note: &str) -> Result<(), VcsError>;
    fn read_note(&self, repo_root: &Path, commit: &str) -> Result<Option<String>, VcsError>;

    fn create_branch(&self, repo_root: &Path, name: &str, from_rev: &str)
    -> Result<String, VcsError>;
    fn branch_exists(&self, repo_root: &Path, name: &str) -> bool;
    fn delete_branch(&self, repo_root: &Path, name: &str) -> Result<(), VcsError>;
    fn add_worktree(
        &self,
        repo_root: &Path,
        name: &str,
        branch: &str,
        worktree_path: &Path,
    ) -> Result<(), VcsError>;
    fn remove_worktree(
        &self,
        repo_root: &Path,
        name: &str,
        worktree_path: &Path,
    ) -> Result<(), VcsError>;

    fn merge_base(&self, repo_root: &Path, base_ref: &str, head_ref: &str)
    -> Result<String, VcsError>;
    fn is_ancestor(
        &self,
        repo_root: &Path,
        ancestor: &str,
        descendant: &str,
    ) -> Result<bool, VcsError>;
    /// Advance `branch` to `target`, updating the working tree if checked out.
    fn fast_forward(&self, repo_root: &Path, branch: &str, target: &str)
    -> Result<(), VcsError>;
    /// Merge `rev` into the checked-out branch.
    fn merge_into_head(
        &self,
        repo_root: &Path,
        rev: &str,
        message: &str,
        policy: ConflictPolicy,
    ) -> Result<MergeOutcome, VcsError>;
    fn conflicted_paths(&self, repo_root: &Path) -> Result<Vec<String>, VcsError>;

    fn status(&self, repo_root: &Path) -> Result<Vec<DiffEntry>, VcsError>;
    fn diff_name_status(
        &self,
        repo_root: &Path,
        base_ref: &str,
        head_ref: &str,
    ) -> Result<Vec<DiffEntry>, VcsError>;
    /// Walk history from `rev`, newest first, keeping commits whose message
    /// contains `grep` when given.
    fn log(
        &self,
        repo_root: &Path,
        rev: &str,
        limit: usize,
        grep: Option<&str>,
    ) -> Result<Vec<CommitInfo>, VcsError>;
    fn tracked_files(&self, repo_root: &Path, rev: &str) -> Result<Vec<String>, VcsError>;
    fn read_blob(
        &self,
        repo_root: &Path,
        rev: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, VcsError>;
}
