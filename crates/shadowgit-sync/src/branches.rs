use crate::mirror::Mirror;
use crate::walk;
use shadowgit_core::constants;
use shadowgit_core::error::{SessionError, VcsError};
use shadowgit_state::session_meta::{self, BranchStatus, SessionBranch};
use shadowgit_vcs::{ConflictPolicy, Git2VcsAdapter, MergeOutcome, VcsAdapter, WorktreeManager, normalize_ref_name};
use tracing::{info, warn};

/// Branch name for a session: `session-<topic>-<stamp>` or `session-<stamp>`.
pub fn session_branch_name(topic: Option<&str>, stamp: &str) -> String {
    match topic.map(|t| normalize_ref_name(&t.to_lowercase())) {
        Some(topic) if !topic.is_empty() => format!("session-{topic}-{stamp}"),
        _ => format!("session-{stamp}"),
    }
}

/// Gives concurrent sessions their own branch and checkout, and folds them
/// back into the mirror's main branch when they end.
pub struct SessionBranchManager<'a> {
    mirror: &'a Mirror,
    worktrees: WorktreeManager<Git2VcsAdapter>,
}

impl<'a> SessionBranchManager<'a> {
    pub fn new(mirror: &'a Mirror) -> Self {
        let worktrees = WorktreeManager::new(
            mirror.mirror_root(),
            mirror.sessions_dir(),
            *mirror.adapter(),
        );
        Self { mirror, worktrees }
    }

    fn unique_branch_name(&self, topic: Option<&str>) -> Result<String, SessionError> {
        let base = session_branch_name(topic, &shadowgit_core::time::now_branch_stamp());
        let root = self.mirror.mirror_root();
        let taken = |name: &str| -> Result<bool, SessionError> {
            Ok(self.mirror.adapter().branch_exists(root, name)
                || session_meta::branch_name_taken(root, name)?
                || self.worktrees.worktree_path_for_ref(name).exists())
        };
        if !taken(&base)? {
            return Ok(base);
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if !taken(&candidate)? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Branch from the mirror's HEAD, check the branch out into
    /// `sessions/<branch>`, copy the project files in and record it.
    pub fn create_session_branch(
        &self,
        session_id: &str,
        topic: Option<&str>,
    ) -> Result<SessionBranch, SessionError> {
        let root = self.mirror.mirror_root();
        let branch_name = self.unique_branch_name(topic)?;
        self.mirror
            .adapter()
            .create_branch(root, &branch_name, constants::MIRROR_MAIN_BRANCH)?;
        let worktree_path = match self.worktrees.create(&branch_name) {
            Ok(path) => path,
            Err(err) => {
                if let Err(cleanup) = self.mirror.adapter().delete_branch(root, &branch_name) {
                    warn!(branch = %branch_name, error = %cleanup, "Failed to delete orphaned session branch");
                }
                return Err(err.into());
            }
        };
        let copied = walk::copy_project_files(self.mirror.project_root(), &worktree_path);

        let entry = SessionBranch {
            branch_name: branch_name.clone(),
            worktree_path: worktree_path.display().to_string(),
            topic: topic.map(str::to_string),
            created_at: shadowgit_core::time::now_iso8601(),
            status: BranchStatus::Active,
            primary_commit: self.mirror.parent_repo_hash(),
            completed_at: None,
        };
        session_meta::upsert(root, session_id, &entry)?;
        info!(
            session_id,
            branch = %branch_name,
            worktree = %worktree_path.display(),
            copied,
            "created session branch"
        );
        Ok(entry)
    }

    /// Merge a session branch back into main: fast-forward when main has not
    /// moved, a merge commit when `auto_merge` allows it. Conflicts and
    /// disallowed merges are escalated and leave the branch in place, as do
    /// uncommitted files in the main checkout that the merge would overwrite.
    pub fn merge_session_branch(
        &self,
        session_id: &str,
        auto_merge: bool,
    ) -> Result<MergeOutcome, SessionError> {
        let entry = session_meta::get(self.mirror.mirror_root(), session_id)?.ok_or_else(|| {
            SessionError::SessionNotFound {
                session_id: session_id.to_string(),
            }
        })?;
        let outcome = match self.fold_into_main(session_id, &entry, auto_merge) {
            Ok(outcome) => outcome,
            Err(VcsError::CheckoutBlocked { paths }) => MergeOutcome::Conflicted { paths },
            Err(err) => return Err(err.into()),
        };

        if outcome.is_clean() {
            self.cleanup(session_id, &entry);
            info!(session_id, branch = %entry.branch_name, outcome = ?outcome, "merged session branch");
        } else {
            warn!(
                session_id,
                branch = %entry.branch_name,
                outcome = ?outcome,
                "session branch needs a manual merge"
            );
        }
        Ok(outcome)
    }

    fn fold_into_main(
        &self,
        session_id: &str,
        entry: &SessionBranch,
        auto_merge: bool,
    ) -> Result<MergeOutcome, VcsError> {
        let root = self.mirror.mirror_root();
        let adapter = self.mirror.adapter();
        let main_ref = format!("refs/heads/{}", constants::MIRROR_MAIN_BRANCH);
        let branch_ref = format!("refs/heads/{}", entry.branch_name);

        adapter.checkout_branch(root, constants::MIRROR_MAIN_BRANCH)?;
        let main_tip = adapter.resolve_ref(root, &main_ref)?;
        let branch_tip = adapter.resolve_ref(root, &branch_ref)?;
        let base = adapter.merge_base(root, &main_ref, &branch_ref)?;

        if base == branch_tip {
            Ok(MergeOutcome::UpToDate)
        } else if base == main_tip {
            adapter.fast_forward(root, constants::MIRROR_MAIN_BRANCH, &branch_tip)?;
            Ok(MergeOutcome::FastForward { head: branch_tip })
        } else if auto_merge {
            adapter.merge_into_head(
                root,
                &branch_ref,
                &format!("Merge session: {session_id}"),
                ConflictPolicy::Abort,
            )
        } else {
            Ok(MergeOutcome::Skipped)
        }
    }

    /// Drop a session branch without merging, for sessions that made no changes.
    pub fn discard_session_branch(&self, session_id: &str) -> Result<(), SessionError> {
        if let Some(entry) = session_meta::get(self.mirror.mirror_root(), session_id)? {
            self.cleanup(session_id, &entry);
        }
        Ok(())
    }

    fn cleanup(&self, session_id: &str, entry: &SessionBranch) {
        let root = self.mirror.mirror_root();
        if let Err(err) = self.worktrees.remove(&entry.branch_name) {
            warn!(session_id, branch = %entry.branch_name, error = %err, "Failed to remove session worktree");
        }
        if self.mirror.adapter().branch_exists(root, &entry.branch_name)
            && let Err(err) = self.mirror.adapter().delete_branch(root, &entry.branch_name)
        {
            warn!(session_id, branch = %entry.branch_name, error = %err, "Failed to delete session branch");
        }
        if let Err(err) = session_meta::mark_completed(root, session_id) {
            warn!(session_id, error = %err, "Failed to mark session completed");
        }
    }

    /// Remove checkouts under `sessions/` that no active session owns.
    pub fn prune_orphaned_worktrees(&self) -> Result<Vec<String>, SessionError> {
        let keep: Vec<String> = session_meta::active(self.mirror.mirror_root())?
            .into_values()
            .map(|entry| entry.branch_name)
            .collect();
        Ok(self.worktrees.prune_orphans(&keep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_names_embed_normalized_topic() {
        assert_eq!(
            session_branch_name(Some("Auth Flow"), "2026-01-02-03-04-05"),
            "session-auth-flow-2026-01-02-03-04-05"
        );
        assert_eq!(
            session_branch_name(None, "2026-01-02-03-04-05"),
            "session-2026-01-02-03-04-05"
        );
        assert_eq!(
            session_branch_name(Some("///"), "2026-01-02-03-04-05"),
            "session-2026-01-02-03-04-05"
        );
    }
}
