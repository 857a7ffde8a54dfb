use crate::branches::SessionBranchManager;
use crate::commit_builder;
use crate::mirror::Mirror;
use crate::monitor::{MonitorSummary, TestMonitor};
use shadowgit_core::config::Config;
use shadowgit_core::constants;
use shadowgit_core::error::SessionError;
use shadowgit_core::types::{ChangeRecord, ChangeRecordInput, Session};
use shadowgit_state::active;
use shadowgit_state::session_meta::{self, SessionBranchEntry};
use shadowgit_vcs::{MergeOutcome, VcsAdapter};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What `session_start` did besides marking the session active.
#[derive(Debug, Clone, Default)]
pub struct StartReport {
    pub session_id: String,
    /// The session was already in the active store and was picked up again.
    pub resumed: bool,
    /// `None` when the upstream sync itself failed.
    pub sync: Option<MergeOutcome>,
    pub user_commit: Option<String>,
    pub branch_name: Option<String>,
    pub worktree_path: Option<PathBuf>,
}

impl StartReport {
    pub fn sync_conflicts(&self) -> &[String] {
        match &self.sync {
            Some(MergeOutcome::Conflicted { paths }) => paths,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccumulateOutcome {
    /// Recorded into the active session's buffer.
    Recorded { session_id: String, change_count: usize },
    /// No session was active; the file was committed on its own.
    Committed { commit: String },
}

#[derive(Debug, Clone, Default)]
pub struct EndReport {
    /// `None` when no session was active.
    pub session_id: Option<String>,
    /// `None` when nothing was accumulated.
    pub commit: Option<String>,
    pub files: Vec<String>,
    pub merge: Option<MergeOutcome>,
    pub tests: Option<MonitorSummary>,
}

/// Session tracker plus synchronization engine over one mirror.
///
/// Hook invocations are separate processes, so the active session is kept
/// in the mirror's active-session store and picked up with [`resume`].
///
/// [`resume`]: SyncEngine::resume
pub struct SyncEngine {
    mirror: Mirror,
    config: Config,
    current: Option<Session>,
    monitor: Option<TestMonitor>,
}

impl SyncEngine {
    pub fn new(mirror: Mirror, config: Config) -> Self {
        Self {
            mirror,
            config,
            current: None,
            monitor: None,
        }
    }

    pub fn open(project_root: &Path, config: Config) -> Result<Self, SessionError> {
        Ok(Self::new(Mirror::open(project_root)?, config))
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Load an active session from the store: the named one, or the most
    /// recently started one.
    pub fn resume(&mut self, session_id: Option<&str>) -> Result<Option<&Session>, SessionError> {
        let root = self.mirror.mirror_root();
        let session = match session_id {
            Some(id) => active::get(root, id)?,
            None => active::most_recent(root)?,
        };
        if let Some(session) = &session {
            debug!(session_id = %session.id, changes = session.changes.len(), "resumed session");
        }
        self.current = session;
        Ok(self.current.as_ref())
    }

    fn working_root(&self, session: &Session) -> PathBuf {
        session
            .worktree_path
            .clone()
            .unwrap_or_else(|| self.mirror.mirror_root().to_path_buf())
    }

    /// Files touched by active sessions other than `except`.
    fn files_of_other_sessions(&self, except: &str) -> Result<HashSet<String>, SessionError> {
        Ok(active::load_all(self.mirror.mirror_root())?
            .into_values()
            .filter(|s| s.id != except)
            .flat_map(|s| s.unique_files())
            .collect())
    }

    /// Begin accumulating for `session_id`.
    ///
    /// A failed upstream sync or human-change commit is logged and the
    /// session starts anyway.
    pub fn session_start(
        &mut self,
        session_id: &str,
        topic: Option<&str>,
        use_branching: Option<bool>,
    ) -> Result<StartReport, SessionError> {
        let root = self.mirror.mirror_root().to_path_buf();
        if let Some(existing) = active::get(&root, session_id)? {
            info!(session_id, "session already active");
            let report = StartReport {
                session_id: session_id.to_string(),
                resumed: true,
                branch_name: existing.branch_name.clone(),
                worktree_path: existing.worktree_path.clone(),
                ..StartReport::default()
            };
            self.current = Some(existing);
            return Ok(report);
        }

        let mut report = StartReport {
            session_id: session_id.to_string(),
            ..StartReport::default()
        };
        report.sync = match self.mirror.sync_from_upstream() {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(session_id, error = %err, "upstream sync failed; starting session on stale mirror");
                None
            }
        };

        let others = active::other_active_ids(&root, session_id)?;
        let exclude = self.files_of_other_sessions(session_id)?;
        report.user_commit = self
            .mirror
            .commit_pending_user_changes(&exclude)
            .unwrap_or_else(|err| {
                warn!(session_id, error = %err, "failed to commit human changes");
                None
            });

        let topic = topic
            .map(str::to_string)
            .or_else(|| self.config.session.topic.clone());
        let mut session = Session::new(session_id, topic.clone());

        let branching = use_branching.unwrap_or(self.config.session.use_branching);
        if branching && !others.is_empty() {
            match SessionBranchManager::new(&self.mirror).create_session_branch(session_id, topic.as_deref()) {
                Ok(branch) => {
                    session.branch_name = Some(branch.branch_name);
                    session.worktree_path = Some(PathBuf::from(branch.worktree_path));
                }
                Err(err) => {
                    warn!(session_id, error = %err, "failed to create session branch; using main");
                }
            }
        }
        report.branch_name = session.branch_name.clone();
        report.worktree_path = session.worktree_path.clone();

        active::save(&root, &session)?;
        self.start_monitor(&session);
        info!(
            session_id,
            branch = session.branch_name.as_deref().unwrap_or(constants::MIRROR_MAIN_BRANCH),
            concurrent = others.len(),
            "session started"
        );
        self.current = Some(session);
        Ok(report)
    }

    fn start_monitor(&mut self, session: &Session) {
        if let Some(mut previous) = self.monitor.take() {
            previous.stop();
        }
        let root = self.working_root(session);
        let Some(mut monitor) = TestMonitor::for_session(&root, &self.config.monitor) else {
            return;
        };
        match monitor.start() {
            Ok(()) => self.monitor = Some(monitor),
            Err(err) => warn!(session_id = %session.id, error = %err, "failed to start test monitor"),
        }
    }

    /// Record one assistant edit and mirror the file immediately.
    pub fn accumulate_change(
        &mut self,
        file_path: &Path,
        tool_name: &str,
        tool_input: serde_json::Value,
    ) -> Result<AccumulateOutcome, SessionError> {
        let rel = self.mirror.relative_path(file_path)?;
        let parent = self.mirror.parent_repo_hash();

        let Some(session) = self.current.as_mut() else {
            let root = self.mirror.mirror_root();
            self.mirror.copy_to(&rel, root)?;
            let message = commit_builder::immediate_message(tool_name, &rel, &parent);
            let commit = self
                .mirror
                .adapter()
                .stage_and_commit(root, std::slice::from_ref(&rel), &message)?;
            info!(path = %rel, tool = tool_name, commit = %commit, "committed change outside a session");
            return Ok(AccumulateOutcome::Committed { commit });
        };

        let dest_root = session
            .worktree_path
            .clone()
            .unwrap_or_else(|| self.mirror.mirror_root().to_path_buf());
        let old_content = read_text(&dest_root.join(&rel));
        self.mirror.copy_to(&rel, &dest_root)?;
        let new_content = read_text(&self.mirror.project_root().join(&rel)).unwrap_or_default();

        let record = ChangeRecord::new(ChangeRecordInput {
            session_id: Some(session.id.clone()),
            tool_name: tool_name.to_string(),
            tool_input,
            file_path: self.mirror.project_root().join(&rel),
            relative_path: rel.clone(),
            new_content,
            old_content,
            parent_repo_hash: Some(parent),
        });
        session.record(record);
        active::save(self.mirror.mirror_root(), session)?;

        let outcome = AccumulateOutcome::Recorded {
            session_id: session.id.clone(),
            change_count: session.changes.len(),
        };
        debug!(session_id = %session.id, path = %rel, tool = tool_name, "change recorded");

        if constants::FILE_MODIFYING_TOOLS.contains(&tool_name)
            && let Some(monitor) = &self.monitor
        {
            monitor.trigger(&rel);
        }
        Ok(outcome)
    }

    /// Flush the active session into one commit.
    ///
    /// Session state is cleared before committing, so a failed commit never
    /// leaves a stuck session behind.
    pub fn session_end(&mut self, narration: Option<&str>) -> Result<EndReport, SessionError> {
        let Some(mut session) = self.current.take() else {
            debug!("session end without an active session");
            return Ok(EndReport::default());
        };
        let tests = self.monitor.take().map(|mut monitor| monitor.stop());
        session.ended_at = Some(shadowgit_core::time::now_iso8601());
        let root = self.mirror.mirror_root().to_path_buf();
        if let Err(err) = active::remove(&root, &session.id) {
            warn!(session_id = %session.id, error = %err, "failed to clear active session");
        }

        let mut report = EndReport {
            session_id: Some(session.id.clone()),
            tests,
            ..EndReport::default()
        };
        if session.changes.is_empty() {
            if session.branch_name.is_some()
                && let Err(err) = SessionBranchManager::new(&self.mirror).discard_session_branch(&session.id)
            {
                warn!(session_id = %session.id, error = %err, "failed to discard empty session branch");
            }
            info!(session_id = %session.id, "session ended with no changes");
            return Ok(report);
        }

        let files = session.unique_files();
        let parent = self.mirror.parent_repo_hash();
        let message = commit_builder::build_message(&session, &parent, narration);
        let commit = self
            .mirror
            .adapter()
            .stage_and_commit(&self.working_root(&session), &files, &message)?;
        info!(
            session_id = %session.id,
            commit = %commit,
            files = files.len(),
            changes = session.changes.len(),
            "session committed"
        );

        let mut note_target = commit.clone();
        if session.branch_name.is_some() {
            // The session commit exists from here on; merge errors are reported, not returned.
            let merge = SessionBranchManager::new(&self.mirror)
                .merge_session_branch(&session.id, self.config.session.auto_merge)
                .unwrap_or_else(|err| {
                    warn!(session_id = %session.id, error = %err, "session branch merge failed; branch kept");
                    MergeOutcome::Failed {
                        reason: err.to_string(),
                    }
                });
            if let Some(head) = merge.head() {
                note_target = head.to_string();
            }
            report.merge = Some(merge);
        }

        let note = commit_builder::build_note(&session, &parent);
        if let Err(err) = self
            .mirror
            .adapter()
            .add_note(&root, &note_target, &note.to_json())
        {
            warn!(session_id = %session.id, commit = %note_target, error = %err, "failed to write session note");
        }

        report.commit = Some(commit);
        report.files = files;
        Ok(report)
    }

    /// Human edits not yet in the mirror, ignoring files owned by active sessions.
    pub fn pending_user_changes(&self) -> Result<Vec<String>, SessionError> {
        let exclude = self.files_of_other_sessions("")?;
        self.mirror
            .detect_pending_user_changes(self.mirror.mirror_root(), &exclude)
    }

    pub fn commit_pending_user_changes(&self) -> Result<Option<String>, SessionError> {
        let exclude = self.files_of_other_sessions("")?;
        self.mirror.commit_pending_user_changes(&exclude)
    }

    /// Session-branch metadata, newest first.
    pub fn list_session_branches(&self) -> Result<Vec<SessionBranchEntry>, SessionError> {
        Ok(session_meta::list_newest_first(self.mirror.mirror_root())?)
    }

    pub fn active_sessions(&self) -> Result<Vec<SessionBranchEntry>, SessionError> {
        Ok(self
            .list_session_branches()?
            .into_iter()
            .filter(|entry| entry.branch.status == session_meta::BranchStatus::Active)
            .collect())
    }

    /// Sessions currently accumulating, in any process.
    pub fn tracked_sessions(&self) -> Result<Vec<Session>, SessionError> {
        Ok(active::load_all(self.mirror.mirror_root())?
            .into_values()
            .collect())
    }

    /// Drop unended sessions idle for longer than `session.stale_after_secs`.
    ///
    /// Their uncommitted changes are abandoned, which releases their files to
    /// human-change detection. Session branches are discarded with them.
    pub fn prune_stale_sessions(&self) -> Result<Vec<Session>, SessionError> {
        let max_idle = self.config.session.stale_after_secs;
        if max_idle == 0 {
            return Ok(Vec::new());
        }
        let age = std::time::Duration::from_secs(max_idle);
        let current = self.current.as_ref().map(|s| s.id.clone());
        let dropped = active::remove_where(self.mirror.mirror_root(), |session| {
            current.as_deref() != Some(session.id.as_str())
                && shadowgit_core::time::is_older_than(session.last_activity(), age)
        })?;

        let branches = SessionBranchManager::new(&self.mirror);
        for session in &dropped {
            warn!(
                session_id = %session.id,
                last_activity = session.last_activity(),
                abandoned_changes = session.changes.len(),
                "dropping stale session"
            );
            if session.branch_name.is_some()
                && let Err(err) = branches.discard_session_branch(&session.id)
            {
                warn!(session_id = %session.id, error = %err, "failed to discard stale session branch");
            }
        }
        Ok(dropped)
    }

    pub fn prune_orphaned_worktrees(&self) -> Result<Vec<String>, SessionError> {
        SessionBranchManager::new(&self.mirror).prune_orphaned_worktrees()
    }
}

fn read_text(path: &Path) -> Option<String> {
    std::fs::read(path)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
