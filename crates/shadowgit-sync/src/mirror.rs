use crate::commit_builder::{self, SessionNote};
use crate::walk;
use shadowgit_core::config::IdentityConfig;
use shadowgit_core::constants;
use shadowgit_core::error::SessionError;
use shadowgit_state::mirror_config::MirrorConfig;
use shadowgit_vcs::{CommitInfo, ConflictPolicy, Git2VcsAdapter, MergeOutcome, VcsAdapter};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Lines added to the mirror's `info/exclude`.
const MIRROR_EXCLUDES: [&str; 4] = [
    constants::MIRROR_CONFIG_FILE,
    constants::SESSION_METADATA_FILE,
    constants::ACTIVE_SESSIONS_FILE,
    "/sessions/",
];

/// Handle to an initialized mirror. Built once per process and passed to
/// everything that touches the mirror.
#[derive(Debug, Clone)]
pub struct Mirror {
    project_root: PathBuf,
    mirror_root: PathBuf,
    record: MirrorConfig,
    adapter: Git2VcsAdapter,
}

pub fn mirror_root_for(project_root: &Path) -> PathBuf {
    project_root.join(constants::MIRROR_DIR)
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn append_exclude(git_dir: &Path, lines: &[&str]) -> std::io::Result<()> {
    let exclude = git_dir.join("info").join("exclude");
    if let Some(parent) = exclude.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let existing = std::fs::read_to_string(&exclude).unwrap_or_default();
    let mut content = existing.clone();
    for line in lines {
        if !existing.lines().any(|l| l.trim() == *line) {
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str(line);
            content.push('\n');
        }
    }
    if content != existing {
        std::fs::write(&exclude, content)?;
    }
    Ok(())
}

impl Mirror {
    pub fn exists(project_root: &Path) -> bool {
        MirrorConfig::path(&mirror_root_for(project_root)).is_file()
    }

    pub fn open(project_root: &Path) -> Result<Self, SessionError> {
        let project_root = canonical(project_root);
        let mirror_root = mirror_root_for(&project_root);
        let record = MirrorConfig::load(&mirror_root)?.ok_or_else(|| {
            SessionError::NotInitialized {
                path: mirror_root.display().to_string(),
            }
        })?;
        Ok(Self {
            project_root,
            mirror_root,
            record,
            adapter: Git2VcsAdapter,
        })
    }

    /// Create the mirror next to the primary repository.
    ///
    /// Preconditions are checked before anything is written. A failure after
    /// the mirror directory was created removes it again.
    pub fn init(project_root: &Path, identity: &IdentityConfig) -> Result<Self, SessionError> {
        let project_root = canonical(project_root);
        let adapter = Git2VcsAdapter;
        if adapter.detect_repo(&project_root).is_err() || !project_root.join(".git").exists() {
            return Err(SessionError::NoPrimaryRepository {
                path: project_root.display().to_string(),
            });
        }
        let mirror_root = mirror_root_for(&project_root);
        if Self::exists(&project_root) {
            return Err(SessionError::AlreadyInitialized {
                path: mirror_root.display().to_string(),
            });
        }
        if mirror_root.exists() {
            let non_empty = std::fs::read_dir(&mirror_root)?.next().is_some();
            if non_empty {
                return Err(SessionError::TargetNotEmpty {
                    path: mirror_root.display().to_string(),
                });
            }
        }
        let primary_head =
            adapter
                .resolve_head(&project_root)
                .map_err(|_| SessionError::NoPrimaryCommit {
                    path: project_root.display().to_string(),
                })?;
        let upstream_branch = adapter
            .head_branch(&project_root)
            .unwrap_or_else(|_| constants::MIRROR_MAIN_BRANCH.to_string());

        std::fs::create_dir_all(&mirror_root)?;
        match Self::populate(&project_root, &mirror_root, identity, &primary_head, &upstream_branch)
        {
            Ok(record) => {
                info!(
                    mirror = %mirror_root.display(),
                    primary_commit = %primary_head,
                    "mirror initialized"
                );
                Ok(Self {
                    project_root,
                    mirror_root,
                    record,
                    adapter,
                })
            }
            Err(err) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&mirror_root) {
                    warn!(
                        mirror = %mirror_root.display(),
                        error = %cleanup,
                        "Failed to remove partially initialized mirror"
                    );
                }
                Err(err)
            }
        }
    }

    fn populate(
        project_root: &Path,
        mirror_root: &Path,
        identity: &IdentityConfig,
        primary_head: &str,
        upstream_branch: &str,
    ) -> Result<MirrorConfig, SessionError> {
        let adapter = Git2VcsAdapter;
        adapter.init_shared_mirror(project_root, mirror_root, constants::UPSTREAM_REMOTE, identity)?;
        adapter.fetch(mirror_root, constants::UPSTREAM_REMOTE)?;
        let upstream_ref = format!(
            "refs/remotes/{}/{upstream_branch}",
            constants::UPSTREAM_REMOTE
        );
        adapter.reset_branch_to(mirror_root, constants::MIRROR_MAIN_BRANCH, &upstream_ref)?;

        append_exclude(&mirror_root.join(".git"), &MIRROR_EXCLUDES)?;
        append_exclude(
            &project_root.join(".git"),
            &[&format!("/{}/", constants::MIRROR_DIR)],
        )?;

        let record = MirrorConfig::new(project_root, primary_head, upstream_branch);
        record.save(mirror_root)?;
        adapter.stage_and_commit(
            mirror_root,
            &[],
            &format!("Initialize mirror\n\nUpstream-Repo: {primary_head}"),
        )?;
        Ok(record)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn mirror_root(&self) -> &Path {
        &self.mirror_root
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.mirror_root.join(constants::SESSIONS_DIR)
    }

    pub fn record(&self) -> &MirrorConfig {
        &self.record
    }

    pub fn adapter(&self) -> &Git2VcsAdapter {
        &self.adapter
    }

    pub fn primary_head(&self) -> Result<String, SessionError> {
        Ok(self.adapter.resolve_head(&self.project_root)?)
    }

    /// Primary HEAD for provenance lines; `unknown` when it cannot be read.
    pub fn parent_repo_hash(&self) -> String {
        self.primary_head().unwrap_or_else(|err| {
            debug!(error = %err, "primary HEAD unavailable");
            "unknown".to_string()
        })
    }

    /// The primary's current branch, falling back to the one recorded at init.
    pub fn upstream_branch(&self) -> String {
        self.adapter
            .head_branch(&self.project_root)
            .unwrap_or_else(|_| self.record.upstream_branch.clone())
    }

    pub fn upstream_ref(&self) -> String {
        format!(
            "refs/remotes/{}/{}",
            self.record.upstream_remote,
            self.upstream_branch()
        )
    }

    /// Fetch the primary and merge its branch into the mirror's HEAD.
    ///
    /// Conflicts are left as markers in the mirror working tree and reported
    /// as `MergeOutcome::Conflicted`; nothing is discarded.
    pub fn sync_from_upstream(&self) -> Result<MergeOutcome, SessionError> {
        let pending = self.adapter.conflicted_paths(&self.mirror_root)?;
        if !pending.is_empty() {
            warn!(count = pending.len(), "mirror still has unresolved conflicts");
            return Ok(MergeOutcome::Conflicted { paths: pending });
        }
        self.adapter
            .fetch(&self.mirror_root, &self.record.upstream_remote)?;
        let upstream_ref = self.upstream_ref();
        let outcome = self.adapter.merge_into_head(
            &self.mirror_root,
            &upstream_ref,
            &format!("Merge {}/{}", self.record.upstream_remote, self.upstream_branch()),
            ConflictPolicy::WriteMarkers,
        )?;
        match &outcome {
            MergeOutcome::Conflicted { paths } => {
                warn!(files = ?paths, "upstream merge conflicted");
            }
            other => debug!(outcome = ?other, "upstream sync finished"),
        }
        Ok(outcome)
    }

    /// Project-relative path (forward slashes) for `path`, which may be
    /// absolute or relative to the project root and need not exist.
    pub fn relative_path(&self, path: &Path) -> Result<String, SessionError> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        };
        let resolved = match (absolute.parent(), absolute.file_name()) {
            (Some(parent), Some(name)) => canonical(parent).join(name),
            _ => absolute.clone(),
        };
        let outside = || SessionError::PathOutsideProject {
            path: path.display().to_string(),
        };
        let relative = resolved
            .strip_prefix(&self.project_root)
            .map_err(|_| outside())?;
        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir))
            || relative.starts_with(constants::MIRROR_DIR)
        {
            return Err(outside());
        }
        Ok(walk::to_slash(relative))
    }

    /// Copy the primary's current `rel` into `dest_root` (the mirror or a
    /// session worktree). A file deleted in the primary is deleted there too.
    pub fn copy_to(&self, rel: &str, dest_root: &Path) -> Result<bool, SessionError> {
        Ok(walk::mirror_file(&self.project_root, dest_root, rel)?)
    }

    /// Files whose primary working-tree copy differs from the copy under
    /// `against`, plus files tracked there but gone from the primary.
    pub fn detect_pending_user_changes(
        &self,
        against: &Path,
        exclude: &HashSet<String>,
    ) -> Result<Vec<String>, SessionError> {
        let mut changed = Vec::new();
        let mut seen = HashSet::new();
        for rel in walk::project_files(&self.project_root) {
            seen.insert(rel.clone());
            if exclude.contains(&rel) {
                continue;
            }
            if files_differ(&self.project_root.join(&rel), &against.join(&rel)) {
                changed.push(rel);
            }
        }

        for rel in self.adapter.tracked_files(against, "HEAD")? {
            if seen.contains(&rel) || exclude.contains(&rel) {
                continue;
            }
            let hidden = rel.split('/').any(|part| part.starts_with('.'));
            if !hidden && !self.project_root.join(&rel).exists() {
                changed.push(rel);
            }
        }
        changed.sort();
        changed.dedup();
        Ok(changed)
    }

    /// Sync human edits into the mirror and commit them under a `user:`
    /// message. Returns the commit id, or `None` when nothing differed.
    pub fn commit_pending_user_changes(
        &self,
        exclude: &HashSet<String>,
    ) -> Result<Option<String>, SessionError> {
        let changed = self.detect_pending_user_changes(&self.mirror_root, exclude)?;
        if changed.is_empty() {
            return Ok(None);
        }
        for rel in &changed {
            self.copy_to(rel, &self.mirror_root)?;
        }
        let message = commit_builder::user_changes_message(&changed, &self.parent_repo_hash());
        let commit = self
            .adapter
            .stage_and_commit(&self.mirror_root, &changed, &message)?;
        info!(count = changed.len(), commit = %commit, "committed human changes to mirror");
        Ok(Some(commit))
    }

    pub fn commits_for_session(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<CommitInfo>, SessionError> {
        let needle = format!("Session: {session_id}");
        Ok(self
            .adapter
            .log(&self.mirror_root, "HEAD", limit, Some(&needle))?)
    }

    pub fn read_session_note(&self, commit: &str) -> Result<Option<SessionNote>, SessionError> {
        Ok(self
            .adapter
            .read_note(&self.mirror_root, commit)?
            .and_then(|raw| SessionNote::from_json(&raw)))
    }
}

fn files_differ(primary: &Path, mirrored: &Path) -> bool {
    if !mirrored.is_file() {
        return true;
    }
    match (
        shadowgit_core::hash::file_hash(primary),
        shadowgit_core::hash::file_hash(mirrored),
    ) {
        (Ok(a), Ok(b)) => a != b,
        _ => {
            let mtime = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
            mtime(primary) != mtime(mirrored)
        }
    }
}
