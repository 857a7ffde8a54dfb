use crate::adapter::{CommitInfo, ConflictPolicy, MergeOutcome, VcsAdapter};
use crate::diff::DiffEntry;
use git2::build::CheckoutBuilder;
use git2::{
    BranchType, CheckoutNotificationType, Commit, DiffFindOptions, DiffOptions, ErrorCode, ObjectType, Oid, Repository,
    RepositoryInitOptions, Signature, Sort, Status, StatusOptions, TreeWalkMode, TreeWalkResult,
    WorktreeAddOptions, WorktreePruneOptions,
};
use shadowgit_core::config::IdentityConfig;
use shadowgit_core::error::VcsError;
use std::cell::RefCell;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct Git2VcsAdapter;

impl Git2VcsAdapter {
    fn open_repo(repo_root: &Path) -> Result<Repository, VcsError> {
        Repository::open(repo_root).map_err(|_| VcsError::NotGitRepo {
            path: repo_root.display().to_string(),
        })
    }

    fn rev_to_oid(repo: &Repository, rev: &str) -> Result<Oid, VcsError> {
        repo.revparse_single(rev)
            .map(|obj| obj.id())
            .map_err(|e| VcsError::GitError(format!("failed to resolve revision `{rev}`: {e}")))
    }

    fn rev_to_commit<'r>(repo: &'r Repository, rev: &str) -> Result<Commit<'r>, VcsError> {
        repo.revparse_single(rev)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| VcsError::GitError(format!("failed to resolve commit `{rev}`: {e}")))
    }

    fn short_ref_name(ref_name: &str) -> &str {
        ref_name.strip_prefix("refs/heads/").unwrap_or(ref_name)
    }

    fn full_branch_ref(branch: &str) -> String {
        if branch.starts_with("refs/") {
            branch.to_string()
        } else {
            format!("refs/heads/{branch}")
        }
    }

    fn signature(repo: &Repository) -> Result<Signature<'static>, VcsError> {
        repo.signature()
            .or_else(|_| Signature::now("shadowgit", "shadowgit@localhost"))
            .map_err(|e| VcsError::git("failed to build commit signature", e))
    }

    fn head_is(repo: &Repository, branch: &str) -> bool {
        repo.head()
            .ok()
            .and_then(|h| h.shorthand().map(str::to_string))
            .is_some_and(|name| name == Self::short_ref_name(branch))
    }

    /// Update the working tree and index to `commit`'s tree while HEAD still
    /// points at the old commit, so unrelated dirty files are kept.
    fn checkout_commit_tree(repo: &Repository, commit: &Commit<'_>) -> Result<(), VcsError> {
        let tree = commit
            .tree()
            .map_err(|e| VcsError::git("failed to load target tree", e))?;
        Self::checkout_safely(repo, &tree)
    }

    /// Safe checkout of `tree`. libgit2 refuses before touching any file when
    /// a dirty path would be overwritten; those paths are reported.
    fn checkout_safely(repo: &Repository, tree: &git2::Tree<'_>) -> Result<(), VcsError> {
        let blocked = RefCell::new(Vec::new());
        let result = {
            let mut checkout = CheckoutBuilder::new();
            checkout
                .safe()
                .recreate_missing(true)
                .notify_on(CheckoutNotificationType::CONFLICT)
                .notify(|_, path, _, _, _| {
                    if let Some(path) = path {
                        blocked.borrow_mut().push(path.to_string_lossy().replace('\\', "/"));
                    }
                    true
                });
            repo.checkout_tree(tree.as_object(), Some(&mut checkout))
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.code() == ErrorCode::Conflict => {
                let mut paths = blocked.into_inner();
                paths.sort();
                paths.dedup();
                Err(VcsError::CheckoutBlocked { paths })
            }
            Err(e) => Err(VcsError::git("failed to update working tree", e)),
        }
    }

    fn index_conflict_paths(index: &git2::Index) -> Result<Vec<String>, VcsError> {
        let mut paths = Vec::new();
        let conflicts = index
            .conflicts()
            .map_err(|e| VcsError::git("failed to read index conflicts", e))?;
        for conflict in conflicts {
            let conflict = conflict.map_err(|e| VcsError::git("failed to read conflict", e))?;
            let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
            if let Some(entry) = entry {
                paths.push(String::from_utf8_lossy(&entry.path).to_string());
            }
        }
        paths.sort();
        paths.dedup();
        Ok(paths)
    }
}

impl VcsAdapter for Git2VcsAdapter {
    fn detect_repo(&self, repo_root: &Path) -> Result<(), VcsError> {
        Self::open_repo(repo_root).map(|_| ())
    }

    fn resolve_head(&self, repo_root: &Path) -> Result<String, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let head = repo
            .head()
            .map_err(|e| VcsError::GitError(format!("failed to read HEAD: {e}")))?;
        let commit = head
            .peel_to_commit()
            .map_err(|e| VcsError::GitError(format!("failed to resolve HEAD commit: {e}")))?;
        Ok(commit.id().to_string())
    }

    fn head_branch(&self, repo_root: &Path) -> Result<String, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let head = repo
            .head()
            .map_err(|e| VcsError::GitError(format!("failed to read HEAD: {e}")))?;
        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| VcsError::GitError("HEAD is detached or unnamed".to_string()))
    }

    fn resolve_ref(&self, repo_root: &Path, rev: &str) -> Result<String, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        Self::rev_to_commit(&repo, rev).map(|c| c.id().to_string())
    }

    fn init_shared_mirror(
        &self,
        primary_root: &Path,
        mirror_root: &Path,
        remote_name: &str,
        identity: &IdentityConfig,
    ) -> Result<(), VcsError> {
        let primary = Self::open_repo(primary_root)?;
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(shadowgit_core::constants::MIRROR_MAIN_BRANCH);
        let repo = Repository::init_opts(mirror_root, &opts)
            .map_err(|e| VcsError::git("failed to create mirror repository", e))?;

        let alternates = repo.path().join("objects").join("info").join("alternates");
        if let Some(parent) = alternates.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VcsError::git("failed to create objects/info", e))?;
        }
        let primary_objects = primary.path().join("objects");
        std::fs::write(&alternates, format!("{}\n", primary_objects.display()))
            .map_err(|e| VcsError::git("failed to link primary object store", e))?;

        let mut config = repo
            .config()
            .map_err(|e| VcsError::git("failed to open mirror config", e))?;
        config
            .set_str("user.name", &identity.name)
            .and_then(|_| config.set_str("user.email", &identity.email))
            .map_err(|e| VcsError::git("failed to set mirror identity", e))?;

        let url = primary_root
            .canonicalize()
            .unwrap_or_else(|_| primary_root.to_path_buf());
        repo.remote(remote_name, &url.to_string_lossy())
            .map_err(|e| VcsError::git("failed to add upstream remote", e))?;
        debug!(mirror = %mirror_root.display(), primary = %url.display(), "mirror repository created");
        Ok(())
    }

    fn fetch(&self, repo_root: &Path, remote_name: &str) -> Result<(), VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let mut remote = repo
            .find_remote(remote_name)
            .map_err(|e| VcsError::git(&format!("failed to find remote `{remote_name}`"), e))?;
        let refspec = format!("+refs/heads/*:refs/remotes/{remote_name}/*");
        remote
            .fetch(&[refspec.as_str()], None, None)
            .map_err(|e| VcsError::git(&format!("failed to fetch `{remote_name}`"), e))
    }

    fn reset_branch_to(&self, repo_root: &Path, branch: &str, rev: &str) -> Result<(), VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let commit = Self::rev_to_commit(&repo, rev)?;
        repo.reference(
            &Self::full_branch_ref(branch),
            commit.id(),
            true,
            &format!("reset to {rev}"),
        )
        .map_err(|e| VcsError::git(&format!("failed to point `{branch}` at `{rev}`"), e))?;
        repo.set_head(&Self::full_branch_ref(branch))
            .map_err(|e| VcsError::git("failed to update HEAD", e))?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.checkout_head(Some(&mut checkout))
            .map_err(|e| VcsError::git("failed to check out HEAD", e))
    }

    fn checkout_branch(&self, repo_root: &Path, branch: &str) -> Result<(), VcsError> {
        let repo = Self::open_repo(repo_root)?;
        if Self::head_is(&repo, branch) {
            return Ok(());
        }
        let commit = Self::rev_to_commit(&repo, &Self::full_branch_ref(branch))?;
        Self::checkout_commit_tree(&repo, &commit)?;
        repo.set_head(&Self::full_branch_ref(branch))
            .map_err(|e| VcsError::git(&format!("failed to check out `{branch}`"), e))
    }

    fn stage_and_commit(
        &self,
        repo_root: &Path,
        paths: &[String],
        message: &str,
    ) -> Result<String, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| VcsError::GitError("repository has no working tree".to_string()))?
            .to_path_buf();
        let mut index = repo
            .index()
            .map_err(|e| VcsError::git("failed to open index", e))?;
        for path in paths {
            let rel = Path::new(path);
            if workdir.join(rel).is_file() {
                index
                    .add_path(rel)
                    .map_err(|e| VcsError::git(&format!("failed to stage `{path}`"), e))?;
            } else if let Err(err) = index.remove_path(rel) {
                debug!(path = %path, error = %err, "nothing to unstage for missing file");
            }
        }
        index
            .write()
            .map_err(|e| VcsError::git("failed to write index", e))?;
        let tree_id = index
            .write_tree()
            .map_err(|e| VcsError::git("failed to write tree", e))?;
        let tree = repo
            .find_tree(tree_id)
            .map_err(|e| VcsError::git("failed to load tree", e))?;

        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let sig = Self::signature(&repo)?;
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .map_err(|e| VcsError::git("failed to create commit", e))?;
        Ok(oid.to_string())
    }

    fn add_note(&self, repo_root: &Path, commit: &str, note: &str) -> Result<(), VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let oid = Self::rev_to_oid(&repo, commit)?;
        let sig = Self::signature(&repo)?;
        repo.note(&sig, &sig, None, oid, note, true)
            .map(|_| ())
            .map_err(|e| VcsError::git("failed to write note", e))
    }

    fn read_note(&self, repo_root: &Path, commit: &str) -> Result<Option<String>, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let oid = Self::rev_to_oid(&repo, commit)?;
        match repo.find_note(None, oid) {
            Ok(note) => Ok(note.message().map(str::to_string)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(VcsError::git("failed to read note", e)),
        }
    }

    fn create_branch(&self, repo_root: &Path, name: &str, from_rev: &str) -> Result<String, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let commit = Self::rev_to_commit(&repo, from_rev)?;
        repo.branch(name, &commit, false)
            .map_err(|e| VcsError::git(&format!("failed to create branch `{name}`"), e))?;
        Ok(commit.id().to_string())
    }

    fn branch_exists(&self, repo_root: &Path, name: &str) -> bool {
        Self::open_repo(repo_root)
            .map(|repo| repo.find_branch(name, BranchType::Local).is_ok())
            .unwrap_or(false)
    }

    fn delete_branch(&self, repo_root: &Path, name: &str) -> Result<(), VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let mut branch = repo
            .find_branch(name, BranchType::Local)
            .map_err(|e| VcsError::git(&format!("failed to find branch `{name}`"), e))?;
        branch
            .delete()
            .map_err(|e| VcsError::git(&format!("failed to delete branch `{name}`"), e))
    }

    fn add_worktree(
        &self,
        repo_root: &Path,
        name: &str,
        branch: &str,
        worktree_path: &Path,
    ) -> Result<(), VcsError> {
        let repo = Self::open_repo(repo_root)?;
        if let Some(parent) = worktree_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VcsError::git("failed to create worktree parent", e))?;
        }
        let full_ref = Self::full_branch_ref(branch);
        let reference = repo.find_reference(&full_ref).map_err(|e| {
            VcsError::GitError(format!("failed to resolve worktree ref `{full_ref}`: {e}"))
        })?;
        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(&reference));
        repo.worktree(name, worktree_path, Some(&opts))
            .map_err(|e| VcsError::GitError(format!("failed to create worktree: {e}")))?;
        Ok(())
    }

    fn remove_worktree(
        &self,
        repo_root: &Path,
        name: &str,
        worktree_path: &Path,
    ) -> Result<(), VcsError> {
        let repo = Self::open_repo(repo_root)?;
        match repo.find_worktree(name) {
            Ok(worktree) => {
                let mut opts = WorktreePruneOptions::new();
                opts.valid(true).locked(true).working_tree(true);
                worktree
                    .prune(Some(&mut opts))
                    .map_err(|e| VcsError::git(&format!("failed to prune worktree `{name}`"), e))?;
            }
            Err(e) => {
                debug!(worktree = %name, error = %e, "worktree not registered; removing directory only");
            }
        }
        match std::fs::remove_dir_all(worktree_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                warn!(
                    worktree = %name,
                    worktree_path = %worktree_path.display(),
                    error = %err,
                    "Failed to remove worktree directory"
                );
                Err(VcsError::git("failed to remove worktree directory", err))
            }
        }
    }

    fn merge_base(
        &self,
        repo_root: &Path,
        base_ref: &str,
        head_ref: &str,
    ) -> Result<String, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let base = Self::rev_to_oid(&repo, base_ref)?;
        let head = Self::rev_to_oid(&repo, head_ref)?;
        let merge_base = repo
            .merge_base(base, head)
            .map_err(|e| VcsError::GitError(format!("failed to compute merge base: {e}")))?;
        Ok(merge_base.to_string())
    }

    fn is_ancestor(
        &self,
        repo_root: &Path,
        ancestor: &str,
        descendant: &str,
    ) -> Result<bool, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let ancestor_oid = Self::rev_to_oid(&repo, ancestor)?;
        let descendant_oid = Self::rev_to_oid(&repo, descendant)?;
        if ancestor_oid == descendant_oid {
            return Ok(true);
        }
        repo.graph_descendant_of(descendant_oid, ancestor_oid)
            .map_err(|e| VcsError::GitError(format!("failed to evaluate ancestry: {e}")))
    }

    fn fast_forward(&self, repo_root: &Path, branch: &str, target: &str) -> Result<(), VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let target_commit = Self::rev_to_commit(&repo, target)?;
        if Self::head_is(&repo, branch) {
            Self::checkout_commit_tree(&repo, &target_commit)?;
        }
        let mut reference = repo
            .find_reference(&Self::full_branch_ref(branch))
            .map_err(|e| VcsError::git(&format!("failed to find branch `{branch}`"), e))?;
        reference
            .set_target(target_commit.id(), &format!("fast-forward to {target}"))
            .map_err(|e| VcsError::git(&format!("failed to advance `{branch}`"), e))?;
        Ok(())
    }

    fn merge_into_head(
        &self,
        repo_root: &Path,
        rev: &str,
        message: &str,
        policy: ConflictPolicy,
    ) -> Result<MergeOutcome, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let theirs = Self::rev_to_commit(&repo, rev)?;
        let annotated = repo
            .find_annotated_commit(theirs.id())
            .map_err(|e| VcsError::git("failed to annotate merge source", e))?;
        let (analysis, _) = repo
            .merge_analysis(&[&annotated])
            .map_err(|e| VcsError::git("failed to analyze merge", e))?;

        if analysis.is_up_to_date() {
            return Ok(MergeOutcome::UpToDate);
        }

        let head_ref = repo
            .head()
            .map_err(|e| VcsError::git("failed to read HEAD", e))?;
        let branch = head_ref
            .name()
            .map(str::to_string)
            .ok_or_else(|| VcsError::GitError("HEAD is detached or unnamed".to_string()))?;

        if analysis.is_fast_forward() {
            Self::checkout_commit_tree(&repo, &theirs)?;
            let mut reference = repo
                .find_reference(&branch)
                .map_err(|e| VcsError::git("failed to find HEAD branch", e))?;
            reference
                .set_target(theirs.id(), &format!("fast-forward to {rev}"))
                .map_err(|e| VcsError::git("failed to fast-forward", e))?;
            return Ok(MergeOutcome::FastForward {
                head: theirs.id().to_string(),
            });
        }

        let ours = head_ref
            .peel_to_commit()
            .map_err(|e| VcsError::git("failed to resolve HEAD commit", e))?;
        let mut merged = repo
            .merge_commits(&ours, &theirs, None)
            .map_err(|e| VcsError::git("failed to merge commits", e))?;

        if merged.has_conflicts() {
            let paths = Self::index_conflict_paths(&merged)?;
            if policy == ConflictPolicy::WriteMarkers {
                let mut checkout = CheckoutBuilder::new();
                checkout.safe().allow_conflicts(true).conflict_style_merge(true);
                repo.merge(&[&annotated], None, Some(&mut checkout))
                    .map_err(|e| VcsError::git("failed to write conflict markers", e))?;
            }
            return Ok(MergeOutcome::Conflicted { paths });
        }

        let tree_id = merged
            .write_tree_to(&repo)
            .map_err(|e| VcsError::git("failed to write merged tree", e))?;
        let tree = repo
            .find_tree(tree_id)
            .map_err(|e| VcsError::git("failed to load merged tree", e))?;
        Self::checkout_safely(&repo, &tree)?;
        let sig = Self::signature(&repo)?;
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&ours, &theirs])
            .map_err(|e| VcsError::git("failed to create merge commit", e))?;
        Ok(MergeOutcome::Merged {
            commit: oid.to_string(),
        })
    }

    fn conflicted_paths(&self, repo_root: &Path) -> Result<Vec<String>, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let index = repo
            .index()
            .map_err(|e| VcsError::git("failed to open index", e))?;
        if !index.has_conflicts() {
            return Ok(Vec::new());
        }
        Self::index_conflict_paths(&index)
    }

    fn status(&self, repo_root: &Path) -> Result<Vec<DiffEntry>, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .renames_head_to_index(true);
        let statuses = repo
            .statuses(Some(&mut opts))
            .map_err(|e| VcsError::git("failed to read status", e))?;

        let mut out = Vec::new();
        for entry in statuses.iter() {
            let Some(path) = entry.path().map(str::to_string) else {
                continue;
            };
            let status = entry.status();
            if status.intersects(Status::INDEX_RENAMED | Status::WT_RENAMED) {
                let old_path = entry
                    .head_to_index()
                    .and_then(|d| d.old_file().path().map(|p| p.to_string_lossy().to_string()))
                    .unwrap_or_else(|| path.clone());
                out.push(DiffEntry::renamed(old_path, path));
            } else if status.contains(Status::WT_NEW) {
                out.push(DiffEntry::untracked(path));
            } else if status.contains(Status::INDEX_NEW) {
                out.push(DiffEntry::added(path));
            } else if status.intersects(Status::INDEX_DELETED | Status::WT_DELETED) {
                out.push(DiffEntry::deleted(path));
            } else if status.intersects(
                Status::INDEX_MODIFIED
                    | Status::WT_MODIFIED
                    | Status::INDEX_TYPECHANGE
                    | Status::WT_TYPECHANGE
                    | Status::CONFLICTED,
            ) {
                out.push(DiffEntry::modified(path));
            }
        }
        Ok(out)
    }

    fn diff_name_status(
        &self,
        repo_root: &Path,
        base_ref: &str,
        head_ref: &str,
    ) -> Result<Vec<DiffEntry>, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let base_tree = Self::rev_to_commit(&repo, base_ref)?
            .tree()
            .map_err(|e| VcsError::GitError(format!("failed to load base tree: {e}")))?;
        let head_tree = Self::rev_to_commit(&repo, head_ref)?
            .tree()
            .map_err(|e| VcsError::GitError(format!("failed to load head tree: {e}")))?;

        let mut diff_opts = DiffOptions::new();
        diff_opts.include_typechange(true).include_untracked(false);
        let mut diff = repo
            .diff_tree_to_tree(Some(&base_tree), Some(&head_tree), Some(&mut diff_opts))
            .map_err(|e| VcsError::GitError(format!("failed to compute diff: {e}")))?;
        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true);
        diff.find_similar(Some(&mut find_opts))
            .map_err(|e| VcsError::GitError(format!("failed to detect renames: {e}")))?;

        let mut out = Vec::new();
        for delta in diff.deltas() {
            let old_path = delta
                .old_file()
                .path()
                .map(|p| p.to_string_lossy().to_string());
            let new_path = delta
                .new_file()
                .path()
                .map(|p| p.to_string_lossy().to_string());

            match delta.status() {
                git2::Delta::Added => {
                    if let Some(path) = new_path {
                        out.push(DiffEntry::added(path));
                    }
                }
                git2::Delta::Deleted => {
                    if let Some(path) = old_path {
                        out.push(DiffEntry::deleted(path));
                    }
                }
                git2::Delta::Renamed => {
                    if let (Some(old_path), Some(new_path)) = (old_path, new_path) {
                        out.push(DiffEntry::renamed(old_path, new_path));
                    }
                }
                _ => {
                    if let Some(path) = new_path.or(old_path) {
                        out.push(DiffEntry::modified(path));
                    }
                }
            }
        }
        Ok(out)
    }

    fn log(
        &self,
        repo_root: &Path,
        rev: &str,
        limit: usize,
        grep: Option<&str>,
    ) -> Result<Vec<CommitInfo>, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let start = Self::rev_to_oid(&repo, rev)?;
        let mut walk = repo
            .revwalk()
            .map_err(|e| VcsError::git("failed to start history walk", e))?;
        walk.push(start)
            .and_then(|_| walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME))
            .map_err(|e| VcsError::git("failed to configure history walk", e))?;

        let mut out = Vec::new();
        for oid in walk {
            if out.len() >= limit {
                break;
            }
            let oid = oid.map_err(|e| VcsError::git("failed to walk history", e))?;
            let commit = repo
                .find_commit(oid)
                .map_err(|e| VcsError::git("failed to load commit", e))?;
            let message = commit.message().unwrap_or_default().to_string();
            if let Some(pattern) = grep
                && !message.contains(pattern)
            {
                continue;
            }
            out.push(CommitInfo {
                id: oid.to_string(),
                summary: commit.summary().unwrap_or_default().to_string(),
                message,
                time: commit.time().seconds(),
            });
        }
        Ok(out)
    }

    fn tracked_files(&self, repo_root: &Path, rev: &str) -> Result<Vec<String>, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let tree = Self::rev_to_commit(&repo, rev)?
            .tree()
            .map_err(|e| VcsError::git("failed to load tree", e))?;
        let mut files = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob)
                && let Some(name) = entry.name()
            {
                files.push(format!("{root}{name}"));
            }
            TreeWalkResult::Ok
        })
        .map_err(|e| VcsError::git("failed to walk tree", e))?;
        Ok(files)
    }

    fn read_blob(
        &self,
        repo_root: &Path,
        rev: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let tree = Self::rev_to_commit(&repo, rev)?
            .tree()
            .map_err(|e| VcsError::git("failed to load tree", e))?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(VcsError::git(&format!("failed to look up `{path}`"), e)),
        };
        let blob = repo
            .find_blob(entry.id())
            .map_err(|e| VcsError::git(&format!("failed to read blob for `{path}`"), e))?;
        Ok(Some(blob.content().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_git_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        std::fs::write(dir.join("src.rs"), "fn main() {}\n").unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new("src.rs")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        {
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = Signature::now("test", "test@example.com").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
                .unwrap();
        }
        repo
    }

    fn commit_file(repo: &Repository, update_ref: &str, rel: &str, content: &str) -> Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        let parent = repo
            .find_reference(update_ref)
            .ok()
            .and_then(|r| r.peel_to_commit().ok())
            .or_else(|| repo.head().ok().and_then(|h| h.peel_to_commit().ok()))
            .unwrap();
        std::fs::write(workdir.join(rel), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(rel)).unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("test", "test@example.com").unwrap();
        repo.commit(Some(update_ref), &sig, &sig, "change", &tree, &[&parent])
            .unwrap()
    }

    #[test]
    fn adapter_core_operations_work_on_basic_repo() {
        let dir = tempfile::tempdir().unwrap();
        let _repo = init_git_repo(dir.path());
        let adapter = Git2VcsAdapter;

        assert!(adapter.detect_repo(dir.path()).is_ok());
        let head = adapter.resolve_head(dir.path()).unwrap();
        assert_eq!(head.len(), 40);
        assert_eq!(
            adapter.tracked_files(dir.path(), "HEAD").unwrap(),
            vec!["src.rs".to_string()]
        );
    }

    #[test]
    fn stage_and_commit_records_files_and_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let _repo = init_git_repo(dir.path());
        let adapter = Git2VcsAdapter;

        std::fs::write(dir.path().join("a.py"), "print('a')\n").unwrap();
        std::fs::remove_file(dir.path().join("src.rs")).unwrap();
        let commit = adapter
            .stage_and_commit(
                dir.path(),
                &["a.py".to_string(), "src.rs".to_string()],
                "assistant: write a.py",
            )
            .unwrap();

        assert_eq!(adapter.resolve_head(dir.path()).unwrap(), commit);
        assert_eq!(
            adapter.tracked_files(dir.path(), &commit).unwrap(),
            vec!["a.py".to_string()]
        );
        let log = adapter.log(dir.path(), "HEAD", 10, Some("assistant:")).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].summary, "assistant: write a.py");
    }

    #[test]
    fn notes_round_trip_and_missing_note_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let _repo = init_git_repo(dir.path());
        let adapter = Git2VcsAdapter;
        let head = adapter.resolve_head(dir.path()).unwrap();

        assert_eq!(adapter.read_note(dir.path(), &head).unwrap(), None);
        adapter
            .add_note(dir.path(), &head, "{\"session_id\":\"s1\"}")
            .unwrap();
        assert_eq!(
            adapter.read_note(dir.path(), &head).unwrap().as_deref(),
            Some("{\"session_id\":\"s1\"}")
        );
    }

    #[test]
    fn merge_base_and_is_ancestor_are_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_git_repo(dir.path());
        let head_commit = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("feat/auth", &head_commit, false).unwrap();
        let tip = commit_file(&repo, "refs/heads/feat/auth", "src.rs", "fn auth() {}\n");

        let adapter = Git2VcsAdapter;
        let mb = adapter
            .merge_base(dir.path(), "HEAD", "refs/heads/feat/auth")
            .unwrap();
        assert_eq!(mb, head_commit.id().to_string());
        assert!(adapter.is_ancestor(dir.path(), &mb, &tip.to_string()).unwrap());
        assert!(!adapter.is_ancestor(dir.path(), &tip.to_string(), &mb).unwrap());
    }

    #[test]
    fn merge_into_head_merges_disjoint_changes() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_git_repo(dir.path());
        let base = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("side", &base, false).unwrap();
        commit_file(&repo, "refs/heads/side", "side.txt", "side\n");
        // Restore the working tree to HEAD before committing on the current branch.
        std::fs::remove_file(dir.path().join("side.txt")).unwrap();
        let mut index = repo.index().unwrap();
        index.read_tree(&base.tree().unwrap()).unwrap();
        index.write().unwrap();
        commit_file(&repo, "HEAD", "main.txt", "main\n");

        let adapter = Git2VcsAdapter;
        let outcome = adapter
            .merge_into_head(dir.path(), "side", "Merge side", ConflictPolicy::Abort)
            .unwrap();
        assert!(matches!(outcome, MergeOutcome::Merged { .. }));
        assert!(dir.path().join("side.txt").exists());
        assert!(dir.path().join("main.txt").exists());
    }

    #[test]
    fn merge_into_head_reports_conflicts_without_touching_tree_on_abort() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_git_repo(dir.path());
        let base = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("side", &base, false).unwrap();
        commit_file(&repo, "refs/heads/side", "src.rs", "fn side() {}\n");
        let mut index = repo.index().unwrap();
        index.read_tree(&base.tree().unwrap()).unwrap();
        index.write().unwrap();
        commit_file(&repo, "HEAD", "src.rs", "fn main_line() {}\n");

        let adapter = Git2VcsAdapter;
        let outcome = adapter
            .merge_into_head(dir.path(), "side", "Merge side", ConflictPolicy::Abort)
            .unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::Conflicted {
                paths: vec!["src.rs".to_string()]
            }
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("src.rs")).unwrap(),
            "fn main_line() {}\n"
        );
    }

    #[test]
    fn fast_forward_over_dirty_file_is_blocked_and_leaves_it_alone() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_git_repo(dir.path());
        let base = repo.head().unwrap().peel_to_commit().unwrap();
        let main = repo.head().unwrap().shorthand().unwrap().to_string();
        repo.branch("side", &base, false).unwrap();
        let side_tip = commit_file(&repo, "refs/heads/side", "src.rs", "fn side() {}\n");
        let mut index = repo.index().unwrap();
        index.read_tree(&base.tree().unwrap()).unwrap();
        index.write().unwrap();
        std::fs::write(dir.path().join("src.rs"), "fn human() {}\n").unwrap();

        let adapter = Git2VcsAdapter;
        let err = adapter
            .fast_forward(dir.path(), &main, &side_tip.to_string())
            .unwrap_err();
        let paths = match err {
            VcsError::CheckoutBlocked { paths } => paths,
            other => panic!("expected a blocked checkout, got {other:?}"),
        };
        assert_eq!(paths, vec!["src.rs".to_string()]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("src.rs")).unwrap(),
            "fn human() {}\n"
        );
        assert_eq!(adapter.resolve_head(dir.path()).unwrap(), base.id().to_string());
    }

    #[test]
    fn worktree_add_and_remove_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let repo_root = dir.path().join("repo");
        std::fs::create_dir_all(&repo_root).unwrap();
        let _repo = init_git_repo(&repo_root);
        let adapter = Git2VcsAdapter;

        adapter.create_branch(&repo_root, "session-x", "HEAD").unwrap();
        let wt = dir.path().join("worktrees").join("session-x");
        adapter
            .add_worktree(&repo_root, "session-x", "session-x", &wt)
            .unwrap();
        assert!(wt.join("src.rs").exists());
        assert_eq!(adapter.head_branch(&wt).unwrap(), "session-x");

        adapter.remove_worktree(&repo_root, "session-x", &wt).unwrap();
        assert!(!wt.exists());
        adapter.delete_branch(&repo_root, "session-x").unwrap();
        assert!(!adapter.branch_exists(&repo_root, "session-x"));
    }

    #[test]
    fn status_reports_modified_and_untracked() {
        let dir = tempfile::tempdir().unwrap();
        let _repo = init_git_repo(dir.path());
        std::fs::write(dir.path().join("src.rs"), "fn changed() {}\n").unwrap();
        std::fs::write(dir.path().join("new.rs"), "fn new() {}\n").unwrap();

        let status = Git2VcsAdapter.status(dir.path()).unwrap();
        assert!(status.contains(&DiffEntry::modified("src.rs")));
        assert!(status.contains(&DiffEntry::untracked("new.rs")));
    }
}
