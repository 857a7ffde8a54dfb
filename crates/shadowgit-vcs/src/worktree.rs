use crate::adapter::VcsAdapter;
use shadowgit_core::error::VcsError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Owns the per-session checkouts under a single directory of the mirror.
pub struct WorktreeManager<A: VcsAdapter> {
    mirror_root: PathBuf,
    checkouts_dir: PathBuf,
    adapter: A,
}

impl<A: VcsAdapter> WorktreeManager<A> {
    pub fn new(mirror_root: impl Into<PathBuf>, checkouts_dir: impl Into<PathBuf>, adapter: A) -> Self {
        Self {
            mirror_root: mirror_root.into(),
            checkouts_dir: checkouts_dir.into(),
            adapter,
        }
    }

    pub fn worktrees_root(&self) -> &Path {
        &self.checkouts_dir
    }

    /// Directory a branch is (or would be) checked out into.
    pub fn worktree_path_for_ref(&self, branch: &str) -> PathBuf {
        self.checkouts_dir.join(normalize_ref_name(branch))
    }

    // Never hand the mirror's own checkout to a destructive call.
    fn is_mirror_checkout(&self, dir: &Path) -> bool {
        let canonical = |p: &Path| p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
        canonical(dir) == canonical(self.mirror_root.as_path())
    }

    /// Check out `branch` into its own directory. An existing checkout is reused.
    pub fn create(&self, branch: &str) -> Result<PathBuf, VcsError> {
        let dir = self.worktree_path_for_ref(branch);
        if dir.join(".git").exists() {
            debug!(branch, checkout = %dir.display(), "session checkout already present");
        } else {
            let name = normalize_ref_name(branch);
            self.adapter.add_worktree(&self.mirror_root, &name, branch, &dir)?;
        }
        Ok(dir)
    }

    pub fn remove(&self, branch: &str) -> Result<(), VcsError> {
        let dir = self.worktree_path_for_ref(branch);
        if self.is_mirror_checkout(&dir) {
            return Ok(());
        }
        let name = normalize_ref_name(branch);
        self.adapter.remove_worktree(&self.mirror_root, &name, &dir)
    }

    /// Remove checkout directories whose branch is not in `keep`.
    /// Returns the sorted directory names that were removed.
    pub fn prune_orphans(&self, keep: &[String]) -> Vec<String> {
        let listing = match std::fs::read_dir(&self.checkouts_dir) {
            Ok(listing) => listing,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!(dir = %self.checkouts_dir.display(), error = %err, "cannot list session checkouts");
                }
                return Vec::new();
            }
        };
        let kept: Vec<String> = keep.iter().map(|branch| normalize_ref_name(branch)).collect();

        let mut removed: Vec<String> = listing
            .flatten()
            .map(|entry| (entry.file_name().to_string_lossy().into_owned(), entry.path()))
            .filter(|(name, dir)| dir.is_dir() && !kept.contains(name) && !self.is_mirror_checkout(dir))
            .filter_map(|(name, dir)| match self.adapter.remove_worktree(&self.mirror_root, &name, &dir) {
                Ok(()) => Some(name),
                Err(err) => {
                    warn!(checkout = %dir.display(), error = %err, "orphaned checkout left in place");
                    None
                }
            })
            .collect();
        removed.sort();
        removed
    }
}

/// Map a branch name onto a single safe path component.
pub fn normalize_ref_name(branch: &str) -> String {
    let mapped: String = branch
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '-',
        })
        .collect();
    mapped.trim_matches('-').to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git2_adapter::Git2VcsAdapter;
    use git2::{Repository, Signature};

    fn repo_with_branch(dir: &Path, branch: &str) {
        let repo = Repository::init(dir).unwrap();
        std::fs::write(dir.join("app.py"), "print('hi')\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("app.py")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("test", "test@example.com").unwrap();
        let oid = repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[]).unwrap();
        let commit = repo.find_commit(oid).unwrap();
        repo.branch(branch, &commit, false).unwrap();
    }

    #[test]
    fn branch_names_become_single_path_components() {
        assert_eq!(normalize_ref_name("topic/auth fix#2"), "topic-auth-fix-2");
        assert_eq!(normalize_ref_name("/leading"), "leading");
        assert_eq!(normalize_ref_name("session-20260102-030405-ab12cd"), "session-20260102-030405-ab12cd");
    }

    #[test]
    fn checkout_is_created_reused_and_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("mirror");
        std::fs::create_dir_all(&root).unwrap();
        repo_with_branch(&root, "session-a");

        let manager = WorktreeManager::new(&root, tmp.path().join("sessions"), Git2VcsAdapter);
        let dir = manager.create("session-a").unwrap();
        assert!(dir.join("app.py").exists());
        assert_eq!(manager.create("session-a").unwrap(), dir);

        manager.remove("session-a").unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn prune_spares_listed_branches() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("mirror");
        std::fs::create_dir_all(&root).unwrap();
        repo_with_branch(&root, "session-keep");

        let sessions = tmp.path().join("sessions");
        let manager = WorktreeManager::new(&root, &sessions, Git2VcsAdapter);
        let kept = manager.create("session-keep").unwrap();
        std::fs::create_dir_all(sessions.join("session-gone")).unwrap();

        assert_eq!(manager.prune_orphans(&["session-keep".to_string()]), vec!["session-gone"]);
        assert!(kept.exists());
        assert!(!sessions.join("session-gone").exists());
    }

    #[test]
    fn prune_without_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = WorktreeManager::new(tmp.path(), tmp.path().join("missing"), Git2VcsAdapter);
        assert!(manager.prune_orphans(&[]).is_empty());
    }
}
