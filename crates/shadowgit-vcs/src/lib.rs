pub mod adapter;
pub mod diff;
pub mod git2_adapter;
pub mod passthrough;
pub mod worktree;

pub use adapter::{CommitInfo, ConflictPolicy, MergeOutcome, VcsAdapter};
pub use diff::{DiffEntry, FileChangeKind};
pub use git2_adapter::Git2VcsAdapter;
pub use passthrough::{GitSubcommand, PassthroughOutput};
pub use worktree::{WorktreeManager, normalize_ref_name};
