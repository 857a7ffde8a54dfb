use serde::{Deserialize, Serialize};

/// How a path differs between two trees, or between a tree and the workdir.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed { old_path: String },
    Untracked,
}

impl FileChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed { .. } => "renamed",
            Self::Untracked => "untracked",
        }
    }
}

/// One changed path, always repo-relative with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: String,
    pub kind: FileChangeKind,
}

impl DiffEntry {
    pub fn new(path: impl Into<String>, kind: FileChangeKind) -> Self {
        Self { path: path.into(), kind }
    }

    pub fn added(path: impl Into<String>) -> Self {
        Self::new(path, FileChangeKind::Added)
    }

    pub fn modified(path: impl Into<String>) -> Self {
        Self::new(path, FileChangeKind::Modified)
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self::new(path, FileChangeKind::Deleted)
    }

    pub fn untracked(path: impl Into<String>) -> Self {
        Self::new(path, FileChangeKind::Untracked)
    }

    pub fn renamed(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        let old_path = old_path.into();
        Self::new(new_path, FileChangeKind::Renamed { old_path })
    }
}
