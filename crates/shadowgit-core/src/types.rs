use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kind of file modification performed by an assistant tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    EditInPlace,
    FullWrite,
    MultiRegionEdit,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EditInPlace => "edit",
            Self::FullWrite => "write",
            Self::MultiRegionEdit => "multi_edit",
        }
    }

    /// Map a host tool name onto a change kind.
    pub fn from_tool_name(tool_name: &str) -> Self {
        match tool_name {
            "Edit" => Self::EditInPlace,
            "MultiEdit" => Self::MultiRegionEdit,
            _ => Self::FullWrite,
        }
    }
}

/// One assistant-initiated edit to one file.
///
/// Records are never mutated after construction; a correction is a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    id: String,
    session_id: Option<String>,
    timestamp: String,
    kind: ChangeKind,
    tool_name: String,
    file_path: PathBuf,
    relative_path: String,
    old_string: Option<String>,
    new_string: Option<String>,
    old_content: Option<String>,
    new_content: String,
    tool_input: serde_json::Value,
    parent_repo_hash: Option<String>,
}

/// Inputs for [`ChangeRecord::new`].
#[derive(Debug, Clone)]
pub struct ChangeRecordInput {
    pub session_id: Option<String>,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    pub file_path: PathBuf,
    pub relative_path: String,
    pub new_content: String,
    pub old_content: Option<String>,
    pub parent_repo_hash: Option<String>,
}

impl ChangeRecord {
    pub fn new(input: ChangeRecordInput) -> Self {
        let kind = ChangeKind::from_tool_name(&input.tool_name);
        let (old_string, new_string) = match kind {
            ChangeKind::EditInPlace => (
                json_str(&input.tool_input, "old_string"),
                json_str(&input.tool_input, "new_string"),
            ),
            _ => (None, None),
        };
        Self {
            id: crate::ids::new_id(),
            session_id: input.session_id,
            timestamp: crate::time::now_iso8601(),
            kind,
            tool_name: input.tool_name,
            file_path: input.file_path,
            relative_path: input.relative_path,
            old_string,
            new_string,
            old_content: input.old_content,
            new_content: input.new_content,
            tool_input: input.tool_input,
            parent_repo_hash: input.parent_repo_hash,
        }
    }

    /// Rebuild a record from a committed snapshot, keeping the commit's
    /// timestamp instead of stamping a new one.
    pub fn from_snapshot(input: ChangeRecordInput, timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            ..Self::new(input)
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }
    pub fn old_string(&self) -> Option<&str> {
        self.old_string.as_deref()
    }
    pub fn new_string(&self) -> Option<&str> {
        self.new_string.as_deref()
    }
    pub fn old_content(&self) -> Option<&str> {
        self.old_content.as_deref()
    }
    /// Full file content right after the edit.
    pub fn new_content(&self) -> &str {
        &self.new_content
    }
    pub fn tool_input(&self) -> &serde_json::Value {
        &self.tool_input
    }
    pub fn parent_repo_hash(&self) -> Option<&str> {
        self.parent_repo_hash.as_deref()
    }
}

fn json_str(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// A bounded period of assistant work whose changes are committed together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub started_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub changes: Vec<ChangeRecord>,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub worktree_path: Option<PathBuf>,
}

impl Session {
    pub fn new(id: impl Into<String>, topic: Option<String>) -> Self {
        Self {
            id: id.into(),
            started_at: crate::time::now_iso8601(),
            ended_at: None,
            topic,
            changes: Vec::new(),
            branch_name: None,
            worktree_path: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Timestamp of the latest recorded change, or the start when there is none.
    pub fn last_activity(&self) -> &str {
        self.changes
            .last()
            .map(ChangeRecord::timestamp)
            .unwrap_or(self.started_at.as_str())
    }

    pub fn record(&mut self, change: ChangeRecord) {
        self.changes.push(change);
    }

    /// Relative paths touched by this session, de-duplicated in first-seen order.
    pub fn unique_files(&self) -> Vec<String> {
        dedup_in_order(self.changes.iter().map(|c| c.relative_path().to_string()))
    }

    /// Tool names used by this session, de-duplicated in first-seen order.
    pub fn tool_names(&self) -> Vec<String> {
        dedup_in_order(self.changes.iter().map(|c| c.tool_name().to_string()))
    }
}

pub fn dedup_in_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
