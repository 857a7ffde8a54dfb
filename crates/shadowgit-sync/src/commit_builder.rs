use serde::{Deserialize, Serialize};
use shadowgit_core::types::Session;

/// Structured annotation attached to a session commit through git notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNote {
    pub parent_repo: String,
    pub session_id: String,
    pub timestamp: String,
    pub files: Vec<String>,
    pub tools: Vec<String>,
    pub change_count: usize,
}

impl SessionNote {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw.trim()).ok()
    }
}

/// Provenance lines recovered from a mirror commit message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitMetadata {
    pub parent_repo: Option<String>,
    pub session_id: Option<String>,
    pub files: Vec<String>,
    pub changes: Option<usize>,
    pub tool: Option<String>,
}

/// One-line fallback summary, e.g. `Edit, Write on 2 files`.
pub fn summary_line(session: &Session) -> String {
    format!(
        "{} on {} files",
        session.tool_names().join(", "),
        session.unique_files().len()
    )
}

pub fn build_message(session: &Session, parent_repo: &str, narration: Option<&str>) -> String {
    let headline = narration
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| summary_line(session));

    format!(
        "{headline}\n\nParent-Repo: {parent_repo}\nSession: {}\nFiles: {}\nChanges: {}",
        session.id,
        session.unique_files().join(","),
        session.changes.len()
    )
}

pub fn build_note(session: &Session, parent_repo: &str) -> SessionNote {
    SessionNote {
        parent_repo: parent_repo.to_string(),
        session_id: session.id.clone(),
        timestamp: shadowgit_core::time::now_iso8601(),
        files: session.unique_files(),
        tools: session.tool_names(),
        change_count: session.changes.len(),
    }
}

/// Message for an assistant edit seen while no session was active.
pub fn immediate_message(tool_name: &str, relative_path: &str, parent_repo: &str) -> String {
    format!(
        "assistant: {} {relative_path}\n\nParent-Repo: {parent_repo}\nTool: {tool_name}",
        tool_name.to_lowercase()
    )
}

pub fn user_changes_message(files: &[String], parent_repo: &str) -> String {
    format!(
        "user: modified {} files\n\nParent-Repo: {parent_repo}\nFiles: {}",
        files.len(),
        files.join(",")
    )
}

pub fn parse_metadata(message: &str) -> CommitMetadata {
    let mut meta = CommitMetadata::default();
    for line in message.lines() {
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        let value = value.trim();
        match key {
            "Parent-Repo" => meta.parent_repo = Some(value.to_string()),
            "Session" => meta.session_id = Some(value.to_string()),
            "Files" => {
                meta.files = value
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "Changes" => meta.changes = value.parse().ok(),
            "Tool" => meta.tool = Some(value.to_string()),
            _ => {}
        }
    }
    meta
}
