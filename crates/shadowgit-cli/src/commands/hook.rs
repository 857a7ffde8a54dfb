use super::{find_project_root, open_engine};
use crate::transcript;
use anyhow::{Context, Result};
use serde::Deserialize;
use shadowgit_core::constants;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const UNKNOWN_SESSION: &str = "unknown-session";
const PATH_KEYS: [&str; 3] = ["file_path", "notebook_path", "path"];

/// One hook invocation from the host tool. Keys arrive in either case style.
#[derive(Debug, Default, Deserialize)]
pub struct HookPayload {
    #[serde(alias = "hookEventName")]
    pub hook_event_name: String,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default, alias = "toolName")]
    pub tool_name: Option<String>,
    #[serde(default, alias = "toolInput")]
    pub tool_input: serde_json::Value,
    #[serde(default, alias = "transcriptPath")]
    pub transcript_path: Option<PathBuf>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    SessionStart,
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
    Stop,
    SessionEnd,
}

impl HookEvent {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "SessionStart" => Some(Self::SessionStart),
            "UserPromptSubmit" => Some(Self::UserPromptSubmit),
            "PreToolUse" => Some(Self::PreToolUse),
            "PostToolUse" => Some(Self::PostToolUse),
            "Stop" => Some(Self::Stop),
            "SessionEnd" => Some(Self::SessionEnd),
            _ => None,
        }
    }
}

/// File a tool call touched, from the first non-empty path-like input key.
pub fn tool_file_path(tool_input: &serde_json::Value) -> Option<PathBuf> {
    PATH_KEYS
        .iter()
        .filter_map(|key| tool_input.get(key).and_then(|v| v.as_str()))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}

pub fn run(path: &Path, config_file: Option<&Path>, mut input: impl Read) -> Result<()> {
    let mut raw = String::new();
    input.read_to_string(&mut raw).context("Failed to read hook payload")?;
    let payload: HookPayload = serde_json::from_str(&raw).context("Invalid hook payload")?;
    dispatch(path, config_file, payload)
}

pub fn dispatch(path: &Path, config_file: Option<&Path>, payload: HookPayload) -> Result<()> {
    let Some(event) = HookEvent::parse(&payload.hook_event_name) else {
        debug!(event = %payload.hook_event_name, "ignoring hook event");
        return Ok(());
    };
    let start = payload.cwd.clone().unwrap_or_else(|| path.to_path_buf());
    let Some(project_root) = find_project_root(&start) else {
        debug!(cwd = %start.display(), "no mirror for hook event");
        return Ok(());
    };
    let mut engine = open_engine(&project_root, config_file)?;
    let session_id = payload.session_id.as_deref().unwrap_or(UNKNOWN_SESSION);

    match event {
        HookEvent::SessionStart | HookEvent::UserPromptSubmit | HookEvent::PreToolUse => {
            let report = engine.session_start(session_id, None, None)?;
            if !report.sync_conflicts().is_empty() {
                warn!(
                    session_id,
                    files = ?report.sync_conflicts(),
                    "mirror has unresolved upstream conflicts; run `shadowgit resolve`"
                );
            }
        }
        HookEvent::PostToolUse => {
            let Some(tool) = payload.tool_name.as_deref() else {
                return Ok(());
            };
            if !constants::FILE_MODIFYING_TOOLS.contains(&tool) {
                debug!(tool, "tool does not modify files");
                return Ok(());
            }
            let Some(file) = tool_file_path(&payload.tool_input) else {
                warn!(tool, "tool input has no file path");
                return Ok(());
            };
            let file = if file.is_relative() {
                start.join(file)
            } else {
                file
            };
            engine.resume(Some(session_id))?;
            let outcome = engine.accumulate_change(&file, tool, payload.tool_input)?;
            debug!(outcome = ?outcome, "change accumulated");
        }
        HookEvent::Stop | HookEvent::SessionEnd => {
            if engine.resume(Some(session_id))?.is_none() {
                debug!(session_id, "stop without an active session");
                return Ok(());
            }
            let narration = payload
                .transcript_path
                .as_deref()
                .and_then(transcript::extract_narration);
            let report = engine.session_end(narration.as_deref())?;
            info!(session_id, commit = ?report.commit, "session ended from hook");
        }
    }
    Ok(())
}
