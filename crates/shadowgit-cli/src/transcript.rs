//! Narration for session commits, pulled from the host's JSONL transcript.

use serde_json::Value;
use std::path::Path;
use tracing::debug;

const MAX_THOUGHTS: usize = 5;

fn is_assistant(entry: &Value) -> bool {
    entry.get("type").and_then(Value::as_str) == Some("assistant")
        || entry.get("role").and_then(Value::as_str) == Some("assistant")
        || entry
            .pointer("/message/role")
            .and_then(Value::as_str)
            == Some("assistant")
}

/// Thinking text in one transcript entry. Handles both `thinking` content
/// blocks and older entries flagged `"thinking": true` with text blocks.
fn thoughts(entry: &Value) -> Vec<String> {
    if !is_assistant(entry) {
        return Vec::new();
    }
    let flagged = entry.get("thinking").and_then(Value::as_bool) == Some(true);
    let content = entry
        .pointer("/message/content")
        .or_else(|| entry.get("content"))
        .and_then(Value::as_array);
    let Some(content) = content else {
        return Vec::new();
    };
    content
        .iter()
        .filter_map(|block| match block.get("type").and_then(Value::as_str) {
            Some("thinking") => block.get("thinking").and_then(Value::as_str),
            Some("text") if flagged => block.get("text").and_then(Value::as_str),
            _ => None,
        })
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect()
}

/// Deduplicated thinking text from `raw` JSONL, last five joined by blank
/// lines. Malformed lines are skipped.
pub fn narration_from_jsonl(raw: &str) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(entry) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        for thought in thoughts(&entry) {
            if seen.insert(thought.clone()) {
                unique.push(thought);
            }
        }
    }
    let keep = unique.len().saturating_sub(MAX_THOUGHTS);
    let text = unique[keep..].join("\n\n");
    (!text.is_empty()).then_some(text)
}

pub fn extract_narration(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => narration_from_jsonl(&raw),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "transcript unreadable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line(value: Value) -> String {
        format!("{value}\n")
    }

    #[test]
    fn thinking_blocks_are_collected_in_order() {
        let raw = [
            line(json!({"type": "user", "message": {"content": [{"type": "thinking", "thinking": "not mine"}]}})),
            line(json!({"type": "assistant", "message": {"role": "assistant", "content": [
                {"type": "thinking", "thinking": "Plan the refactor"},
                {"type": "text", "text": "Done."}
            ]}})),
            "not json\n".to_string(),
            line(json!({"type": "assistant", "message": {"content": [{"type": "thinking", "thinking": "Check tests"}]}})),
        ]
        .concat();
        assert_eq!(
            narration_from_jsonl(&raw).as_deref(),
            Some("Plan the refactor\n\nCheck tests")
        );
    }

    #[test]
    fn flagged_text_messages_count_as_thinking() {
        let raw = line(json!({
            "type": "message", "role": "assistant", "thinking": true,
            "content": [{"type": "text", "text": "  Reasoning here  "}]
        }));
        assert_eq!(narration_from_jsonl(&raw).as_deref(), Some("Reasoning here"));
    }

    #[test]
    fn duplicates_dropped_and_last_five_kept() {
        let raw: String = ["a", "b", "a", "c", "d", "e", "f", "g"]
            .iter()
            .map(|t| line(json!({"type": "assistant", "message": {"content": [{"type": "thinking", "thinking": t}]}})))
            .collect();
        assert_eq!(narration_from_jsonl(&raw).as_deref(), Some("c\n\nd\n\ne\n\nf\n\ng"));
    }

    #[test]
    fn missing_or_empty_transcript_has_no_narration() {
        assert_eq!(narration_from_jsonl(""), None);
        assert_eq!(extract_narration(Path::new("/nonexistent/transcript.jsonl")), None);
    }
}
