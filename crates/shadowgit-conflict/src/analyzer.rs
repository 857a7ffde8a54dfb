use serde::Serialize;
use shadowgit_core::error::SessionError;
use shadowgit_core::types::{ChangeKind, ChangeRecord, ChangeRecordInput};
use shadowgit_core::{constants, time};
use shadowgit_sync::Mirror;
use shadowgit_sync::commit_builder::{self, CommitMetadata};
use shadowgit_vcs::{CommitInfo, VcsAdapter};
use similar::{ChangeTag, TextDiff};
use tracing::{debug, warn};

const REVERT_RATIO_THRESHOLD: f64 = 0.8;
const DIFF_CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Unchanged,
    UserModified,
    FileNotFound,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::UserModified => "user_modified",
            Self::FileNotFound => "file_not_found",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Imports,
    Comments,
    Structure,
    OtherAdditions,
    Removals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditPattern {
    pub kind: PatternKind,
    pub count: usize,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.9 {
            Self::High
        } else if ratio >= 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Whether an assistant edit can be reverted without discarding human work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevertAssessment {
    pub can_revert: bool,
    pub unchanged_lines: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
    pub total_changes: usize,
    pub unchanged_ratio: f64,
    pub confidence: Confidence,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeAnalysis {
    pub record_id: String,
    pub relative_path: String,
    pub tool_name: String,
    pub commit: Option<String>,
    pub commit_time: Option<String>,
    pub status: ChangeStatus,
    pub has_conflicts: bool,
    pub diff_lines: Vec<String>,
    pub patterns: Vec<EditPattern>,
    pub notes: Vec<String>,
    pub revert: RevertAssessment,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisSummary {
    pub total: usize,
    pub intact: usize,
    pub user_modified: usize,
    pub not_found: usize,
    pub conflicts: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecentAnalysis {
    pub summary: AnalysisSummary,
    pub changes: Vec<ChangeAnalysis>,
}

#[derive(Debug, Default)]
struct LineCounts {
    unchanged: usize,
    added: usize,
    removed: usize,
}

fn line_counts<'a>(diff: &TextDiff<'a, 'a, 'a, str>) -> LineCounts {
    let mut counts = LineCounts::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Equal => counts.unchanged += 1,
            ChangeTag::Insert => counts.added += 1,
            ChangeTag::Delete => counts.removed += 1,
        }
    }
    counts
}

/// Classify one recorded change against the file's current bytes
/// (`None` when the file is gone).
pub fn analyze(record: &ChangeRecord, current: Option<&[u8]>) -> ChangeAnalysis {
    let mut analysis = ChangeAnalysis {
        record_id: record.id().to_string(),
        relative_path: record.relative_path().to_string(),
        tool_name: record.tool_name().to_string(),
        commit: None,
        commit_time: None,
        status: ChangeStatus::Unchanged,
        has_conflicts: false,
        diff_lines: Vec::new(),
        patterns: Vec::new(),
        notes: Vec::new(),
        revert: RevertAssessment {
            can_revert: true,
            unchanged_lines: record.new_content().lines().count(),
            lines_added: 0,
            lines_removed: 0,
            total_changes: 0,
            unchanged_ratio: 1.0,
            confidence: Confidence::High,
            warnings: Vec::new(),
        },
    };

    let Some(current) = current else {
        analysis.status = ChangeStatus::FileNotFound;
        analysis.diff_lines = vec![format!("File {} no longer exists", record.relative_path())];
        analysis.revert = RevertAssessment {
            can_revert: false,
            unchanged_lines: 0,
            lines_added: 0,
            lines_removed: 0,
            total_changes: 0,
            unchanged_ratio: 0.0,
            confidence: Confidence::Low,
            warnings: vec!["File no longer exists; cannot revert".to_string()],
        };
        return analysis;
    };

    if current == record.new_content().as_bytes() {
        analysis.diff_lines = vec![format!(
            "File {} unchanged since the assistant's edit",
            record.relative_path()
        )];
        return analysis;
    }

    let current = String::from_utf8_lossy(current);
    analysis.status = ChangeStatus::UserModified;
    let diff = TextDiff::from_lines(record.new_content(), current.as_ref());
    analysis.diff_lines = diff
        .unified_diff()
        .context_radius(DIFF_CONTEXT_LINES)
        .header("assistant", "current")
        .to_string()
        .lines()
        .map(str::to_string)
        .collect();
    analysis.patterns = detect_patterns(&diff);

    let counts = line_counts(&diff);
    analysis.revert = assess_revert(&counts);

    let mut edit_gone = false;
    if record.kind() == ChangeKind::EditInPlace
        && let (Some(old), Some(new)) = (record.old_string(), record.new_string())
        && !new.is_empty()
        && !current.contains(new)
    {
        edit_gone = true;
        analysis.notes.push("Assistant's change not found in current file".to_string());
        if !old.is_empty() && current.contains(old) {
            analysis.notes.push("Original content appears restored".to_string());
        }
    }
    analysis.has_conflicts = edit_gone || !analysis.revert.can_revert;
    analysis
}

fn assess_revert(counts: &LineCounts) -> RevertAssessment {
    let total_changes = counts.added + counts.removed;
    let denominator = counts.unchanged + total_changes;
    let unchanged_ratio = if denominator == 0 {
        0.0
    } else {
        counts.unchanged as f64 / denominator as f64
    };
    let mut warnings = Vec::new();
    if total_changes > 0 {
        warnings.push(format!(
            "Reverting will discard {total_changes} human-changed lines"
        ));
    }
    RevertAssessment {
        can_revert: unchanged_ratio >= REVERT_RATIO_THRESHOLD,
        unchanged_lines: counts.unchanged,
        lines_added: counts.added,
        lines_removed: counts.removed,
        total_changes,
        unchanged_ratio,
        confidence: Confidence::from_ratio(unchanged_ratio),
        warnings,
    }
}

fn is_import(line: &str) -> bool {
    ["import ", "from ", "use ", "#include", "require("]
        .iter()
        .any(|p| line.starts_with(p))
}

fn is_comment(line: &str) -> bool {
    ["#", "//", "/*", "*", "--"].iter().any(|p| line.starts_with(p)) && !line.starts_with("#include")
}

fn is_structure(line: &str) -> bool {
    const QUALIFIERS: [&str; 5] = ["pub", "async", "export", "public", "static"];
    const KEYWORDS: [&str; 10] = [
        "fn", "def", "class", "struct", "impl", "enum", "interface", "trait", "func", "function",
    ];
    line.split_whitespace()
        .map(|word| word.split(['(', '<', ':', '{']).next().unwrap_or(word))
        .find(|word| !QUALIFIERS.contains(word))
        .is_some_and(|word| KEYWORDS.contains(&word))
}

/// Coarse classification of the human's delta.
pub fn detect_patterns<'a>(diff: &TextDiff<'a, 'a, 'a, str>) -> Vec<EditPattern> {
    let (mut imports, mut comments, mut structure, mut other, mut removed) = (0, 0, 0, 0, 0);
    for change in diff.iter_all_changes() {
        let line = change.value().trim();
        match change.tag() {
            ChangeTag::Equal => {}
            ChangeTag::Delete => removed += 1,
            ChangeTag::Insert if line.is_empty() => {}
            ChangeTag::Insert if is_import(line) => imports += 1,
            ChangeTag::Insert if is_comment(line) => comments += 1,
            ChangeTag::Insert if is_structure(line) => structure += 1,
            ChangeTag::Insert => other += 1,
        }
    }

    [
        (PatternKind::Imports, imports, "User added {} import statements"),
        (PatternKind::Comments, comments, "User added {} comments"),
        (PatternKind::Structure, structure, "User added {} structural definitions"),
        (PatternKind::OtherAdditions, other, "User added {} other lines"),
        (PatternKind::Removals, removed, "User removed {} lines"),
    ]
    .into_iter()
    .filter(|(_, count, _)| *count > 0)
    .map(|(kind, count, template)| EditPattern {
        kind,
        count,
        description: template.replace("{}", &count.to_string()),
    })
    .collect()
}

/// Classify `record` against the primary working tree.
pub fn analyze_in_project(mirror: &Mirror, record: &ChangeRecord) -> ChangeAnalysis {
    let current = std::fs::read(mirror.project_root().join(record.relative_path())).ok();
    analyze(record, current.as_deref())
}

fn is_assistant_commit(meta: &CommitMetadata) -> bool {
    meta.session_id.is_some() || meta.tool.is_some()
}

/// Files touched by an assistant commit. Immediate commits name their file
/// in the headline instead of a `Files:` line.
fn commit_files(commit: &CommitInfo, meta: &CommitMetadata) -> Vec<String> {
    if !meta.files.is_empty() {
        return meta.files.clone();
    }
    commit
        .summary
        .strip_prefix("assistant: ")
        .and_then(|rest| rest.split_once(' '))
        .map(|(_, path)| vec![path.to_string()])
        .unwrap_or_default()
}

fn read_text(mirror: &Mirror, rev: &str, path: &str) -> Option<String> {
    match mirror.adapter().read_blob(mirror.mirror_root(), rev, path) {
        Ok(blob) => blob.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) => {
            debug!(rev, path, error = %err, "blob unavailable");
            None
        }
    }
}

/// Rebuild change records from the newest `limit` assistant commits on the
/// mirror and classify each against the primary working tree.
pub fn analyze_recent(mirror: &Mirror, limit: usize) -> Result<RecentAnalysis, SessionError> {
    let history = mirror.adapter().log(
        mirror.mirror_root(),
        constants::MIRROR_MAIN_BRANCH,
        limit.saturating_mul(4),
        None,
    )?;

    let mut result = RecentAnalysis::default();
    for (commit, meta) in history
        .iter()
        .filter_map(|c| {
            let meta = commit_builder::parse_metadata(&c.message);
            is_assistant_commit(&meta).then_some((c, meta))
        })
        .take(limit)
    {
        let commit_time = time::format_unix_seconds(commit.time);
        for rel in commit_files(commit, &meta) {
            let Some(new_content) = read_text(mirror, &commit.id, &rel) else {
                warn!(commit = %commit.id, path = %rel, "file missing from its own commit; skipping");
                continue;
            };
            let record = ChangeRecord::from_snapshot(
                ChangeRecordInput {
                    session_id: meta.session_id.clone(),
                    tool_name: meta.tool.clone().unwrap_or_else(|| "Write".to_string()),
                    tool_input: serde_json::Value::Null,
                    file_path: mirror.project_root().join(&rel),
                    relative_path: rel.clone(),
                    new_content,
                    old_content: read_text(mirror, &format!("{}^", commit.id), &rel),
                    parent_repo_hash: meta.parent_repo.clone(),
                },
                commit_time.clone(),
            );
            let mut analysis = analyze_in_project(mirror, &record);
            analysis.commit = Some(commit.id.clone());
            analysis.commit_time = Some(commit_time.clone());
            tally(&mut result.summary, &analysis);
            result.changes.push(analysis);
        }
    }
    Ok(result)
}

fn tally(summary: &mut AnalysisSummary, analysis: &ChangeAnalysis) {
    summary.total += 1;
    match analysis.status {
        ChangeStatus::Unchanged => summary.intact += 1,
        ChangeStatus::UserModified => summary.user_modified += 1,
        ChangeStatus::FileNotFound => summary.not_found += 1,
    }
    if analysis.has_conflicts {
        summary.conflicts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn record(tool: &str, content: &str, input: serde_json::Value) -> ChangeRecord {
        ChangeRecord::new(ChangeRecordInput {
            session_id: Some("s1".into()),
            tool_name: tool.into(),
            tool_input: input,
            file_path: PathBuf::from("/p/x.py"),
            relative_path: "x.py".into(),
            new_content: content.into(),
            old_content: None,
            parent_repo_hash: Some("h".into()),
        })
    }

    #[test]
    fn identical_content_is_unchanged() {
        let r = record("Write", "v1\n", json!({}));
        let analysis = analyze(&r, Some(b"v1\n"));
        assert_eq!(analysis.status, ChangeStatus::Unchanged);
        assert!(analysis.revert.can_revert);
        assert_eq!(analysis.revert.confidence, Confidence::High);
        assert!(!analysis.has_conflicts);
    }

    #[test]
    fn any_byte_difference_is_user_modified_with_diff() {
        let r = record("Write", "v1", json!({}));
        let analysis = analyze(&r, Some(b"v2"));
        assert_eq!(analysis.status, ChangeStatus::UserModified);
        assert!(analysis.diff_lines.iter().any(|l| l == "-v1"));
        assert!(analysis.diff_lines.iter().any(|l| l == "+v2"));
        assert!(!analysis.revert.can_revert);
        assert_eq!(analysis.revert.lines_added, 1);
        assert_eq!(analysis.revert.lines_removed, 1);
    }

    #[test]
    fn missing_file_cannot_be_reverted() {
        let r = record("Write", "v1\n", json!({}));
        let analysis = analyze(&r, None);
        assert_eq!(analysis.status, ChangeStatus::FileNotFound);
        assert!(analysis.diff_lines[0].contains("no longer exists"));
        assert!(!analysis.revert.can_revert);
    }

    #[test]
    fn small_additions_keep_revert_feasible() {
        let base: String = (0..20).map(|i| format!("line {i}\n")).collect();
        let r = record("Write", &base, json!({}));
        let current = format!("import os\n# note\n{base}");
        let analysis = analyze(&r, Some(current.as_bytes()));
        assert!(analysis.revert.can_revert);
        assert_eq!(analysis.revert.unchanged_lines, 20);
        assert_eq!(analysis.revert.confidence, Confidence::High);
        let kinds: Vec<PatternKind> = analysis.patterns.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PatternKind::Imports, PatternKind::Comments]);
        assert_eq!(analysis.patterns[0].description, "User added 1 import statements");
    }

    #[test]
    fn restored_original_is_flagged() {
        let r = record(
            "Edit",
            "x = new_value\n",
            json!({"old_string": "old_value", "new_string": "new_value"}),
        );
        let analysis = analyze(&r, Some(b"x = old_value\n"));
        assert!(analysis.has_conflicts);
        assert!(analysis.notes.iter().any(|n| n == "Original content appears restored"));
    }

    #[test]
    fn patterns_come_from_a_diff_over_owned_buffers() {
        let assistant = String::from("def run():\n    pass\n");
        let current = format!("import sys\n{assistant}class Extra:\n    pass\n");
        let diff = TextDiff::from_lines(assistant.as_str(), current.as_str());
        let kinds: Vec<PatternKind> = detect_patterns(&diff).iter().map(|p| p.kind).collect();
        assert!(kinds.contains(&PatternKind::Imports));
        assert_eq!(line_counts(&diff).unchanged, 2);
    }

    #[test]
    fn structural_lines_are_recognized() {
        assert!(is_structure("pub fn run() {"));
        assert!(is_structure("async def handler(request):"));
        assert!(is_structure("pub(crate) struct Foo;"));
        assert!(is_structure("class Foo:"));
        assert!(!is_structure("x = define()"));
    }
}
