//! Parsing of textual merge-conflict markers.

pub const OURS_MARKER: &str = "<<<<<<<";
pub const SEPARATOR_MARKER: &str = "=======";
pub const THEIRS_MARKER: &str = ">>>>>>>";
const BASE_MARKER: &str = "|||||||";

/// One `<<<<<<< ... ======= ... >>>>>>>` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSection {
    /// Human side (the merge target).
    pub ours: Vec<String>,
    /// Assistant side.
    pub theirs: Vec<String>,
    pub start_marker: String,
    pub end_marker: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Ours,
    Base,
    Theirs,
}

/// Conflict sections in file order. An unterminated block is dropped.
pub fn parse_sections(content: &str) -> Vec<ConflictSection> {
    let mut sections = Vec::new();
    let mut current: Option<(ConflictSection, Side)> = None;

    for line in content.lines() {
        if line.starts_with(OURS_MARKER) {
            current = Some((
                ConflictSection {
                    ours: Vec::new(),
                    theirs: Vec::new(),
                    start_marker: line.to_string(),
                    end_marker: String::new(),
                },
                Side::Ours,
            ));
            continue;
        }
        let Some((section, side)) = current.as_mut() else {
            continue;
        };
        if line.starts_with(BASE_MARKER) {
            *side = Side::Base;
        } else if line.starts_with(SEPARATOR_MARKER) {
            *side = Side::Theirs;
        } else if line.starts_with(THEIRS_MARKER) {
            section.end_marker = line.to_string();
            if let Some((done, _)) = current.take() {
                sections.push(done);
            }
        } else {
            match side {
                Side::Ours => section.ours.push(line.to_string()),
                Side::Theirs => section.theirs.push(line.to_string()),
                Side::Base => {}
            }
        }
    }
    sections
}

/// True when any line still carries a conflict marker.
pub fn has_markers(content: &str) -> bool {
    content.lines().any(is_marker_line)
}

pub fn is_marker_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with(OURS_MARKER)
        || trimmed.starts_with(SEPARATOR_MARKER)
        || trimmed.starts_with(THEIRS_MARKER)
}
