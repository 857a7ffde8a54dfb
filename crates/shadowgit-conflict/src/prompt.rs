use crate::markers::{self, ConflictSection};
use shadowgit_core::languages;
use std::path::Path;

const CONTEXT_PREFIXES: [&str; 14] = [
    "import ",
    "from ",
    "use ",
    "class ",
    "def ",
    "async def ",
    "fn ",
    "pub fn ",
    "func ",
    "function ",
    "#",
    "//",
    "/*",
    "/**",
];

/// Imports, definitions and comments from `content`, at most `max_lines`.
pub fn extract_context(content: &str, max_lines: usize) -> String {
    content
        .lines()
        .filter(|line| !markers::is_marker_line(line))
        .filter(|line| {
            let trimmed = line.trim_start();
            CONTEXT_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        })
        .take(max_lines)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_sections(sections: &[ConflictSection]) -> String {
    if sections.is_empty() {
        return "No conflicts detected".to_string();
    }
    sections
        .iter()
        .enumerate()
        .map(|(i, section)| {
            format!(
                "Conflict {}:\nUSER'S CODE (must be preserved):\n{}\n\nAI'S CODE (integrate if compatible):\n{}\n",
                i + 1,
                section.ours.join("\n"),
                section.theirs.join("\n")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolution request for one conflicted file.
pub fn build_prompt(relative_path: &str, content: &str, max_context_lines: usize) -> String {
    let language = languages::detect_language(Path::new(relative_path));
    let sections = markers::parse_sections(content);
    format!(
        "MERGE CONFLICT RESOLUTION TASK\n\
\n\
You are resolving a merge conflict between a human developer and an AI assistant.\n\
\n\
File: {relative_path}\n\
Language: {language}\n\
\n\
RULES:\n\
1. USER CHANGES ALWAYS WIN. Preserve the user's code and decisions.\n\
2. Fold in AI logic only where it is compatible with the user's code.\n\
3. The result must be syntactically valid {language}.\n\
4. The result must not contain any conflict markers.\n\
\n\
File context:\n\
{context}\n\
\n\
Conflict details:\n\
{sections}\n\
Current conflicted content:\n\
```{language}\n\
{content}\n\
```\n\
\n\
OUTPUT ONLY the resolved file content, with no explanation.\n",
        context = extract_context(content, max_context_lines),
        sections = format_sections(&sections),
    )
}

/// Strip a single markdown code fence wrapped around the whole output.
pub fn unwrap_code_fence(output: &str) -> String {
    let trimmed = output.trim();
    let mut lines: Vec<&str> = trimmed.lines().collect();
    let fenced = lines.len() >= 2
        && lines.first().is_some_and(|l| l.starts_with("```"))
        && lines.last().is_some_and(|l| l.trim() == "```")
        && lines[1..lines.len() - 1].iter().all(|l| !l.starts_with("```"));
    if !fenced {
        return format!("{trimmed}\n");
    }
    lines.remove(0);
    lines.pop();
    let mut body = lines.join("\n");
    body.push('\n');
    body
}
