use crate::markers;
use shadowgit_core::error::ResolveError;
use shadowgit_core::languages;
use std::path::Path;

/// Reject a candidate resolution that still has markers or fails a basic
/// syntax check for its language.
pub fn validate_resolution(relative_path: &str, content: &str) -> Result<(), ResolveError> {
    if markers::has_markers(content) {
        return Err(ResolveError::validation(
            relative_path,
            "conflict markers remain",
        ));
    }
    let language = languages::detect_language(Path::new(relative_path));
    match language {
        "json" => serde_json::from_str::<serde_json::Value>(content)
            .map(|_| ())
            .map_err(|e| ResolveError::validation(relative_path, format!("invalid JSON: {e}"))),
        "toml" => toml::from_str::<toml::Value>(content)
            .map(|_| ())
            .map_err(|e| ResolveError::validation(relative_path, format!("invalid TOML: {e}"))),
        lang if languages::uses_balanced_delimiters(lang) => check_delimiters(lang, content)
            .map_err(|reason| ResolveError::validation(relative_path, reason)),
        _ => Ok(()),
    }
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Check that `()[]{}` nest properly outside string literals and comments.
pub fn check_delimiters(language: &str, content: &str) -> Result<(), String> {
    let hash_comments = matches!(language, "python" | "php");
    let slash_comments = language != "python";
    let rust_quotes = language == "rust";
    let chars: Vec<char> = content.chars().collect();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '\n' => line += 1,
            '#' if hash_comments => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if slash_comments && next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if slash_comments && next == Some('*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    if chars[i] == '\n' {
                        line += 1;
                    }
                    i += 1;
                }
                i += 2;
                continue;
            }
            '\'' if rust_quotes && !is_char_literal(&chars, i) => {}
            '"' | '\'' | '`' => {
                let triple = language == "python"
                    && c != '`'
                    && next == Some(c)
                    && chars.get(i + 2) == Some(&c);
                let (end, newlines) = skip_string(&chars, i, c, triple);
                line += newlines;
                i = end;
                continue;
            }
            '(' | '[' | '{' => stack.push((c, line)),
            ')' | ']' | '}' => match stack.pop() {
                Some((open, _)) if closing_for(open) == c => {}
                Some((open, open_line)) => {
                    return Err(format!(
                        "line {line}: `{c}` closes `{open}` opened on line {open_line}"
                    ));
                }
                None => return Err(format!("line {line}: unmatched `{c}`")),
            },
            _ => {}
        }
        i += 1;
    }

    match stack.pop() {
        Some((open, open_line)) => Err(format!("line {open_line}: unclosed `{open}`")),
        None => Ok(()),
    }
}

/// `'x'` or `'\n'`-style char literal, as opposed to a lifetime.
fn is_char_literal(chars: &[char], i: usize) -> bool {
    match chars.get(i + 1) {
        Some('\\') => true,
        Some(_) => chars.get(i + 2) == Some(&'\''),
        None => false,
    }
}

/// Index just past the string starting at `start`, and newlines crossed.
fn skip_string(chars: &[char], start: usize, quote: char, triple: bool) -> (usize, usize) {
    let mut newlines = 0;
    let mut i = start + if triple { 3 } else { 1 };
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                if chars.get(i + 1) == Some(&'\n') {
                    newlines += 1;
                }
                i += 2;
                continue;
            }
            '\n' => {
                newlines += 1;
                if !triple && quote != '`' {
                    return (i, newlines - 1);
                }
            }
            c if c == quote => {
                if !triple {
                    return (i + 1, newlines);
                }
                if chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                    return (i + 3, newlines);
                }
            }
            _ => {}
        }
        i += 1;
    }
    (i, newlines)
}
