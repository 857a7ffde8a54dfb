use std::path::Path;

/// Detect a language label from a file extension.
///
/// Unknown or missing extensions map to `"text"`.
pub fn detect_language_from_extension(ext: &str) -> &'static str {
    match ext {
        "py" | "pyi" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "jsx" => "jsx",
        "tsx" => "tsx",
        "java" => "java",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "c" | "h" => "c",
        "go" => "go",
        "rs" => "rust",
        "php" => "php",
        "rb" => "ruby",
        "sh" => "bash",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "toml" => "toml",
        "xml" => "xml",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "md" => "markdown",
        _ => "text",
    }
}

pub fn detect_language(path: &Path) -> &'static str {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| detect_language_from_extension(&e.to_ascii_lowercase()))
        .unwrap_or("text")
}

/// Languages whose sources must keep `()[]{}` balanced.
pub fn uses_balanced_delimiters(language: &str) -> bool {
    matches!(
        language,
        "python"
            | "javascript"
            | "typescript"
            | "jsx"
            | "tsx"
            | "java"
            | "cpp"
            | "c"
            | "go"
            | "rust"
            | "php"
            | "css"
            | "scss"
    )
}
