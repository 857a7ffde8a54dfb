use ignore::WalkBuilder;
use shadowgit_core::constants;
use std::path::Path;
use tracing::{debug, warn};

/// Relative paths (forward slashes) of the project's visible files.
///
/// Hidden entries are skipped, which keeps `.git` and the mirror directory
/// out, and `.gitignore` rules are honored. Cost is O(project size).
pub fn project_files(root: &Path) -> Vec<String> {
    let mut walker = WalkBuilder::new(root);
    walker
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false)
        .filter_entry(|entry| entry.file_name() != constants::MIRROR_DIR);

    let mut files = Vec::new();
    for entry in walker.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Walk error: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        files.push(to_slash(relative));
    }
    files.sort();
    files
}

pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Copy `rel` from `src_root` to `dst_root`. When the source is gone the
/// destination copy is removed too; returns whether a file was copied.
pub fn mirror_file(src_root: &Path, dst_root: &Path, rel: &str) -> std::io::Result<bool> {
    let src = src_root.join(rel);
    let dst = dst_root.join(rel);
    if !src.is_file() {
        match std::fs::remove_file(&dst) {
            Ok(()) => debug!(path = rel, "removed mirrored copy of deleted file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        return Ok(false);
    }
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(&src, &dst)?;
    Ok(true)
}

/// Copy every visible project file into `dst_root`. Returns the number copied.
pub fn copy_project_files(src_root: &Path, dst_root: &Path) -> usize {
    let mut copied = 0;
    for rel in project_files(src_root) {
        match mirror_file(src_root, dst_root, &rel) {
            Ok(true) => copied += 1,
            Ok(false) => {}
            Err(err) => warn!(path = %rel, error = %err, "Failed to copy project file"),
        }
    }
    copied
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn create_temp_project(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("create tempdir");
        for (path, content) in files {
            let full = dir.path().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).expect("create parent dirs");
            }
            fs::write(&full, content).expect("write file");
        }
        dir
    }

    #[test]
    fn skips_hidden_and_mirror_directories() {
        let dir = create_temp_project(&[
            ("src/main.rs", "fn main() {}"),
            ("a.py", "x = 1"),
            (".shadowgit/a.py", "x = 0"),
            (".hidden/secret.txt", "s"),
        ]);
        assert_eq!(project_files(dir.path()), vec!["a.py", "src/main.rs"]);
    }

    #[test]
    fn mirror_file_copies_and_removes() {
        let src = create_temp_project(&[("pkg/a.py", "x = 1")]);
        let dst = tempfile::tempdir().unwrap();

        assert!(mirror_file(src.path(), dst.path(), "pkg/a.py").unwrap());
        assert_eq!(fs::read_to_string(dst.path().join("pkg/a.py")).unwrap(), "x = 1");

        fs::remove_file(src.path().join("pkg/a.py")).unwrap();
        assert!(!mirror_file(src.path(), dst.path(), "pkg/a.py").unwrap());
        assert!(!dst.path().join("pkg/a.py").exists());
    }

    #[test]
    fn copy_project_files_counts_copies() {
        let src = create_temp_project(&[("a.txt", "a"), ("b/c.txt", "c")]);
        let dst = tempfile::tempdir().unwrap();
        assert_eq!(copy_project_files(src.path(), dst.path()), 2);
        assert!(dst.path().join("b/c.txt").exists());
    }
}
