use super::find_project_root;
use anyhow::{Result, bail};
use shadowgit_vcs::GitSubcommand;
use shadowgit_vcs::passthrough;
use std::io::Write;
use std::path::Path;

/// Run a read-only git subcommand against the mirror; returns its exit code.
pub fn run(path: &Path, subcommand: &str, args: &[String]) -> Result<i32> {
    let sub: GitSubcommand = subcommand.parse()?;
    let Some(project_root) = find_project_root(path) else {
        bail!(
            "no shadowgit mirror found at or above {}; run `shadowgit init` first",
            path.display()
        );
    };
    let mirror = shadowgit_sync::Mirror::open(&project_root)?;
    let output = passthrough::run(mirror.mirror_root(), sub, args)?;

    std::io::stdout().write_all(output.stdout.as_bytes())?;
    std::io::stderr().write_all(output.stderr.as_bytes())?;
    Ok(if output.success { 0 } else { 1 })
}
