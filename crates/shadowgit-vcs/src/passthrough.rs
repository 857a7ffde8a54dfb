use shadowgit_core::error::VcsError;
use std::fmt;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

/// Read-only git subcommands that may be run against the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitSubcommand {
    Log,
    Show,
    Diff,
    Status,
    Branch,
    Notes,
    Blame,
    Shortlog,
}

impl GitSubcommand {
    pub const ALL: [GitSubcommand; 8] = [
        Self::Log,
        Self::Show,
        Self::Diff,
        Self::Status,
        Self::Branch,
        Self::Notes,
        Self::Blame,
        Self::Shortlog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Show => "show",
            Self::Diff => "diff",
            Self::Status => "status",
            Self::Branch => "branch",
            Self::Notes => "notes",
            Self::Blame => "blame",
            Self::Shortlog => "shortlog",
        }
    }
}

impl fmt::Display for GitSubcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GitSubcommand {
    type Err = VcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sub| sub.as_str() == s)
            .ok_or_else(|| VcsError::UnsupportedOperation {
                name: s.to_string(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct PassthroughOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Run `git <sub> <args>` inside `repo_root` and capture its output.
pub fn run(
    repo_root: &Path,
    sub: GitSubcommand,
    args: &[String],
) -> Result<PassthroughOutput, VcsError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_root)
        .arg("--no-pager")
        .arg(sub.as_str())
        .args(args)
        .output()
        .map_err(|e| VcsError::CommandFailed {
            command: format!("git {sub}"),
            status: "spawn failure".to_string(),
            stderr: e.to_string(),
        })?;

    Ok(PassthroughOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
    })
}
