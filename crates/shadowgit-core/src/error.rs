use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("vcs error: {0}")]
    Vcs(#[from] VcsError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config value: {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("failed to serialize record: {0}")]
    Serialize(String),
}

impl StateError {
    /// Use with `.map_err(|e| StateError::io(&path, e))`.
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn corrupt(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn serialize<E: std::fmt::Display>(e: E) -> Self {
        Self::Serialize(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("not a git repository: {path}")]
    NotGitRepo { path: String },

    #[error("git error: {0}")]
    GitError(String),

    #[error("unsupported git operation: {name}")]
    UnsupportedOperation { name: String },

    /// Uncommitted files in the target working tree would be overwritten.
    #[error("local changes block checkout: {}", .paths.join(", "))]
    CheckoutBlocked { paths: Vec<String> },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

impl VcsError {
    /// Wrap a git failure with a short description of what was attempted.
    pub fn git(context: &str, err: impl std::fmt::Display) -> Self {
        Self::GitError(format!("{context}: {err}"))
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no git repository found at {path}")]
    NoPrimaryRepository { path: String },

    #[error(
        "mirror already initialized at {path}; remove it manually to re-initialize"
    )]
    AlreadyInitialized { path: String },

    #[error("mirror target directory is not empty: {path}")]
    TargetNotEmpty { path: String },

    #[error("primary repository at {path} has no commits")]
    NoPrimaryCommit { path: String },

    #[error("mirror not initialized at {path}; run `shadowgit init` first")]
    NotInitialized { path: String },

    #[error("path is outside the project root: {path}")]
    PathOutsideProject { path: String },

    #[error("no active session")]
    NoActiveSession,

    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("vcs error: {0}")]
    Vcs(#[from] VcsError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("resolver timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u128 },

    #[error("resolver exited with {code}: {stderr}")]
    NonZeroExit { code: String, stderr: String },

    #[error("failed to launch resolver `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    #[error("resolution rejected for {path}: {reason}")]
    Validation { path: String, reason: String },

    #[error("time budget of {budget_ms}ms exhausted")]
    BudgetExhausted { budget_ms: u128 },

    #[error("no conflict markers found in {path}")]
    NoConflictMarkers { path: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResolveError {
    pub fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
