/// Directory (relative to the project root) holding the mirror repository.
pub const MIRROR_DIR: &str = ".shadowgit";

/// Mirror config record file name, inside the mirror directory.
pub const MIRROR_CONFIG_FILE: &str = ".shadowgit-config.json";

/// Session-branch metadata file name, inside the mirror directory.
pub const SESSION_METADATA_FILE: &str = ".shadowgit-sessions.json";

/// Active-session tracker file name, inside the mirror directory.
pub const ACTIVE_SESSIONS_FILE: &str = ".shadowgit-active.json";

/// Per-session worktree directory, inside the mirror directory.
pub const SESSIONS_DIR: &str = "sessions";

/// Default data directory name under home.
pub const DEFAULT_DATA_DIR: &str = ".shadowgit";

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = ".shadowgit.toml";

/// Mirror config schema version.
pub const SCHEMA_VERSION: &str = "3.0.0";

/// Architecture tag recorded in the mirror config.
pub const ARCHITECTURE: &str = "shared-object-mirror";

/// Name of the remote pointing back at the primary repository.
pub const UPSTREAM_REMOTE: &str = "upstream";

/// The mirror's main branch.
pub const MIRROR_MAIN_BRANCH: &str = "main";

/// Default wall-clock budget for AI conflict resolution.
pub const DEFAULT_RESOLUTION_BUDGET_SECS: u64 = 60;

/// Maximum number of context lines sent to the resolver.
pub const MAX_CONTEXT_LINES: usize = 20;

/// Tools whose invocations modify a file.
pub const FILE_MODIFYING_TOOLS: [&str; 4] = ["Edit", "Write", "MultiEdit", "NotebookEdit"];

/// Number of leading hex characters shown for abbreviated hashes.
pub const SHORT_HASH_LEN: usize = 12;
