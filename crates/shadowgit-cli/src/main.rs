mod commands;
mod transcript;

use clap::{Parser, Subcommand};
use shadowgit_core::config::Config;
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "shadowgit",
    version,
    about = "Mirror AI-assistant edits into a parallel git history",
    long_about = "shadowgit keeps a mirror repository under .shadowgit/ that records every\n\
        file change an AI assistant makes, grouped into one commit per session, while\n\
        your own history stays untouched.\n\n\
        Quick start:\n  \
        shadowgit init\n  \
        shadowgit session start my-session\n  \
        shadowgit session accumulate src/app.py --tool Edit\n  \
        shadowgit session end -m \"Refactor app entrypoint\"\n  \
        shadowgit git log --oneline"
)]
struct Cli {
    /// Enable verbose logging (set log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (default: .shadowgit.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the mirror repository for a project
    ///
    /// Pins the primary repository's current commit and shares its object
    /// store, so the mirror starts with identical content.
    ///
    /// Example: shadowgit init --path /path/to/project
    Init {
        /// Path to the project root (default: current directory)
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Show mirror, session and pending-change state
    Status {
        #[arg(short, long)]
        path: Option<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Merge the primary repository's latest commits into the mirror
    Sync {
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Commit human edits not yet in the mirror as a `user:` commit
    SyncUserChanges {
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Manage assistant sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Handle one host hook event read as JSON from stdin
    ///
    /// Always exits 0 so the host tool is never blocked.
    Hook {
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Analyze how assistant changes relate to the current working tree
    ///
    /// Examples:
    ///   shadowgit conflicts
    ///   shadowgit conflicts --limit 5 --json
    ///   shadowgit conflicts --file src/app.py
    Conflicts {
        #[arg(short, long)]
        path: Option<String>,

        /// Number of recent assistant commits to analyze
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Check uncommitted human work against one assistant target instead
        #[arg(long)]
        file: Option<String>,

        #[arg(long)]
        json: bool,
    },
    /// Resolve conflicted mirror files with the configured AI resolver
    ///
    /// Without FILES, every file the mirror reports as conflicted is tried.
    Resolve {
        #[arg(short, long)]
        path: Option<String>,

        files: Vec<String>,

        /// Overall time budget in seconds
        #[arg(long)]
        budget: Option<u64>,

        /// Remove the resolution worktree and branch afterwards
        #[arg(long)]
        discard: bool,

        #[arg(long)]
        json: bool,
    },
    /// Run a read-only git command against the mirror
    ///
    /// Supported: log, show, diff, status, branch, notes, blame, shortlog.
    ///
    /// Example: shadowgit git log --oneline -5
    Git {
        #[arg(long)]
        path: Option<String>,

        subcommand: String,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Begin accumulating changes for a session
    Start {
        session_id: String,

        #[arg(short, long)]
        path: Option<String>,

        /// Topic used in the session branch name
        #[arg(long)]
        topic: Option<String>,

        /// Force a dedicated session branch on or off
        #[arg(long, conflicts_with = "no_branch")]
        branch: bool,

        #[arg(long)]
        no_branch: bool,
    },
    /// Record one changed file into the active session
    Accumulate {
        file: String,

        #[arg(short, long)]
        path: Option<String>,

        /// Tool that made the change
        #[arg(long, default_value = "Edit")]
        tool: String,

        /// Session to record into (default: most recently started)
        #[arg(long)]
        session: Option<String>,

        /// Tool input as a JSON object
        #[arg(long)]
        input: Option<String>,
    },
    /// Commit the session's accumulated changes
    End {
        #[arg(short, long)]
        path: Option<String>,

        #[arg(long)]
        session: Option<String>,

        /// Narration used as the commit headline
        #[arg(short, long)]
        message: Option<String>,

        /// Transcript to extract narration from
        #[arg(long)]
        transcript: Option<String>,
    },
    /// List session branches, newest first
    List {
        #[arg(short, long)]
        path: Option<String>,

        /// Only sessions whose branch is still active
        #[arg(long)]
        active: bool,

        #[arg(long)]
        json: bool,
    },
    /// Drop stale sessions and remove session worktrees whose metadata is gone
    Prune {
        #[arg(short, long)]
        path: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_file = cli.config.as_deref().map(Path::new);

    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        std::env::current_dir()
            .ok()
            .and_then(|cwd| Config::load_with_file(Some(&cwd), config_file).ok())
            .map(|config| config.logging.level)
            .unwrap_or_else(|| "info".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { path } => {
            let path = resolve_path(path)?;
            commands::init::run(&path, config_file)?;
        }
        Commands::Status { path, json } => {
            let path = resolve_path(path)?;
            commands::status::run(&path, config_file, json)?;
        }
        Commands::Sync { path } => {
            let path = resolve_path(path)?;
            commands::sync::run(&path, config_file)?;
        }
        Commands::SyncUserChanges { path } => {
            let path = resolve_path(path)?;
            commands::sync::run_user_changes(&path, config_file)?;
        }
        Commands::Session { command } => run_session(command, config_file)?,
        Commands::Hook { path } => {
            let path = resolve_path(path)?;
            if let Err(err) = commands::hook::run(&path, config_file, std::io::stdin().lock()) {
                error!(error = %err, "hook failed");
            }
        }
        Commands::Conflicts {
            path,
            limit,
            file,
            json,
        } => {
            let path = resolve_path(path)?;
            commands::conflicts::run(&path, limit, file.as_deref(), json)?;
        }
        Commands::Resolve {
            path,
            files,
            budget,
            discard,
            json,
        } => {
            let path = resolve_path(path)?;
            let options = commands::resolve::ResolveOptions {
                files,
                budget_secs: budget,
                discard,
                json,
            };
            if !commands::resolve::run(&path, config_file, &options)? {
                std::process::exit(1);
            }
        }
        Commands::Git {
            path,
            subcommand,
            args,
        } => {
            let path = resolve_path(path)?;
            let code = commands::git::run(&path, &subcommand, &args)?;
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}

fn run_session(command: SessionCommands, config_file: Option<&Path>) -> anyhow::Result<()> {
    match command {
        SessionCommands::Start {
            session_id,
            path,
            topic,
            branch,
            no_branch,
        } => {
            let path = resolve_path(path)?;
            let branching = match (branch, no_branch) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            commands::session::start(&path, config_file, &session_id, topic.as_deref(), branching)?;
        }
        SessionCommands::Accumulate {
            file,
            path,
            tool,
            session,
            input,
        } => {
            let path = resolve_path(path)?;
            let input = match input {
                Some(raw) => serde_json::from_str(&raw)?,
                None => serde_json::Value::Object(Default::default()),
            };
            commands::session::accumulate(
                &path,
                config_file,
                Path::new(&file),
                &tool,
                session.as_deref(),
                input,
            )?;
        }
        SessionCommands::End {
            path,
            session,
            message,
            transcript,
        } => {
            let path = resolve_path(path)?;
            let narration = message.or_else(|| {
                transcript
                    .as_deref()
                    .and_then(|t| transcript::extract_narration(Path::new(t)))
            });
            commands::session::end(&path, config_file, session.as_deref(), narration.as_deref())?;
        }
        SessionCommands::List { path, active, json } => {
            let path = resolve_path(path)?;
            commands::session::list(&path, active, json)?;
        }
        SessionCommands::Prune { path } => {
            let path = resolve_path(path)?;
            commands::session::prune(&path, config_file)?;
        }
    }
    Ok(())
}

fn resolve_path(path: Option<String>) -> anyhow::Result<PathBuf> {
    match path {
        Some(p) => Ok(PathBuf::from(p)),
        None => Ok(std::env::current_dir()?),
    }
}
