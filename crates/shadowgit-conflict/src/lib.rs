pub mod analyzer;
pub mod markers;
pub mod orchestrator;
pub mod prompt;
pub mod repo_status;
pub mod resolver;
pub mod validate;

pub use analyzer::{ChangeAnalysis, ChangeStatus, RecentAnalysis, analyze, analyze_recent};
pub use orchestrator::{ResolutionOrchestrator, ResolutionReport};
pub use repo_status::{RepoConflictStatus, repo_conflict_status};
pub use resolver::{CommandResolver, ResolveRequest, Resolver};
