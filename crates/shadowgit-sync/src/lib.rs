pub mod branches;
pub mod commit_builder;
pub mod mirror;
pub mod monitor;
pub mod process;
pub mod session;
pub mod walk;

pub use branches::SessionBranchManager;
pub use commit_builder::{CommitMetadata, SessionNote};
pub use mirror::Mirror;
pub use monitor::{MonitorSummary, TestFramework, TestMonitor};
pub use session::{AccumulateOutcome, EndReport, StartReport, SyncEngine};
