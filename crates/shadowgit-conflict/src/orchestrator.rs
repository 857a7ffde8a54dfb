use crate::markers;
use crate::prompt;
use crate::resolver::{ResolveRequest, Resolver};
use crate::validate;
use serde::Serialize;
use shadowgit_core::config::ResolutionConfig;
use shadowgit_core::error::{ResolveError, SessionError};
use shadowgit_core::{ids, time};
use shadowgit_sync::Mirror;
use shadowgit_vcs::VcsAdapter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TIMEOUT_MARGIN: Duration = Duration::from_millis(100);

/// Outcome of one resolution run. Failures are reported here, never raised.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionReport {
    /// Every requested file was resolved.
    pub success: bool,
    pub resolved_files: Vec<String>,
    pub duration_ms: u128,
    pub worktree_path: Option<PathBuf>,
    pub branch: Option<String>,
    pub resolution_commit: Option<String>,
    pub partial_resolution: bool,
    pub error: Option<String>,
}

/// Timeout for the next file: the configured cap, but always strictly less
/// than what is left of the shared budget.
pub fn per_file_timeout(remaining: Duration, cap: Duration) -> Duration {
    let margin = if remaining < Duration::from_secs(1) {
        remaining / 10
    } else {
        TIMEOUT_MARGIN
    };
    cap.min(remaining.saturating_sub(margin))
}

pub fn resolution_commit_message(files: &[String]) -> String {
    let list = files
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "AI-resolved merge conflicts\n\nFiles resolved:\n{list}\n\nTime: {}",
        time::now_iso8601()
    )
}

/// Drives a [`Resolver`] over conflicted files inside a throwaway worktree,
/// under one wall-clock budget.
pub struct ResolutionOrchestrator<'a, R: Resolver> {
    mirror: &'a Mirror,
    resolver: R,
    budget: Duration,
    per_file_cap: Duration,
    context_lines: usize,
}

impl<'a, R: Resolver> ResolutionOrchestrator<'a, R> {
    pub fn new(mirror: &'a Mirror, resolver: R, config: &ResolutionConfig) -> Self {
        Self {
            mirror,
            resolver,
            budget: config.budget(),
            per_file_cap: config.per_file_timeout(),
            context_lines: config.context_lines,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn resolve(&self, files: &[String]) -> ResolutionReport {
        let start = Instant::now();
        let mut report = ResolutionReport::default();
        if files.is_empty() {
            report.success = true;
            return report;
        }

        let (branch, worktree) = match self.create_worktree() {
            Ok(created) => created,
            Err(err) => {
                warn!(error = %err, "failed to create resolution worktree");
                report.error = Some(err.to_string());
                report.partial_resolution = true;
                report.duration_ms = start.elapsed().as_millis();
                return report;
            }
        };
        info!(
            worktree = %worktree.display(),
            files = files.len(),
            budget_ms = self.budget.as_millis() as u64,
            resolver = self.resolver.name(),
            "conflict resolution started"
        );
        report.branch = Some(branch);
        report.worktree_path = Some(worktree.clone());

        for rel in files {
            let elapsed = start.elapsed();
            if elapsed >= self.budget {
                warn!(path = %rel, "resolution budget exhausted");
                report.error = Some(
                    ResolveError::BudgetExhausted {
                        budget_ms: self.budget.as_millis(),
                    }
                    .to_string(),
                );
                break;
            }
            let timeout = per_file_timeout(self.budget - elapsed, self.per_file_cap);
            match self.resolve_file(&worktree, rel, timeout) {
                Ok(()) => {
                    info!(path = %rel, "conflict resolved");
                    report.resolved_files.push(rel.clone());
                }
                Err(err) => {
                    warn!(path = %rel, error = %err, "conflict resolution failed; stopping");
                    report.error = Some(format!("{rel}: {err}"));
                    break;
                }
            }
        }

        if !report.resolved_files.is_empty() {
            let message = resolution_commit_message(&report.resolved_files);
            match self
                .mirror
                .adapter()
                .stage_and_commit(&worktree, &report.resolved_files, &message)
            {
                Ok(commit) => report.resolution_commit = Some(commit),
                Err(err) => {
                    warn!(error = %err, "failed to commit resolution");
                    report.error.get_or_insert_with(|| err.to_string());
                }
            }
        }

        report.success = report.resolved_files.len() == files.len() && report.resolution_commit.is_some();
        report.partial_resolution = report.resolved_files.len() < files.len();
        report.duration_ms = start.elapsed().as_millis();
        info!(
            resolved = report.resolved_files.len(),
            requested = files.len(),
            duration_ms = report.duration_ms as u64,
            "conflict resolution finished"
        );
        report
    }

    fn create_worktree(&self) -> Result<(String, PathBuf), SessionError> {
        let root = self.mirror.mirror_root();
        let adapter = self.mirror.adapter();
        let suffix = ids::short_suffix();
        let branch = format!("resolve-{}-{suffix}", time::now_branch_stamp());
        let path = std::env::temp_dir().join(format!("shadowgit-resolve-{}", ids::new_id()));
        adapter.create_branch(root, &branch, "HEAD")?;
        if let Err(err) = adapter.add_worktree(root, &branch, &branch, &path) {
            if let Err(cleanup) = adapter.delete_branch(root, &branch) {
                warn!(branch = %branch, error = %cleanup, "failed to delete resolution branch");
            }
            return Err(err.into());
        }
        Ok((branch, path))
    }

    /// Copy the mirror's conflicted copy into the worktree when the
    /// worktree's copy is missing or carries no markers.
    fn seed(&self, worktree: &Path, rel: &str) -> Result<String, ResolveError> {
        let target = worktree.join(rel);
        if let Ok(content) = std::fs::read_to_string(&target)
            && markers::has_markers(&content)
        {
            return Ok(content);
        }
        let source = self.mirror.mirror_root().join(rel);
        let content = std::fs::read_to_string(&source).map_err(|_| ResolveError::NoConflictMarkers {
            path: rel.to_string(),
        })?;
        if !markers::has_markers(&content) {
            return Err(ResolveError::NoConflictMarkers {
                path: rel.to_string(),
            });
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &content)?;
        Ok(content)
    }

    fn resolve_file(&self, worktree: &Path, rel: &str, timeout: Duration) -> Result<(), ResolveError> {
        let content = self.seed(worktree, rel)?;
        let prompt = prompt::build_prompt(rel, &content, self.context_lines);
        let output = self.resolver.resolve(&ResolveRequest {
            relative_path: rel,
            prompt: &prompt,
            worktree,
            timeout,
        })?;
        let resolved = prompt::unwrap_code_fence(&output);
        validate::validate_resolution(rel, &resolved)?;
        std::fs::write(worktree.join(rel), resolved)?;
        Ok(())
    }

    /// Remove the worktree and branch left behind by `report`.
    pub fn discard(&self, report: &ResolutionReport) {
        let (Some(branch), Some(path)) = (&report.branch, &report.worktree_path) else {
            return;
        };
        let root = self.mirror.mirror_root();
        if let Err(err) = self.mirror.adapter().remove_worktree(root, branch, path) {
            warn!(branch = %branch, error = %err, "failed to remove resolution worktree");
        }
        if let Err(err) = self.mirror.adapter().delete_branch(root, branch) {
            warn!(branch = %branch, error = %err, "failed to delete resolution branch");
        }
    }
}
