use shadowgit_core::config::ResolutionConfig;
use shadowgit_core::error::ResolveError;
use shadowgit_sync::process::{self, WaitError};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;

/// Input handed to a [`Resolver`] for one conflicted file.
#[derive(Debug, Clone)]
pub struct ResolveRequest<'a> {
    pub relative_path: &'a str,
    pub prompt: &'a str,
    /// Directory the resolver runs in.
    pub worktree: &'a Path,
    pub timeout: Duration,
}

/// Turns a conflict prompt into resolved file content within a timeout.
pub trait Resolver: Send + Sync {
    fn name(&self) -> &str;
    fn resolve(&self, request: &ResolveRequest<'_>) -> Result<String, ResolveError>;
}

/// Runs an external program as `<program> <args...> <prompt>` and takes its
/// stdout as the resolution.
#[derive(Debug, Clone)]
pub struct CommandResolver {
    program: String,
    args: Vec<String>,
}

impl CommandResolver {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &ResolutionConfig) -> Self {
        Self::new(config.resolver_program.clone(), config.resolver_args.clone())
    }
}

impl Resolver for CommandResolver {
    fn name(&self) -> &str {
        &self.program
    }

    fn resolve(&self, request: &ResolveRequest<'_>) -> Result<String, ResolveError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(request.prompt)
            .current_dir(request.worktree)
            .env_remove("CLAUDECODE")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ResolveError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let output = process::wait_with_deadline(child, request.timeout, None).map_err(|err| match err {
            WaitError::TimedOut { timeout } => ResolveError::TimedOut {
                timeout_ms: timeout.as_millis(),
            },
            WaitError::Stopped => ResolveError::TimedOut {
                timeout_ms: request.timeout.as_millis(),
            },
            WaitError::Poll(io) => ResolveError::Io(io),
        })?;
        debug!(
            program = %self.program,
            path = request.relative_path,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "resolver finished"
        );

        if !output.status.success() {
            return Err(ResolveError::NonZeroExit {
                code: output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(worktree: &'a Path, timeout: Duration) -> ResolveRequest<'a> {
        ResolveRequest {
            relative_path: "a.py",
            prompt: "resolve me",
            worktree,
            timeout,
        }
    }

    #[test]
    fn stdout_is_the_resolution_and_prompt_is_last_arg() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CommandResolver::new(
            "sh",
            vec!["-c".into(), "printf 'x = %s\\n' \"$0\"".into()],
        );
        let out = resolver.resolve(&request(dir.path(), Duration::from_secs(5))).unwrap();
        assert_eq!(out, "x = resolve me\n");
    }

    #[test]
    fn slow_resolver_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CommandResolver::new("sh", vec!["-c".into(), "sleep 10".into()]);
        let err = resolver
            .resolve(&request(dir.path(), Duration::from_millis(200)))
            .unwrap_err();
        assert!(matches!(err, ResolveError::TimedOut { timeout_ms: 200 }));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn failing_resolver_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CommandResolver::new("sh", vec!["-c".into(), "echo nope >&2; exit 3".into()]);
        let err = resolver.resolve(&request(dir.path(), Duration::from_secs(5))).unwrap_err();
        let ResolveError::NonZeroExit { code, stderr } = err else {
            panic!("expected a non-zero exit");
        };
        assert_eq!(code, "3");
        assert_eq!(stderr, "nope");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CommandResolver::new("definitely-not-a-real-binary-xyz", Vec::new());
        let err = resolver.resolve(&request(dir.path(), Duration::from_secs(1))).unwrap_err();
        assert!(matches!(err, ResolveError::Spawn { .. }));
    }
}
