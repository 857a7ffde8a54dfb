use crate::process::{self, StopSignal, WaitError};
use crate::walk;
use regex::Regex;
use serde::Serialize;
use shadowgit_core::config::{MonitorConfig, MonitorMode};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, LazyLock, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

static PYTEST_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) (passed|failed|skipped|error|errors)\b").expect("pytest count regex must compile")
});
static PYTEST_FAILED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^FAILED (\S+)").expect("pytest failed regex must compile"));
static CARGO_RESULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"test result: \w+\. (\d+) passed; (\d+) failed; (\d+) ignored")
        .expect("cargo result regex must compile")
});
static CARGO_FAILED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^test (\S+) \.\.\. FAILED").expect("cargo failed regex must compile")
});
static UNITTEST_RAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Ran (\d+) tests?").expect("unittest ran regex must compile"));
static UNITTEST_DETAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(failures|errors|skipped)=(\d+)").expect("unittest detail regex must compile")
});
static UNITTEST_FAILED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:FAIL|ERROR): (\S+)").expect("unittest failed regex must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestFramework {
    Pytest,
    Cargo,
    Unittest,
}

impl TestFramework {
    /// Guess the project's test runner from marker files.
    pub fn detect(root: &Path) -> Option<Self> {
        let pytest_markers = ["pytest.ini", "pyproject.toml", "setup.cfg", "tests", "test"];
        if pytest_markers.iter().any(|m| root.join(m).exists()) {
            return Some(Self::Pytest);
        }
        let files = walk::project_files(root);
        if files.iter().any(|f| is_pytest_file(f)) {
            return Some(Self::Pytest);
        }
        if root.join("Cargo.toml").is_file() {
            return Some(Self::Cargo);
        }
        if files.iter().any(|f| f.ends_with(".py")) {
            return Some(Self::Unittest);
        }
        None
    }

    pub fn command(&self) -> TestCommand {
        match self {
            Self::Pytest => TestCommand::new("python", ["-m", "pytest", "--tb=short", "-q"]),
            Self::Cargo => TestCommand::new("cargo", ["test", "--quiet"]),
            Self::Unittest => TestCommand::new("python", ["-m", "unittest", "discover"]),
        }
    }
}

fn is_pytest_file(rel: &str) -> bool {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    name.ends_with(".py") && (name.starts_with("test_") || name.ends_with("_test.py"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl TestCommand {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TestCounts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestRun {
    pub started_at: String,
    pub duration_ms: u128,
    pub success: bool,
    pub timed_out: bool,
    pub counts: TestCounts,
    pub failed_tests: Vec<String>,
    pub trigger: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorSummary {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub overall_success: bool,
    pub average_duration_ms: u128,
    pub latest: Option<TestCounts>,
    pub health: &'static str,
}

/// Pull pass/fail/skip counts and failing test names out of runner output.
pub fn parse_summary(framework: TestFramework, output: &str) -> (TestCounts, Vec<String>) {
    let mut counts = TestCounts::default();
    let failed_tests: Vec<String> = match framework {
        TestFramework::Pytest => {
            for cap in PYTEST_COUNT_RE.captures_iter(output) {
                let n: usize = cap[1].parse().unwrap_or(0);
                match &cap[2] {
                    "passed" => counts.passed = n,
                    "skipped" => counts.skipped = n,
                    _ => counts.failed += n,
                }
            }
            PYTEST_FAILED_RE
                .captures_iter(output)
                .map(|c| c[1].to_string())
                .collect()
        }
        TestFramework::Cargo => {
            for cap in CARGO_RESULT_RE.captures_iter(output) {
                counts.passed += cap[1].parse::<usize>().unwrap_or(0);
                counts.failed += cap[2].parse::<usize>().unwrap_or(0);
                counts.skipped += cap[3].parse::<usize>().unwrap_or(0);
            }
            CARGO_FAILED_RE
                .captures_iter(output)
                .map(|c| c[1].to_string())
                .collect()
        }
        TestFramework::Unittest => {
            let ran: usize = UNITTEST_RAN_RE
                .captures(output)
                .and_then(|c| c[1].parse().ok())
                .unwrap_or(0);
            for cap in UNITTEST_DETAIL_RE.captures_iter(output) {
                let n: usize = cap[2].parse().unwrap_or(0);
                match &cap[1] {
                    "skipped" => counts.skipped += n,
                    _ => counts.failed += n,
                }
            }
            counts.passed = ran.saturating_sub(counts.failed + counts.skipped);
            UNITTEST_FAILED_RE
                .captures_iter(output)
                .map(|c| c[1].to_string())
                .collect()
        }
    };
    (counts, failed_tests)
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub test_timeout: Duration,
    pub stop_grace: Duration,
    pub join_timeout: Duration,
}

impl From<&MonitorConfig> for MonitorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            test_timeout: Duration::from_secs(config.test_timeout_secs),
            stop_grace: Duration::from_secs(config.stop_grace_secs),
            join_timeout: Duration::from_secs(config.join_timeout_secs),
        }
    }
}

/// Shared between the monitor handle and its watcher thread.
struct Runner {
    root: PathBuf,
    framework: TestFramework,
    command: TestCommand,
    settings: MonitorSettings,
    stop: AtomicBool,
    runs: Mutex<Vec<TestRun>>,
}

impl Runner {
    fn run(&self, trigger: Option<&str>) -> TestRun {
        let mut command = Command::new(&self.command.program);
        command.args(&self.command.args);
        if self.framework == TestFramework::Pytest
            && let Some(file) = trigger.filter(|f| is_pytest_file(f))
        {
            command.arg(file);
        }
        command
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let started_at = shadowgit_core::time::now_iso8601();
        let start = Instant::now();
        let signal = StopSignal {
            flag: &self.stop,
            grace: self.settings.stop_grace,
        };
        let result = command
            .spawn()
            .map_err(WaitError::Poll)
            .and_then(|child| process::wait_with_deadline(child, self.settings.test_timeout, Some(signal)));

        let run = match result {
            Ok(output) => {
                let combined = format!("{}\n{}", output.stdout, output.stderr);
                let (counts, failed_tests) = parse_summary(self.framework, &combined);
                TestRun {
                    started_at,
                    duration_ms: output.elapsed.as_millis(),
                    success: output.status.success(),
                    timed_out: false,
                    counts,
                    failed_tests,
                    trigger: trigger.map(str::to_string),
                }
            }
            Err(err) => {
                warn!(root = %self.root.display(), error = %err, "test run did not complete");
                TestRun {
                    started_at,
                    duration_ms: start.elapsed().as_millis(),
                    success: false,
                    timed_out: matches!(err, WaitError::TimedOut { .. }),
                    counts: TestCounts::default(),
                    failed_tests: Vec::new(),
                    trigger: trigger.map(str::to_string),
                }
            }
        };

        if run.success {
            info!(passed = run.counts.passed, duration_ms = run.duration_ms as u64, "tests passed");
        } else {
            warn!(
                failed = run.counts.failed,
                failed_tests = ?run.failed_tests,
                "tests failing"
            );
        }
        if let Ok(mut runs) = self.runs.lock() {
            runs.push(run.clone());
        }
        run
    }
}

fn snapshot(root: &Path) -> BTreeMap<String, SystemTime> {
    walk::project_files(root)
        .into_iter()
        .filter_map(|rel| {
            let modified = std::fs::metadata(root.join(&rel)).and_then(|m| m.modified()).ok()?;
            Some((rel, modified))
        })
        .collect()
}

fn watch(runner: Arc<Runner>, triggers: Receiver<String>, done: Sender<()>) {
    let mut last = snapshot(&runner.root);
    let mut next_poll = Instant::now() + runner.settings.poll_interval;
    while !runner.stop.load(Ordering::SeqCst) {
        match triggers.recv_timeout(Duration::from_millis(50)) {
            Ok(file) => {
                runner.run(Some(&file));
                last = snapshot(&runner.root);
                continue;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if Instant::now() >= next_poll {
            next_poll = Instant::now() + runner.settings.poll_interval;
            let current = snapshot(&runner.root);
            if current != last {
                debug!(root = %runner.root.display(), "source change detected");
                last = current;
                runner.run(None);
            }
        }
    }
    let _ = done.send(());
}

/// Re-runs a session's tests in the background while the session is open.
pub struct TestMonitor {
    runner: Arc<Runner>,
    triggers: Option<Sender<String>>,
    done: Option<Receiver<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestMonitor {
    /// Build a monitor for `root` if `config` and the project call for one.
    pub fn for_session(root: &Path, config: &MonitorConfig) -> Option<Self> {
        let framework = match config.mode() {
            MonitorMode::Off => return None,
            MonitorMode::Auto => TestFramework::detect(root)?,
            MonitorMode::On => TestFramework::detect(root).unwrap_or(TestFramework::Unittest),
        };
        Some(Self::new(root, framework, framework.command(), MonitorSettings::from(config)))
    }

    pub fn new(
        root: &Path,
        framework: TestFramework,
        command: TestCommand,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            runner: Arc::new(Runner {
                root: root.to_path_buf(),
                framework,
                command,
                settings,
                stop: AtomicBool::new(false),
                runs: Mutex::new(Vec::new()),
            }),
            triggers: None,
            done: None,
            handle: None,
        }
    }

    pub fn framework(&self) -> TestFramework {
        self.runner.framework
    }

    /// Start the watcher thread. Calling it twice is a no-op.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let (trigger_tx, trigger_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let runner = Arc::clone(&self.runner);
        let handle = thread::Builder::new()
            .name("shadowgit-test-monitor".into())
            .spawn(move || watch(runner, trigger_rx, done_tx))?;
        self.triggers = Some(trigger_tx);
        self.done = Some(done_rx);
        self.handle = Some(handle);
        info!(root = %self.runner.root.display(), framework = ?self.runner.framework, "test monitor started");
        Ok(())
    }

    /// Queue a run for a changed file on the watcher thread.
    pub fn trigger(&self, relative_path: &str) {
        if let Some(tx) = &self.triggers
            && tx.send(relative_path.to_string()).is_err()
        {
            debug!(path = relative_path, "test monitor already stopped");
        }
    }

    /// Run the tests affected by `relative_path` on the calling thread.
    pub fn run_affected(&self, relative_path: &str) -> TestRun {
        self.runner.run(Some(relative_path))
    }

    /// Signal the watcher, give a running test the grace period, and wait at
    /// most the join timeout for the thread.
    pub fn stop(&mut self) -> MonitorSummary {
        self.runner.stop.store(true, Ordering::SeqCst);
        self.triggers = None;
        if let (Some(done), Some(handle)) = (self.done.take(), self.handle.take()) {
            let budget = self.runner.settings.stop_grace + self.runner.settings.join_timeout;
            match done.recv_timeout(budget) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = handle.join();
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("test monitor thread did not stop in time; detaching");
                }
            }
        }
        self.summary()
    }

    pub fn runs(&self) -> Vec<TestRun> {
        self.runner.runs.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn summary(&self) -> MonitorSummary {
        summarize(&self.runs())
    }
}

impl Drop for TestMonitor {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

pub fn summarize(runs: &[TestRun]) -> MonitorSummary {
    let total_runs = runs.len();
    let successful_runs = runs.iter().filter(|r| r.success).count();
    let average_duration_ms = if total_runs == 0 {
        0
    } else {
        runs.iter().map(|r| r.duration_ms).sum::<u128>() / total_runs as u128
    };
    let latest = runs.last();
    MonitorSummary {
        total_runs,
        successful_runs,
        failed_runs: total_runs - successful_runs,
        overall_success: total_runs > 0 && successful_runs == total_runs,
        average_duration_ms,
        latest: latest.map(|r| r.counts),
        health: match latest {
            None => "no_runs",
            Some(run) if run.success => "healthy",
            Some(_) => "failing",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_millis(100),
            test_timeout: Duration::from_secs(5),
            stop_grace: Duration::from_millis(200),
            join_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn detects_frameworks_from_markers() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(TestFramework::detect(dir.path()), None);

        std::fs::write(dir.path().join("app.py"), "x = 1\n").unwrap();
        assert_eq!(TestFramework::detect(dir.path()), Some(TestFramework::Unittest));

        std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
        assert_eq!(TestFramework::detect(dir.path()), Some(TestFramework::Cargo));

        std::fs::write(dir.path().join("test_app.py"), "def test_x(): pass\n").unwrap();
        assert_eq!(TestFramework::detect(dir.path()), Some(TestFramework::Pytest));
    }

    #[test]
    fn parses_pytest_summary() {
        let out = "FAILED tests/test_a.py::test_x - assert 1 == 2\n=== 5 passed, 2 failed, 1 skipped in 1.23s ===";
        let (counts, failed) = parse_summary(TestFramework::Pytest, out);
        assert_eq!(counts, TestCounts { passed: 5, failed: 2, skipped: 1 });
        assert_eq!(failed, vec!["tests/test_a.py::test_x"]);
    }

    #[test]
    fn parses_cargo_summary_across_binaries() {
        let out = "test tests::a ... FAILED\n\
                   test result: FAILED. 3 passed; 1 failed; 2 ignored; 0 measured; 0 filtered out\n\
                   test result: ok. 4 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out";
        let (counts, failed) = parse_summary(TestFramework::Cargo, out);
        assert_eq!(counts, TestCounts { passed: 7, failed: 1, skipped: 2 });
        assert_eq!(failed, vec!["tests::a"]);
    }

    #[test]
    fn parses_unittest_summary() {
        let out = "FAIL: test_b (test_mod.T)\n----\nRan 6 tests in 0.01s\n\nFAILED (failures=1, errors=1, skipped=1)";
        let (counts, failed) = parse_summary(TestFramework::Unittest, out);
        assert_eq!(counts, TestCounts { passed: 3, failed: 2, skipped: 1 });
        assert_eq!(failed, vec!["test_b"]);
    }

    #[test]
    fn summary_reports_health() {
        assert_eq!(summarize(&[]).health, "no_runs");
        let run = |success| TestRun {
            started_at: String::new(),
            duration_ms: 10,
            success,
            timed_out: false,
            counts: TestCounts::default(),
            failed_tests: Vec::new(),
            trigger: None,
        };
        let summary = summarize(&[run(true), run(false)]);
        assert_eq!(summary.health, "failing");
        assert_eq!(summary.failed_runs, 1);
        assert!(!summary.overall_success);
        assert_eq!(summarize(&[run(false), run(true)]).health, "healthy");
    }

    #[test]
    fn run_affected_records_result() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = TestMonitor::new(
            dir.path(),
            TestFramework::Pytest,
            TestCommand::new("sh", ["-c", "echo '2 passed in 0.1s'"]),
            settings(),
        );
        let run = monitor.run_affected("src/app.py");
        assert!(run.success);
        assert_eq!(run.counts.passed, 2);
        assert_eq!(monitor.summary().total_runs, 1);
    }

    #[test]
    fn stop_is_bounded_while_a_test_is_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = TestMonitor::new(
            dir.path(),
            TestFramework::Pytest,
            TestCommand::new("sh", ["-c", "sleep 10"]),
            settings(),
        );
        monitor.start().unwrap();
        monitor.trigger("a.py");
        thread::sleep(Duration::from_millis(150));

        let start = Instant::now();
        let summary = monitor.stop();
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(summary.total_runs <= 1);
    }
}
