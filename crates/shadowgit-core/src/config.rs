use crate::constants;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_true")]
    pub use_branching: bool,
    #[serde(default = "default_true")]
    pub auto_merge: bool,
    #[serde(default)]
    pub topic: Option<String>,
    /// Seconds without activity after which an unended session is considered
    /// abandoned and dropped by `session prune`. Zero keeps sessions forever.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

/// Author identity for commits written into the mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_name")]
    pub name: String,
    #[serde(default = "default_identity_email")]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,
    #[serde(default = "default_per_file_timeout_secs")]
    pub per_file_timeout_secs: u64,
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
    #[serde(default = "default_resolver_program")]
    pub resolver_program: String,
    #[serde(default = "default_resolver_args")]
    pub resolver_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_enabled")]
    pub enabled: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_test_timeout_secs")]
    pub test_timeout_secs: u64,
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// How test monitoring is switched on for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    Off,
    /// Enable only when the project looks like it has a test suite.
    Auto,
    On,
}

fn default_true() -> bool {
    true
}
fn default_stale_after_secs() -> u64 {
    24 * 60 * 60
}
fn default_identity_name() -> String {
    "Claude".into()
}
fn default_identity_email() -> String {
    "noreply@anthropic.com".into()
}
fn default_budget_secs() -> u64 {
    constants::DEFAULT_RESOLUTION_BUDGET_SECS
}
fn default_per_file_timeout_secs() -> u64 {
    45
}
fn default_context_lines() -> usize {
    constants::MAX_CONTEXT_LINES
}
fn default_resolver_program() -> String {
    "claude".into()
}
fn default_resolver_args() -> Vec<String> {
    vec!["-p".into()]
}
fn default_monitor_enabled() -> String {
    "off".into()
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_test_timeout_secs() -> u64 {
    120
}
fn default_stop_grace_secs() -> u64 {
    5
}
fn default_join_timeout_secs() -> u64 {
    2
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            use_branching: true,
            auto_merge: true,
            topic: None,
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: default_identity_name(),
            email: default_identity_email(),
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            budget_secs: default_budget_secs(),
            per_file_timeout_secs: default_per_file_timeout_secs(),
            context_lines: default_context_lines(),
            resolver_program: default_resolver_program(),
            resolver_args: default_resolver_args(),
        }
    }
}

impl ResolutionConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.budget_secs)
    }

    pub fn per_file_timeout(&self) -> Duration {
        Duration::from_secs(self.per_file_timeout_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_monitor_enabled(),
            poll_interval_ms: default_poll_interval_ms(),
            test_timeout_secs: default_test_timeout_secs(),
            stop_grace_secs: default_stop_grace_secs(),
            join_timeout_secs: default_join_timeout_secs(),
        }
    }
}

impl MonitorConfig {
    pub fn mode(&self) -> MonitorMode {
        match normalize_monitor_enabled(&self.enabled).as_str() {
            "on" => MonitorMode::On,
            "auto" => MonitorMode::Auto,
            _ => MonitorMode::Off,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with layered precedence:
    /// 1. Environment variables `SHADOWGIT_<SECTION>_<KEY>` (highest priority)
    /// 2. Explicit config file (from `--config` flag)
    /// 3. Project config: `<project_root>/.shadowgit.toml`
    /// 4. Global config: `~/.shadowgit/config.toml`
    /// 5. Built-in defaults (lowest priority)
    ///
    /// Only fields explicitly set in a higher-priority file override lower layers.
    pub fn load(project_root: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_file(project_root, None)
    }

    /// Load configuration with an explicit config file path.
    pub fn load_with_file(
        project_root: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        if let Some(explicit) = config_file.filter(|p| !p.exists()) {
            return Err(ConfigError::NotFound {
                path: explicit.display().to_string(),
            });
        }

        let layers = [
            dirs::home_dir().map(|home| home.join(constants::DEFAULT_DATA_DIR).join("config.toml")),
            project_root.map(|root| root.join(constants::PROJECT_CONFIG_FILE)),
            config_file.map(Path::to_path_buf),
        ];
        let mut layered = toml::Table::new();
        for path in layers.into_iter().flatten().filter(|p| p.exists()) {
            overlay_table(&mut layered, read_table(&path)?);
        }

        let mut config: Config = toml::Value::Table(layered)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;

        apply_env_overrides(&mut config);

        config.monitor.enabled = normalize_monitor_enabled(&config.monitor.enabled);
        if config.resolution.budget_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "resolution.budget_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if config.resolution.context_lines == 0 {
            config.resolution.context_lines = default_context_lines();
        }
        if config.monitor.poll_interval_ms == 0 {
            config.monitor.poll_interval_ms = default_poll_interval_ms();
        }

        Ok(config)
    }
}

/// Parse one config layer without applying defaults, so unset keys stay unset.
fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    std::fs::read_to_string(path)?
        .parse::<toml::Table>()
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
}

/// Write every key of `upper` into `lower`, recursing where both sides hold a table.
fn overlay_table(lower: &mut toml::Table, upper: toml::Table) {
    for (key, value) in upper {
        match (lower.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                overlay_table(existing, nested);
            }
            (_, value) => {
                lower.insert(key, value);
            }
        }
    }
}

fn parse_bool(v: &str) -> bool {
    v == "true" || v == "1"
}

/// Apply environment variable overrides to config fields.
/// Convention: `SHADOWGIT_<SECTION>_<KEY>` in UPPER_SNAKE_CASE.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("SHADOWGIT_SESSION_USE_BRANCHING") {
        config.session.use_branching = parse_bool(&v);
    }
    if let Ok(v) = std::env::var("SHADOWGIT_SESSION_AUTO_MERGE") {
        config.session.auto_merge = parse_bool(&v);
    }
    if let Ok(v) = std::env::var("SHADOWGIT_SESSION_TOPIC") {
        config.session.topic = Some(v).filter(|t| !t.trim().is_empty());
    }
    if let Ok(v) = std::env::var("SHADOWGIT_SESSION_STALE_AFTER_SECS")
        && let Ok(n) = v.parse()
    {
        config.session.stale_after_secs = n;
    }
    if let Ok(v) = std::env::var("SHADOWGIT_IDENTITY_NAME") {
        config.identity.name = v;
    }
    if let Ok(v) = std::env::var("SHADOWGIT_IDENTITY_EMAIL") {
        config.identity.email = v;
    }
    if let Ok(v) = std::env::var("SHADOWGIT_RESOLUTION_BUDGET_SECS")
        && let Ok(n) = v.parse()
    {
        config.resolution.budget_secs = n;
    }
    if let Ok(v) = std::env::var("SHADOWGIT_RESOLUTION_PER_FILE_TIMEOUT_SECS")
        && let Ok(n) = v.parse()
    {
        config.resolution.per_file_timeout_secs = n;
    }
    if let Ok(v) = std::env::var("SHADOWGIT_RESOLUTION_CONTEXT_LINES")
        && let Ok(n) = v.parse()
    {
        config.resolution.context_lines = n;
    }
    if let Ok(v) = std::env::var("SHADOWGIT_RESOLUTION_RESOLVER_PROGRAM") {
        config.resolution.resolver_program = v;
    }
    if let Ok(v) = std::env::var("SHADOWGIT_MONITOR_ENABLED") {
        config.monitor.enabled = v;
    }
    if let Ok(v) = std::env::var("SHADOWGIT_MONITOR_TEST_TIMEOUT_SECS")
        && let Ok(n) = v.parse()
    {
        config.monitor.test_timeout_secs = n;
    }
    if let Ok(v) = std::env::var("SHADOWGIT_LOGGING_LEVEL") {
        config.logging.level = v;
    }
}

fn normalize_monitor_enabled(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => "on".to_string(),
        "auto" => "auto".to_string(),
        _ => "off".to_string(),
    }
}
