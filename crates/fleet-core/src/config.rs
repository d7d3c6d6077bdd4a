use crate::classifier::{default_markers, MarkerPolicy};
use crate::dispatcher::DEFAULT_CONCURRENCY;
use crate::error::{FleetError, Result};
use crate::io::atomic_write;
use crate::orchestrator::LifecycleOptions;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// `ssh <host> -- <command>`
    #[default]
    Ssh,
    /// `sh -c <command>` on this machine; the host name is only a label.
    Local,
}

// ---------------------------------------------------------------------------
// ServiceCommands
// ---------------------------------------------------------------------------

/// Remote command templates. `{items}` expands to the space-separated item names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCommands {
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default = "default_stop")]
    pub stop: String,
    /// Must print one systemd `ActiveState` per item, in argument order.
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

// `--no-block` returns once the job is queued; convergence is the wait step's job.
fn default_start() -> String {
    "sudo systemctl --no-block start {items}".to_string()
}

fn default_stop() -> String {
    "sudo systemctl --no-block stop {items}".to_string()
}

fn default_state() -> String {
    "systemctl show --property=ActiveState --value {items}".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for ServiceCommands {
    fn default() -> Self {
        Self {
            start: default_start(),
            stop: default_stop(),
            state: default_state(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// WebCommands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebCommands {
    /// Presence of this file takes the host out of load-balancer rotation.
    #[serde(default = "default_marker_path")]
    pub marker_path: String,
    #[serde(default = "default_reset_command")]
    pub reset_command: String,
}

fn default_marker_path() -> String {
    "/var/www/html/.out-of-rotation".to_string()
}

fn default_reset_command() -> String {
    "sudo systemctl restart nginx".to_string()
}

impl Default for WebCommands {
    fn default() -> Self {
        Self {
            marker_path: default_marker_path(),
            reset_command: default_reset_command(),
        }
    }
}

// ---------------------------------------------------------------------------
// RemoteConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_ssh_program")]
    pub ssh_program: String,
    #[serde(default = "default_ssh_options")]
    pub ssh_options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_ping_program")]
    pub ping_program: String,
    #[serde(default)]
    pub services: ServiceCommands,
    #[serde(default)]
    pub web: WebCommands,
}

fn default_ssh_program() -> String {
    "ssh".to_string()
}

fn default_ssh_options() -> Vec<String> {
    vec!["-o".to_string(), "BatchMode=yes".to_string()]
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    120
}

fn default_ping_program() -> String {
    "ping".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            ssh_program: default_ssh_program(),
            ssh_options: default_ssh_options(),
            user: None,
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            ping_program: default_ping_program(),
            services: ServiceCommands::default(),
            web: WebCommands::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_quiet")]
    pub quiet: bool,
    #[serde(default = "default_probe_count")]
    pub probe_count: u32,
    #[serde(default = "default_markers")]
    pub priority_markers: Vec<String>,
    /// Snapshot used instead of live discovery. Relative to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<PathBuf>,
    #[serde(default)]
    pub remote: RemoteConfig,
}

fn default_version() -> u32 {
    1
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_quiet() -> bool {
    true
}

fn default_probe_count() -> u32 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            cooldown_secs: default_cooldown_secs(),
            quiet: default_quiet(),
            probe_count: default_probe_count(),
            priority_markers: default_markers(),
            inventory: None,
            remote: RemoteConfig::default(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(FleetError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like [`Config::load`], but an uninitialised root yields the defaults.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        match Self::load(root) {
            Err(FleetError::NotInitialized) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        atomic_write(&paths::config_path(root), data.as_bytes())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn lifecycle_options(&self) -> LifecycleOptions {
        LifecycleOptions {
            timeout: self.timeout(),
            cooldown: self.cooldown(),
        }
    }

    pub fn tier_policy(&self) -> MarkerPolicy {
        MarkerPolicy::new(&self.priority_markers)
    }

    /// Snapshot path, anchored at `root`.
    pub fn inventory_path(&self, root: &Path) -> Option<PathBuf> {
        self.inventory
            .as_deref()
            .map(|p| paths::resolve_from_root(root, p))
    }

    /// Check for settings that would make runs fail or behave surprisingly.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        if self.concurrency == 0 {
            push(WarnLevel::Error, "concurrency must be at least 1".to_string());
        }
        if self.probe_count == 0 {
            push(
                WarnLevel::Error,
                "probe_count is 0: every target would be reported unreachable".to_string(),
            );
        }
        if self.timeout_secs == 0 {
            push(
                WarnLevel::Warning,
                "timeout_secs is 0: lifecycle waits give up immediately".to_string(),
            );
        }
        if self.cooldown_secs == 0 {
            push(
                WarnLevel::Warning,
                "cooldown_secs is 0: dependent services start with no settling time".to_string(),
            );
        }
        if self.priority_markers.iter().all(|m| m.trim().is_empty()) {
            push(
                WarnLevel::Warning,
                "priority_markers is empty: every item runs in the normal tier".to_string(),
            );
        }
        for (name, template) in [
            ("services.start", &self.remote.services.start),
            ("services.stop", &self.remote.services.stop),
            ("services.state", &self.remote.services.state),
        ] {
            if !template.contains("{items}") {
                push(
                    WarnLevel::Error,
                    format!("remote.{name} does not reference {{items}}"),
                );
            }
        }
        if self.remote.web.marker_path.trim().is_empty() {
            push(WarnLevel::Error, "remote.web.marker_path is empty".to_string());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
