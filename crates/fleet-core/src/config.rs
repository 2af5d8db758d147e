//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so an empty (or missing) file is a valid
//! configuration. Durations are stored as integer seconds/milliseconds and
//! exposed as [`Duration`] through accessor methods.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DomainError, DomainResult};
use crate::ServerConfig;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "FLEET_CONFIG";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "FLEET_DATA_DIR";

/// Characters probed by a discovery pass, in order.
pub const DEFAULT_DISCOVERY_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789_";

// ============================================================================
// Top-Level Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Where the file store keeps its state and log files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Used when the store holds no server config.
    pub server: ServerConfig,
    pub connect: ConnectConfig,
    pub reconnect: ReconnectPolicy,
    pub keepalive: KeepaliveConfig,
    pub addon: AddonConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            server: ServerConfig::default(),
            connect: ConnectConfig::default(),
            reconnect: ReconnectPolicy::default(),
            keepalive: KeepaliveConfig::default(),
            addon: AddonConfig::default(),
        }
    }
}

impl FleetConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> DomainResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| DomainError::ParseError {
            field: "config".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> DomainResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| DomainError::ParseError {
            field: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Loads from `$FLEET_CONFIG`, else `<config_dir>/fleet/config.toml`.
    pub fn load_default() -> DomainResult<Self> {
        Self::load(&Self::default_path())
    }

    /// The path `load_default` reads.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fleet")
            .join("config.toml")
    }

    /// Data directory: `$FLEET_DATA_DIR`, then `data_dir`, then `<state_dir>/fleet`.
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Ok(dir) = env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("fleet")
    }

    /// Rejects zero intervals and inverted ranges.
    pub fn validate(&self) -> DomainResult<()> {
        if self.server.host.trim().is_empty() {
            return Err(invalid("server.host", "", "non-empty host"));
        }
        if self.connect.timeout_secs == 0 {
            return Err(invalid("connect.timeout_secs", "0", "> 0"));
        }
        check_range(
            "connect.spawn_delay",
            self.connect.spawn_delay_min_secs,
            self.connect.spawn_delay_max_secs,
        )?;
        if self.reconnect.base_delay_secs == 0 {
            return Err(invalid("reconnect.base_delay_secs", "0", "> 0"));
        }
        if self.keepalive.min_interval_secs == 0 {
            return Err(invalid("keepalive.min_interval_secs", "0", "> 0"));
        }
        check_range(
            "keepalive.interval",
            self.keepalive.min_interval_secs,
            self.keepalive.max_interval_secs,
        )?;
        if self.keepalive.retry_secs == 0 {
            return Err(invalid("keepalive.retry_secs", "0", "> 0"));
        }
        if self.addon.discovery_alphabet.is_empty() {
            return Err(invalid("addon.discovery_alphabet", "", "at least one character"));
        }
        check_range(
            "addon.team_join_delay",
            self.addon.team_join_min_delay_ms,
            self.addon.team_join_max_delay_ms,
        )?;
        if self.addon.min_loop_interval_secs == 0 {
            return Err(invalid("addon.min_loop_interval_secs", "0", "> 0"));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, expected: &str) -> DomainError {
    DomainError::InvalidFieldValue {
        field: field.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

fn check_range(field: &str, min: u64, max: u64) -> DomainResult<()> {
    if min > max {
        return Err(invalid(field, &format!("{min}..{max}"), "min <= max"));
    }
    Ok(())
}

// ============================================================================
// Sections
// ============================================================================

/// Whether a session sends scripted chat after spawning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectMode {
    /// Startup commands after the spawn delay, then keepalive.
    #[default]
    Standard,
    /// Keepalive only; no chat output at all.
    Silent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Hard bound on open + spawn.
    pub timeout_secs: u64,
    pub spawn_delay_min_secs: u64,
    pub spawn_delay_max_secs: u64,
    /// Sent once, in order, after the spawn delay (standard mode only).
    pub startup_commands: Vec<String>,
    pub mode: ConnectMode,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            spawn_delay_min_secs: 10,
            spawn_delay_max_secs: 20,
            startup_commands: Vec::new(),
            mode: ConnectMode::Standard,
        }
    }
}

impl ConnectConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn spawn_delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.spawn_delay_min_secs),
            Duration::from_secs(self.spawn_delay_max_secs),
        )
    }
}

/// Linear reconnect backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub base_delay_secs: u64,
    pub max_attempts: u32,
    /// Extra wait after a kick that says the account is online elsewhere.
    pub duplicate_login_delay_secs: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_secs: 5,
            max_attempts: 10,
            duplicate_login_delay_secs: 15,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the next attempt: `base * (attempts + 1)`, plus the
    /// duplicate-login wait when `duplicate_login` is set.
    ///
    /// Growth is linear in the attempt number.
    pub fn delay_for(&self, attempts: u32, duplicate_login: bool) -> Duration {
        let linear = Duration::from_secs(self.base_delay_secs)
            .saturating_mul(attempts.saturating_add(1));
        if duplicate_login {
            linear.saturating_add(Duration::from_secs(self.duplicate_login_delay_secs))
        } else {
            linear
        }
    }

    /// True when another attempt is allowed after `attempts` retries.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.enabled && attempts < self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
    /// Retry delay when the client has no live entity at fire time.
    pub retry_secs: u64,
    /// How long the movement flag stays on.
    pub pulse_ms: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 45,
            max_interval_secs: 75,
            retry_secs: 5,
            pulse_ms: 100,
        }
    }
}

impl KeepaliveConfig {
    pub fn interval_range(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.min_interval_secs),
            Duration::from_secs(self.max_interval_secs),
        )
    }

    pub fn retry(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }

    pub fn pulse(&self) -> Duration {
        Duration::from_millis(self.pulse_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddonConfig {
    pub discovery_alphabet: String,
    pub discovery_step_ms: u64,
    pub team_join_min_delay_ms: u64,
    pub team_join_max_delay_ms: u64,
    /// Shortest command-loop interval accepted.
    pub min_loop_interval_secs: u64,
}

impl Default for AddonConfig {
    fn default() -> Self {
        Self {
            discovery_alphabet: DEFAULT_DISCOVERY_ALPHABET.to_string(),
            discovery_step_ms: 200,
            team_join_min_delay_ms: 1000,
            team_join_max_delay_ms: 3000,
            min_loop_interval_secs: 5,
        }
    }
}

impl AddonConfig {
    pub fn discovery_step(&self) -> Duration {
        Duration::from_millis(self.discovery_step_ms)
    }

    pub fn team_join_delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.team_join_min_delay_ms),
            Duration::from_millis(self.team_join_max_delay_ms),
        )
    }
}
