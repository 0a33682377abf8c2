use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use url::Url;

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "transport.base_url") is overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    /// Get all overrides as a map of setting key -> env var name.
    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Settings report entry
// ---------------------------------------------------------------------------

/// A single effective setting, as printed by the `config` command.
#[derive(Debug, Clone, Serialize)]
pub struct SettingEntry {
    /// Dotted key path (e.g. "auth.login_url").
    pub key: String,
    /// Current effective value.
    pub value: serde_json::Value,
    /// The env var that can override this setting.
    pub env_var: String,
    /// Whether the setting is currently overridden by the env var.
    pub overridden: bool,
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Default base address for relative request paths.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl TransportConfig {
    pub fn parsed_base_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    /// Where the host is sent when the session ends.
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// Where the host is sent after a completed login callback.
    #[serde(default = "default_post_login_url")]
    pub post_login_url: String,
    #[serde(default = "default_reactive_buffer_secs")]
    pub reactive_buffer_secs: i64,
    #[serde(default = "default_proactive_buffer_secs")]
    pub proactive_buffer_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_path: default_refresh_path(),
            login_url: default_login_url(),
            post_login_url: default_post_login_url(),
            reactive_buffer_secs: default_reactive_buffer_secs(),
            proactive_buffer_secs: default_proactive_buffer_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    /// Base directory for the file backend; one subdirectory per API origin.
    #[serde(default = "default_credential_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            dir: default_credential_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Keyring => write!(f, "keyring"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown storage backend: {s}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}
const fn default_timeout_secs() -> u64 {
    30
}
const fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    crate::net::client::USER_AGENT.to_string()
}
fn default_refresh_path() -> String {
    crate::refresh::DEFAULT_REFRESH_PATH.to_string()
}
fn default_login_url() -> String {
    "/login".to_string()
}
fn default_post_login_url() -> String {
    "/workspace".to_string()
}
const fn default_reactive_buffer_secs() -> i64 {
    crate::expiry::REACTIVE_BUFFER_SECS
}
const fn default_proactive_buffer_secs() -> i64 {
    crate::expiry::PROACTIVE_BUFFER_SECS
}
fn default_storage_backend() -> StorageBackend {
    StorageBackend::File
}
fn default_credential_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sessiongate")
        .join("credentials")
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Config loading, env overrides, and settings report
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `SESSIONGATE_` takes precedence
    /// over the file value and is tracked in `env_overrides`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save the current (file-level) configuration to a TOML file.
    /// This serializes the config without env overrides applied.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides read through `lookup`.
    ///
    /// Every supported setting has a corresponding `SESSIONGATE_*` variable.
    /// When present its value replaces the file/default value and the setting
    /// key is recorded in `env_overrides`.
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let mut ov = EnvOverrides::default();

        // -- Helpers (macros for concise per-field overrides) --

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    } else {
                        tracing::warn!(var = $env, value = %val, "Ignoring unparsable env override");
                    }
                }
            };
        }
        macro_rules! env_path {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    $field = PathBuf::from(val);
                    ov.record($key, $env);
                }
            };
        }

        // -- Transport --
        env_str!("transport.base_url", "SESSIONGATE_API_BASE_URL", self.transport.base_url);
        env_parse!("transport.timeout_secs", "SESSIONGATE_TIMEOUT_SECS", self.transport.timeout_secs);
        env_parse!(
            "transport.connect_timeout_secs",
            "SESSIONGATE_CONNECT_TIMEOUT_SECS",
            self.transport.connect_timeout_secs
        );
        env_str!("transport.user_agent", "SESSIONGATE_USER_AGENT", self.transport.user_agent);

        // -- Auth --
        env_str!("auth.refresh_path", "SESSIONGATE_REFRESH_PATH", self.auth.refresh_path);
        env_str!("auth.login_url", "SESSIONGATE_LOGIN_REDIRECT", self.auth.login_url);
        env_str!("auth.post_login_url", "SESSIONGATE_POST_LOGIN_REDIRECT", self.auth.post_login_url);
        env_parse!(
            "auth.reactive_buffer_secs",
            "SESSIONGATE_REACTIVE_BUFFER_SECS",
            self.auth.reactive_buffer_secs
        );
        env_parse!(
            "auth.proactive_buffer_secs",
            "SESSIONGATE_PROACTIVE_BUFFER_SECS",
            self.auth.proactive_buffer_secs
        );

        // -- Storage --
        env_parse!("storage.backend", "SESSIONGATE_STORAGE_BACKEND", self.storage.backend);
        env_path!("storage.dir", "SESSIONGATE_STORAGE_DIR", self.storage.dir);

        // -- Logging --
        env_str!("logging.level", "SESSIONGATE_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "SESSIONGATE_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }

    /// Every effective setting with its env var and override state.
    pub fn settings_report(&self) -> Vec<SettingEntry> {
        let entry = |key: &str, env_var: &str, value: serde_json::Value| SettingEntry {
            key: key.to_string(),
            value,
            env_var: env_var.to_string(),
            overridden: self.env_overrides.is_overridden(key),
        };

        vec![
            entry(
                "transport.base_url",
                "SESSIONGATE_API_BASE_URL",
                self.transport.base_url.clone().into(),
            ),
            entry(
                "transport.timeout_secs",
                "SESSIONGATE_TIMEOUT_SECS",
                self.transport.timeout_secs.into(),
            ),
            entry(
                "transport.connect_timeout_secs",
                "SESSIONGATE_CONNECT_TIMEOUT_SECS",
                self.transport.connect_timeout_secs.into(),
            ),
            entry(
                "transport.user_agent",
                "SESSIONGATE_USER_AGENT",
                self.transport.user_agent.clone().into(),
            ),
            entry(
                "auth.refresh_path",
                "SESSIONGATE_REFRESH_PATH",
                self.auth.refresh_path.clone().into(),
            ),
            entry(
                "auth.login_url",
                "SESSIONGATE_LOGIN_REDIRECT",
                self.auth.login_url.clone().into(),
            ),
            entry(
                "auth.post_login_url",
                "SESSIONGATE_POST_LOGIN_REDIRECT",
                self.auth.post_login_url.clone().into(),
            ),
            entry(
                "auth.reactive_buffer_secs",
                "SESSIONGATE_REACTIVE_BUFFER_SECS",
                self.auth.reactive_buffer_secs.into(),
            ),
            entry(
                "auth.proactive_buffer_secs",
                "SESSIONGATE_PROACTIVE_BUFFER_SECS",
                self.auth.proactive_buffer_secs.into(),
            ),
            entry(
                "storage.backend",
                "SESSIONGATE_STORAGE_BACKEND",
                self.storage.backend.to_string().into(),
            ),
            entry(
                "storage.dir",
                "SESSIONGATE_STORAGE_DIR",
                self.storage.dir.display().to_string().into(),
            ),
            entry(
                "logging.level",
                "SESSIONGATE_LOG_LEVEL",
                self.logging.level.clone().into(),
            ),
            entry("logging.json", "SESSIONGATE_LOG_JSON", self.logging.json.into()),
        ]
    }
}

// Helper for default credential storage directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
