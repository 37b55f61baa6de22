//! Configuration loading and validation.
//!
//! Loads `config.toml` from `$DESKMATE_CONFIG_PATH` or
//! `~/.deskmate/config.toml`. Every field has a default, so a missing file
//! is not an error.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Google account and calendar settings.
    pub google: GoogleConfig,
    /// Limits applied when gathering the context snapshot.
    pub context: ContextConfig,
    /// Hosted language-model settings.
    pub model: ModelConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Google account and calendar settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// Calendar name preferred for new events; falls back to `primary`.
    pub events_calendar: String,
    /// IANA zone used whenever a draft or prompt needs one.
    pub default_time_zone: String,
    /// How long to wait for the browser consent redirect.
    pub consent_timeout_secs: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            events_calendar: default_events_calendar(),
            default_time_zone: default_time_zone(),
            consent_timeout_secs: default_consent_timeout(),
        }
    }
}

/// Limits applied when gathering the context snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum unread messages listed.
    pub max_unread_emails: u32,
    /// Maximum upcoming events listed.
    pub max_upcoming_events: u32,
    /// Maximum task lists scanned.
    pub max_task_lists: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_unread_emails: default_context_limit(),
            max_upcoming_events: default_context_limit(),
            max_task_lists: default_context_limit(),
        }
    }
}

/// Hosted language-model settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model name passed to the generate endpoint.
    pub name: String,
    /// Output token ceiling for every reply.
    pub max_output_tokens: u32,
    /// Request `application/json` output from the endpoint.
    pub json_mode: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            max_output_tokens: default_max_output_tokens(),
            json_mode: true,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for rotated JSON logs. Console only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

// Default value functions for serde

fn default_events_calendar() -> String {
    "Events".to_owned()
}
fn default_time_zone() -> String {
    "Asia/Bangkok".to_owned()
}
fn default_consent_timeout() -> u64 {
    300
}
fn default_context_limit() -> u32 {
    10
}
fn default_model_name() -> String {
    "gemini-2.0-flash".to_owned()
}
fn default_max_output_tokens() -> u32 {
    1000
}
fn default_log_level() -> String {
    "info".to_owned()
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed,
    /// or if the merged configuration fails validation.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path_with(|key| std::env::var(key).ok())?;
        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read config at {}: {e}",
                    path.display()
                ))
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or has wrong field types.
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("invalid config TOML")
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests need not touch the process env.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("DESKMATE_TIME_ZONE") {
            self.google.default_time_zone = v;
        }
        if let Some(v) = env("DESKMATE_EVENTS_CALENDAR") {
            self.google.events_calendar = v;
        }
        if let Some(v) = env("DESKMATE_MODEL") {
            self.model.name = v;
        }
        if let Some(v) = env("DESKMATE_MAX_OUTPUT_TOKENS") {
            match v.parse() {
                Ok(n) => self.model.max_output_tokens = n,
                Err(_) => tracing::warn!(
                    var = "DESKMATE_MAX_OUTPUT_TOKENS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("DESKMATE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env("DESKMATE_LOG_DIR") {
            self.logging.dir = Some(PathBuf::from(v));
        }
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.google
            .default_time_zone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| {
                anyhow::anyhow!(
                    "google.default_time_zone {:?} is not a known IANA time zone",
                    self.google.default_time_zone
                )
            })?;
        if self.google.events_calendar.trim().is_empty() {
            anyhow::bail!("google.events_calendar must not be empty");
        }
        if self.model.name.trim().is_empty() {
            anyhow::bail!("model.name must not be empty");
        }
        if self.model.max_output_tokens == 0 {
            anyhow::bail!("model.max_output_tokens must be greater than zero");
        }
        if self.context.max_unread_emails == 0
            || self.context.max_upcoming_events == 0
            || self.context.max_task_lists == 0
        {
            anyhow::bail!("context limits must be greater than zero");
        }
        Ok(())
    }

    /// The configured default zone, parsed.
    ///
    /// Falls back to UTC only if [`Config::validate`] was skipped.
    pub fn time_zone(&self) -> chrono_tz::Tz {
        self.google
            .default_time_zone
            .parse()
            .unwrap_or(chrono_tz::UTC)
    }
}

/// Resolve the config directory (`~/.deskmate/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".deskmate"))
}

/// Resolve the config file path using a custom env resolver.
///
/// Checks `$DESKMATE_CONFIG_PATH` first, then `~/.deskmate/config.toml`.
///
/// # Errors
///
/// Returns an error if no override is set and the home directory is unknown.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<PathBuf> {
    if let Some(p) = env("DESKMATE_CONFIG_PATH") {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir()?.join("config.toml"))
}

/// Load configuration from an explicit TOML file, without env overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config = Config::from_toml(&contents)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
