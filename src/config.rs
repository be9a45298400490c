//! Configuration management for Meterguard.

use std::collections::HashMap;
use std::path::Path;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MeterguardError, Result};

/// Prefix for environment variable overrides, e.g. `METERGUARD__LIMITER__SHORT_WINDOW_LIMIT`.
const ENV_PREFIX: &str = "METERGUARD";

/// Longest accepted window: one hundred years.
pub const MAX_WINDOW_SECS: u64 = 100 * 365 * 86_400;

/// Main configuration for Meterguard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterguardConfig {
    /// Limits applied to upstreams without their own entry
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Per-upstream limit overrides, keyed by upstream name
    #[serde(default)]
    pub upstreams: HashMap<String, LimiterConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Caps and window lengths for one dual-window limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum accepted events inside the short window
    #[serde(default = "default_short_window_limit")]
    pub short_window_limit: u64,

    /// Maximum accepted events inside the long window
    #[serde(default = "default_long_window_limit")]
    pub long_window_limit: u64,

    /// Length of the short window in seconds
    #[serde(default = "default_short_window_secs")]
    pub short_window_secs: u64,

    /// Length of the long window in seconds
    #[serde(default = "default_long_window_secs")]
    pub long_window_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            short_window_limit: default_short_window_limit(),
            long_window_limit: default_long_window_limit(),
            short_window_secs: default_short_window_secs(),
            long_window_secs: default_long_window_secs(),
        }
    }
}

fn default_short_window_limit() -> u64 {
    10
}

fn default_long_window_limit() -> u64 {
    100
}

fn default_short_window_secs() -> u64 {
    60
}

fn default_long_window_secs() -> u64 {
    86_400
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
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

fn default_log_level() -> String {
    "info".to_string()
}

impl LimiterConfig {
    /// Create a config with the given caps and the default window lengths.
    pub fn with_limits(short_window_limit: u64, long_window_limit: u64) -> Self {
        Self {
            short_window_limit,
            long_window_limit,
            ..Self::default()
        }
    }

    /// Length of the short window.
    pub fn short_window(&self) -> Result<TimeDelta> {
        window_from_secs("short_window_secs", self.short_window_secs)
    }

    /// Length of the long window.
    pub fn long_window(&self) -> Result<TimeDelta> {
        window_from_secs("long_window_secs", self.long_window_secs)
    }

    /// Check that the windows are usable.
    ///
    /// The short window may not outlast the long one: every event still in
    /// the short window must also be in the long window.
    pub fn validate(&self) -> Result<()> {
        let short = self.short_window()?;
        let long = self.long_window()?;
        if short > long {
            return Err(MeterguardError::Config(format!(
                "short window ({}s) must not be longer than long window ({}s)",
                self.short_window_secs, self.long_window_secs
            )));
        }
        if self.short_window_limit == 0 || self.long_window_limit == 0 {
            warn!(
                short_window_limit = self.short_window_limit,
                long_window_limit = self.long_window_limit,
                "A window limit of zero denies every request"
            );
        }
        Ok(())
    }
}

fn window_from_secs(field: &str, secs: u64) -> Result<TimeDelta> {
    if secs == 0 {
        return Err(MeterguardError::Config(format!("{} must be greater than zero", field)));
    }
    if secs > MAX_WINDOW_SECS {
        return Err(MeterguardError::Config(format!(
            "{} must be at most {}: {}",
            field, MAX_WINDOW_SECS, secs
        )));
    }
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| MeterguardError::Config(format!("{} is out of range: {}", field, secs)))
}

impl MeterguardConfig {
    /// Load configuration from an optional YAML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }
        let loaded: MeterguardConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: MeterguardConfig = serde_yaml::from_str(yaml)
            .map_err(|e| MeterguardError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| MeterguardError::Config(e.to_string()))
    }

    /// Validate the default limits and every upstream override.
    pub fn validate(&self) -> Result<()> {
        self.limiter.validate()?;
        for (name, limits) in &self.upstreams {
            limits
                .validate()
                .map_err(|e| MeterguardError::Config(format!("upstream '{}': {}", name, e)))?;
        }
        Ok(())
    }

    /// Limits for the named upstream, falling back to the defaults.
    pub fn limits_for(&self, upstream: &str) -> &LimiterConfig {
        self.upstreams.get(upstream).unwrap_or(&self.limiter)
    }
}
