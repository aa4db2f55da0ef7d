//! Engine configuration.
//!
//! Precedence: `HEDDLE_*` environment variables over the YAML file over the
//! built-in defaults. Durations are written in humantime form (`5m`, `2h`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{InboxQuery, RecoveryPolicy};

pub const CONFIG_PATH_VAR: &str = "HEDDLE_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {var}: '{value}' ({message})")]
    Env {
        var: &'static str,
        value: String,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeddleConfig {
    /// Heartbeat age after which a holder's claims are reset to pending.
    #[serde(with = "humantime_serde")]
    pub reclaim_after: Duration,

    /// Heartbeat age after which an instance record is deleted.
    #[serde(with = "humantime_serde")]
    pub reap_after: Duration,

    /// Age after which activity entries are pruned by the sweep.
    #[serde(with = "humantime_serde")]
    pub activity_retention: Duration,

    /// Window used by `active_instances`.
    #[serde(with = "humantime_serde")]
    pub active_window: Duration,

    /// TTL for messages sent without one.
    #[serde(with = "humantime_serde")]
    pub message_ttl: Duration,

    pub inbox_limit: usize,

    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
}

impl Default for HeddleConfig {
    fn default() -> Self {
        Self {
            reclaim_after: Duration::from_secs(5 * 60),
            reap_after: Duration::from_secs(2 * 60 * 60),
            activity_retention: Duration::from_secs(7 * 24 * 60 * 60),
            active_window: Duration::from_secs(30 * 60),
            message_ttl: Duration::from_secs(24 * 60 * 60),
            inbox_limit: InboxQuery::DEFAULT_LIMIT,
            sweep_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl HeddleConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// File named by `HEDDLE_CONFIG_PATH` (or defaults), then env overrides,
    /// then validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => {
                tracing::info!(%path, "loading configuration file");
                Self::from_yaml_file(path)?
            }
            Err(_) => Self::default(),
        };
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `HEDDLE_*` variables as returned by `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let durations: [(&'static str, &mut Duration); 7] = [
            ("HEDDLE_RECLAIM_AFTER", &mut self.reclaim_after),
            ("HEDDLE_REAP_AFTER", &mut self.reap_after),
            ("HEDDLE_ACTIVITY_RETENTION", &mut self.activity_retention),
            ("HEDDLE_ACTIVE_WINDOW", &mut self.active_window),
            ("HEDDLE_MESSAGE_TTL", &mut self.message_ttl),
            ("HEDDLE_SWEEP_INTERVAL", &mut self.sweep_interval),
            ("HEDDLE_HEARTBEAT_INTERVAL", &mut self.heartbeat_interval),
        ];
        for (var, field) in durations {
            if let Some(value) = lookup(var) {
                *field = humantime::parse_duration(value.trim()).map_err(|e| ConfigError::Env {
                    var,
                    value: value.clone(),
                    message: e.to_string(),
                })?;
                tracing::debug!(var, %value, "environment override");
            }
        }

        if let Some(value) = lookup("HEDDLE_INBOX_LIMIT") {
            self.inbox_limit = value.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Env {
                    var: "HEDDLE_INBOX_LIMIT",
                    value: value.clone(),
                    message: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("reclaim_after", self.reclaim_after),
            ("reap_after", self.reap_after),
            ("activity_retention", self.activity_retention),
            ("active_window", self.active_window),
            ("message_ttl", self.message_ttl),
            ("sweep_interval", self.sweep_interval),
            ("heartbeat_interval", self.heartbeat_interval),
        ];
        if let Some((name, _)) = named.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
        }
        if self.inbox_limit == 0 {
            return Err(ConfigError::Invalid("inbox_limit must be non-zero".into()));
        }
        if self.reclaim_after >= self.reap_after {
            return Err(ConfigError::Invalid(format!(
                "reclaim_after ({}) must be shorter than reap_after ({})",
                humantime::format_duration(self.reclaim_after),
                humantime::format_duration(self.reap_after)
            )));
        }
        Ok(())
    }

    pub fn recovery_policy(&self) -> Result<RecoveryPolicy, ConfigError> {
        let retention = to_chrono(self.activity_retention)?;
        RecoveryPolicy::new(
            to_chrono(self.reclaim_after)?,
            to_chrono(self.reap_after)?,
        )
        .and_then(|policy| policy.with_activity_retention(retention))
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn active_window_chrono(&self) -> Result<chrono::Duration, ConfigError> {
        to_chrono(self.active_window)
    }

    pub fn message_ttl_chrono(&self) -> Result<chrono::Duration, ConfigError> {
        to_chrono(self.message_ttl)
    }
}

fn to_chrono(d: Duration) -> Result<chrono::Duration, ConfigError> {
    chrono::Duration::from_std(d).map_err(|e| ConfigError::Invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = HeddleConfig::default();
        config.validate().unwrap();
        assert_eq!(config.reclaim_after, Duration::from_secs(300));
        assert_eq!(config.reap_after, Duration::from_secs(7200));
        assert_eq!(config.inbox_limit, 50);
    }

    #[test]
    fn yaml_fills_missing_fields_with_defaults() {
        let config = HeddleConfig::from_yaml_str("reclaim_after: 2m\nmessage_ttl: 1h\n").unwrap();
        assert_eq!(config.reclaim_after, Duration::from_secs(120));
        assert_eq!(config.message_ttl, Duration::from_secs(3600));
        assert_eq!(config.reap_after, Duration::from_secs(7200));
    }

    #[test]
    fn env_overrides_win() {
        let mut config = HeddleConfig::default();
        config
            .apply_env_overrides(env(&[
                ("HEDDLE_REAP_AFTER", "3h"),
                ("HEDDLE_INBOX_LIMIT", "10"),
                ("HEDDLE_ACTIVITY_RETENTION", "2days"),
            ]))
            .unwrap();
        assert_eq!(config.reap_after, Duration::from_secs(3 * 3600));
        assert_eq!(config.activity_retention, Duration::from_secs(2 * 86400));
        assert_eq!(
            config.recovery_policy().unwrap().activity_retention,
            chrono::Duration::days(2)
        );
        assert_eq!(config.inbox_limit, 10);
    }

    #[test]
    fn bad_env_value_names_the_variable() {
        let mut config = HeddleConfig::default();
        let err = config
            .apply_env_overrides(env(&[("HEDDLE_SWEEP_INTERVAL", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("HEDDLE_SWEEP_INTERVAL"));
    }

    #[test]
    fn reclaim_must_be_shorter_than_reap() {
        let config = HeddleConfig {
            reclaim_after: Duration::from_secs(7200),
            ..HeddleConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(config.recovery_policy().is_err());
    }

    #[test]
    fn zero_duration_is_rejected() {
        let config = HeddleConfig {
            heartbeat_interval: Duration::ZERO,
            ..HeddleConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("heartbeat_interval"));
    }
}
