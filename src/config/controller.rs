//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Periodic resync interval (seconds)
    /// Also the tracker lease, so a parent that keeps reconciling never loses its watches
    pub sync_period_secs: u64,
    /// Minimum Fibonacci backoff after a failed reconciliation (minutes)
    pub error_backoff_min_minutes: u64,
    /// Maximum Fibonacci backoff after a failed reconciliation (minutes)
    pub error_backoff_max_minutes: u64,
    /// Exponential backoff starting value for watch stream errors (milliseconds)
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value for watch stream errors (milliseconds)
    pub backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Namespace holding the riff core settings ConfigMap
    pub system_namespace: String,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Maximum concurrent reconciliations per controller
    pub max_concurrent_reconciliations: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            sync_period_secs: DEFAULT_SYNC_PERIOD_SECS,
            error_backoff_min_minutes: DEFAULT_ERROR_BACKOFF_MIN_MINUTES,
            error_backoff_max_minutes: DEFAULT_ERROR_BACKOFF_MAX_MINUTES,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            system_namespace: DEFAULT_SYSTEM_NAMESPACE.to_string(),
            log_level: "riff_system=info".to_string(),
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sync_period_secs: env_var_or_default("SYNC_PERIOD_SECS", defaults.sync_period_secs),
            error_backoff_min_minutes: env_var_or_default(
                "ERROR_BACKOFF_MIN_MINUTES",
                defaults.error_backoff_min_minutes,
            ),
            error_backoff_max_minutes: env_var_or_default(
                "ERROR_BACKOFF_MAX_MINUTES",
                defaults.error_backoff_max_minutes,
            ),
            backoff_start_ms: env_var_or_default("BACKOFF_START_MS", defaults.backoff_start_ms),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", defaults.backoff_max_ms),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                defaults.watch_restart_delay_secs,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                defaults.watch_restart_delay_after_end_secs,
            ),
            system_namespace: env_var_or_default_str(
                "SYSTEM_NAMESPACE",
                &defaults.system_namespace,
            ),
            log_level: env_var_or_default_str("LOG_LEVEL", &defaults.log_level),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
        }
    }

    /// Get resync interval, which doubles as the tracker lease
    #[must_use]
    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    #[must_use]
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }
}

/// Read environment variable or return default value
pub(super) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sync_period_is_ten_hours() {
        let config = ControllerConfig::default();
        assert_eq!(config.sync_period(), Duration::from_secs(36_000));
        assert_eq!(config.system_namespace, "riff-system");
    }

    #[test]
    fn test_env_var_or_default_unset_key() {
        assert_eq!(
            env_var_or_default("RIFF_TEST_SURELY_UNSET_KEY", 42_u64),
            42,
            "unset key should yield the default"
        );
    }
}
