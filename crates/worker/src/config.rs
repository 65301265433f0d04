use std::str::FromStr;
use std::time::Duration;

use herald_core::delivery::RetryPolicy;
use herald_events::DeliveryConfig;

use crate::logging::LogFormat;

/// Configuration error raised at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub alert_tick: Duration,
    pub delivery: DeliveryConfig,
    pub shutdown_timeout: Duration,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `DATABASE_URL`               | (required) |
    /// | `DATABASE_MAX_CONNECTIONS`   | `20`    |
    /// | `ALERT_TICK_SECS`            | `30`    |
    /// | `DELIVERY_TICK_SECS`         | `5`     |
    /// | `DELIVERY_BATCH_SIZE`        | `10`    |
    /// | `DELIVERY_TIMEOUT_SECS`      | `10`    |
    /// | `DELIVERY_BACKOFF_BASE_SECS` | `30`    |
    /// | `DELIVERY_BACKOFF_MAX_SECS`  | `3600`  |
    /// | `DELIVERY_STALE_AFTER_SECS`  | `300`   |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `30`    |
    /// | `LOG_FORMAT`                 | `text`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let max_connections: u32 = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 20)?;
        let alert_tick_secs: u64 = parse_or(&lookup, "ALERT_TICK_SECS", 30)?;
        let delivery_tick_secs: u64 = parse_or(&lookup, "DELIVERY_TICK_SECS", 5)?;
        let batch_size: i64 = parse_or(&lookup, "DELIVERY_BATCH_SIZE", 10)?;
        let timeout_secs: u64 = parse_or(&lookup, "DELIVERY_TIMEOUT_SECS", 10)?;
        let backoff_base_secs: u64 = parse_or(&lookup, "DELIVERY_BACKOFF_BASE_SECS", 30)?;
        let backoff_max_secs: u64 = parse_or(&lookup, "DELIVERY_BACKOFF_MAX_SECS", 3600)?;
        let stale_after_secs: u64 = parse_or(&lookup, "DELIVERY_STALE_AFTER_SECS", 300)?;
        let shutdown_timeout_secs: u64 = parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 30)?;
        let log_format: LogFormat = parse_or(&lookup, "LOG_FORMAT", LogFormat::Text)?;

        require_positive("DATABASE_MAX_CONNECTIONS", u64::from(max_connections))?;
        require_positive("ALERT_TICK_SECS", alert_tick_secs)?;
        require_positive("DELIVERY_TICK_SECS", delivery_tick_secs)?;
        require_positive("DELIVERY_TIMEOUT_SECS", timeout_secs)?;
        if batch_size <= 0 {
            return Err(invalid("DELIVERY_BATCH_SIZE", batch_size, "must be positive"));
        }
        if backoff_base_secs > backoff_max_secs {
            return Err(invalid(
                "DELIVERY_BACKOFF_BASE_SECS",
                backoff_base_secs,
                "must not exceed DELIVERY_BACKOFF_MAX_SECS",
            ));
        }
        // A batch is attempted sequentially, so the last entry of a claim can
        // wait `batch_size * timeout` before its POST starts.
        let worst_case_tick = timeout_secs.saturating_mul(batch_size.unsigned_abs());
        if stale_after_secs <= worst_case_tick {
            return Err(invalid(
                "DELIVERY_STALE_AFTER_SECS",
                stale_after_secs,
                "must exceed DELIVERY_TIMEOUT_SECS * DELIVERY_BATCH_SIZE",
            ));
        }

        Ok(Self {
            database_url,
            max_connections,
            alert_tick: Duration::from_secs(alert_tick_secs),
            delivery: DeliveryConfig {
                tick_interval: Duration::from_secs(delivery_tick_secs),
                batch_size,
                request_timeout: Duration::from_secs(timeout_secs),
                retry_policy: RetryPolicy::new(
                    Duration::from_secs(backoff_base_secs),
                    Duration::from_secs(backoff_max_secs),
                ),
                stale_after: Duration::from_secs(stale_after_secs),
            },
            shutdown_timeout: Duration::from_secs(shutdown_timeout_secs),
            log_format,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &raw, e)),
    }
}

fn require_positive(key: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(key, value, "must be positive"));
    }
    Ok(())
}

fn invalid(key: &'static str, value: impl ToString, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const URL: (&str, &str) = ("DATABASE_URL", "postgres://localhost/herald");

    #[test]
    fn defaults_apply() {
        let config = load(&[URL]).unwrap();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.alert_tick, Duration::from_secs(30));
        assert_eq!(config.delivery.tick_interval, Duration::from_secs(5));
        assert_eq!(config.delivery.batch_size, 10);
        assert_eq!(config.delivery.request_timeout, Duration::from_secs(10));
        assert_eq!(config.delivery.retry_policy.base(), Duration::from_secs(30));
        assert_eq!(config.delivery.retry_policy.max(), Duration::from_secs(3600));
        assert_eq!(config.delivery.stale_after, Duration::from_secs(300));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn database_url_is_required() {
        assert_matches!(load(&[]), Err(ConfigError::Missing("DATABASE_URL")));
        assert_matches!(
            load(&[("DATABASE_URL", "  ")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            URL,
            ("ALERT_TICK_SECS", "60"),
            ("DELIVERY_BATCH_SIZE", " 25 "),
            ("DELIVERY_STALE_AFTER_SECS", "900"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.alert_tick, Duration::from_secs(60));
        assert_eq!(config.delivery.batch_size, 25);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        let err = load(&[URL, ("DELIVERY_TICK_SECS", "soon")]).unwrap_err();
        assert_matches!(
            err,
            ConfigError::Invalid { key: "DELIVERY_TICK_SECS", .. }
        );
    }

    #[test]
    fn zero_intervals_and_batch_are_rejected() {
        assert_matches!(
            load(&[URL, ("ALERT_TICK_SECS", "0")]),
            Err(ConfigError::Invalid { key: "ALERT_TICK_SECS", .. })
        );
        assert_matches!(
            load(&[URL, ("DELIVERY_BATCH_SIZE", "0")]),
            Err(ConfigError::Invalid { key: "DELIVERY_BATCH_SIZE", .. })
        );
    }

    #[test]
    fn backoff_base_above_max_is_rejected() {
        assert_matches!(
            load(&[
                URL,
                ("DELIVERY_BACKOFF_BASE_SECS", "600"),
                ("DELIVERY_BACKOFF_MAX_SECS", "60"),
            ]),
            Err(ConfigError::Invalid { key: "DELIVERY_BACKOFF_BASE_SECS", .. })
        );
    }

    #[test]
    fn stale_threshold_must_cover_a_full_batch() {
        assert_matches!(
            load(&[URL, ("DELIVERY_STALE_AFTER_SECS", "100")]),
            Err(ConfigError::Invalid { key: "DELIVERY_STALE_AFTER_SECS", .. })
        );
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert_matches!(
            load(&[URL, ("LOG_FORMAT", "xml")]),
            Err(ConfigError::Invalid { key: "LOG_FORMAT", .. })
        );
    }
}
