//! # Configuration
//!
//! Daemon settings read from the environment (`.env` is loaded by the binary
//! before this runs).

use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use std::str::FromStr;

use crate::features::reminders::ReminderWindows;
use crate::ipc::DEFAULT_SOCKET_PATH;

const DEFAULT_RECORD_URL: &str = "http://localhost:8080/api/medications/record";

/// Upper bound for the before lead, window widths and snooze: one day
const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;

const MAX_TICK_MS: u64 = 60_000;

const MAX_RECORD_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub tick_interval: std::time::Duration,
    pub windows: ReminderWindows,
    pub snooze_duration: Duration,
    pub record_url: String,
    pub record_timeout: std::time::Duration,
    /// Optional YAML schedule installed at startup
    pub schedule_path: Option<String>,
    pub ipc_socket: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str, default: u64, max: u64| -> Result<u64> { bounded(&lookup, key, default, max) };
        let seconds = |key: &str, default: u64, max: u64| -> Result<Duration> {
            let n = number(key, default, max)?;
            Duration::try_seconds(n as i64).ok_or_else(|| anyhow!("{key} is out of range"))
        };
        let millis = |key: &str, default: u64, max: u64| -> Result<Duration> {
            let n = number(key, default, max)?;
            Duration::try_milliseconds(n as i64).ok_or_else(|| anyhow!("{key} is out of range"))
        };

        let windows = ReminderWindows {
            before_lead: seconds("MEDMINDER_BEFORE_LEAD_SECS", 600, MAX_WINDOW_SECS)?,
            before_slack: millis("MEDMINDER_BEFORE_SLACK_MS", 2000, MAX_WINDOW_SECS * 1000)?,
            exact_grace: millis("MEDMINDER_EXACT_GRACE_MS", 3000, MAX_WINDOW_SECS * 1000)?,
        };

        let tick_ms = number("MEDMINDER_TICK_MS", 1000, MAX_TICK_MS)?;
        if tick_ms == 0 {
            return Err(anyhow!("MEDMINDER_TICK_MS must be greater than zero"));
        }
        let tick_interval = std::time::Duration::from_millis(tick_ms);
        windows.validate_for_tick(tick_interval)?;

        let snooze_duration = seconds("MEDMINDER_SNOOZE_SECS", 300, MAX_WINDOW_SECS)?;
        if snooze_duration <= Duration::zero() {
            return Err(anyhow!("MEDMINDER_SNOOZE_SECS must be greater than zero"));
        }
        let record_timeout =
            std::time::Duration::from_secs(number("MEDMINDER_RECORD_TIMEOUT_SECS", 5, MAX_RECORD_TIMEOUT_SECS)?);

        Ok(Self {
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            tick_interval,
            windows,
            snooze_duration,
            record_url: lookup("MEDMINDER_RECORD_URL").unwrap_or_else(|| DEFAULT_RECORD_URL.to_string()),
            record_timeout,
            schedule_path: lookup("MEDMINDER_SCHEDULE_PATH").filter(|p| !p.trim().is_empty()),
            ipc_socket: lookup("MEDMINDER_IPC_SOCKET").unwrap_or_else(|| DEFAULT_SOCKET_PATH.to_string()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

fn bounded<F>(lookup: &F, key: &str, default: u64, max: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default)?;
    if value > max {
        return Err(anyhow!("{key} must be at most {max}, got {value}"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.tick_interval, std::time::Duration::from_secs(1));
        assert_eq!(config.windows, ReminderWindows::default());
        assert_eq!(config.snooze_duration, Duration::minutes(5));
        assert_eq!(config.record_url, DEFAULT_RECORD_URL);
        assert_eq!(config.record_timeout, std::time::Duration::from_secs(5));
        assert_eq!(config.schedule_path, None);
        assert_eq!(config.ipc_socket, DEFAULT_SOCKET_PATH);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("LOG_LEVEL", "debug"),
            ("MEDMINDER_TICK_MS", "500"),
            ("MEDMINDER_BEFORE_LEAD_SECS", "900"),
            ("MEDMINDER_SNOOZE_SECS", "60"),
            ("MEDMINDER_SCHEDULE_PATH", "schedule.yaml"),
        ]))
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.tick_interval, std::time::Duration::from_millis(500));
        assert_eq!(config.windows.before_lead, Duration::minutes(15));
        assert_eq!(config.snooze_duration, Duration::minutes(1));
        assert_eq!(config.schedule_path.as_deref(), Some("schedule.yaml"));
    }

    #[test]
    fn test_rejects_bad_numbers() {
        assert!(Config::from_lookup(lookup_from(&[("MEDMINDER_TICK_MS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("MEDMINDER_TICK_MS", "0")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("MEDMINDER_SNOOZE_SECS", "-5")])).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_durations() {
        for value in ["18446744073709551615", "10000000000000000", "10000000000000", "86401"] {
            assert!(
                Config::from_lookup(lookup_from(&[("MEDMINDER_SNOOZE_SECS", value)])).is_err(),
                "snooze {value} should be rejected"
            );
        }
        assert!(Config::from_lookup(lookup_from(&[("MEDMINDER_BEFORE_LEAD_SECS", "9223372036854775807")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("MEDMINDER_EXACT_GRACE_MS", "18446744073709551615")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("MEDMINDER_RECORD_TIMEOUT_SECS", "100000")])).is_err());

        let config = Config::from_lookup(lookup_from(&[("MEDMINDER_SNOOZE_SECS", "86400")])).unwrap();
        assert_eq!(config.snooze_duration, Duration::days(1));
    }

    #[test]
    fn test_rejects_windows_narrower_than_tick() {
        let result = Config::from_lookup(lookup_from(&[
            ("MEDMINDER_TICK_MS", "5000"),
            ("MEDMINDER_EXACT_GRACE_MS", "3000"),
        ]));
        assert!(result.is_err());
    }
}
