//! Waiter defaults loaded from the environment.

use converge_engine::WaiterSpec;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default waiter settings.
///
/// Every field has a default, so an empty environment is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `CONVERGE_TIMEOUT_SECS`, default 30 minutes
    pub timeout: Duration,
    /// `CONVERGE_POLL_INTERVAL_MS`, default 10 seconds
    pub poll_interval: Duration,
    /// `CONVERGE_NOT_FOUND_CHECKS`
    pub not_found_checks: u32,
    /// `CONVERGE_CONTINUOUS_TARGET`
    pub continuous_target: u32,
    /// `CONVERGE_DELAY_MS`
    pub delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(10),
            not_found_checks: 20,
            continuous_target: 2,
            delay: Duration::ZERO,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let timeout = parse(&lookup, "CONVERGE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        let poll_interval = parse(&lookup, "CONVERGE_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let not_found_checks =
            parse(&lookup, "CONVERGE_NOT_FOUND_CHECKS")?.unwrap_or(defaults.not_found_checks);
        let continuous_target =
            parse(&lookup, "CONVERGE_CONTINUOUS_TARGET")?.unwrap_or(defaults.continuous_target);
        let delay = parse(&lookup, "CONVERGE_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.delay);

        if timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "CONVERGE_TIMEOUT_SECS",
                value: "0".into(),
            });
        }
        if poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                name: "CONVERGE_POLL_INTERVAL_MS",
                value: "0".into(),
            });
        }
        if continuous_target == 0 {
            return Err(ConfigError::Invalid {
                name: "CONVERGE_CONTINUOUS_TARGET",
                value: "0".into(),
            });
        }

        Ok(Self {
            timeout,
            poll_interval,
            not_found_checks,
            continuous_target,
            delay,
        })
    }

    /// Build a waiter spec with these defaults.
    pub fn waiter_spec<P, T>(&self, pending: P, target: T) -> converge_engine::Result<WaiterSpec>
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        WaiterSpec::builder()
            .pending(pending)
            .target(target)
            .timeout(self.timeout)
            .poll_interval(self.poll_interval)
            .not_found_tolerance(self.not_found_checks)
            .continuous_target_occurrence(self.continuous_target)
            .delay(self.delay)
            .build()
    }
}

fn parse<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {name} value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.timeout, Duration::from_secs(1800));
        assert_eq!(config.not_found_checks, 20);
        assert_eq!(config.continuous_target, 2);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("CONVERGE_TIMEOUT_SECS", "60"),
            ("CONVERGE_POLL_INTERVAL_MS", " 250 "),
            ("CONVERGE_NOT_FOUND_CHECKS", "0"),
            ("CONVERGE_CONTINUOUS_TARGET", "3"),
            ("CONVERGE_DELAY_MS", "1000"),
        ]))
        .unwrap();

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.not_found_checks, 0);
        assert_eq!(config.continuous_target, 3);
        assert_eq!(config.delay, Duration::from_secs(1));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = Config::from_lookup(lookup(&[("CONVERGE_NOT_FOUND_CHECKS", "many")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid CONVERGE_NOT_FOUND_CHECKS value: \"many\""
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Config::from_lookup(lookup(&[("CONVERGE_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "CONVERGE_TIMEOUT_SECS",
                ..
            }
        ));
    }

    #[test]
    fn waiter_spec_carries_defaults() {
        let spec = Config::default()
            .waiter_spec(["Pending"], ["Available"])
            .unwrap();
        assert_eq!(spec.timeout(), Duration::from_secs(1800));
        assert_eq!(spec.poll_interval(), Duration::from_secs(10));
        assert_eq!(spec.not_found_tolerance(), 20);
        assert_eq!(spec.continuous_target_occurrence(), 2);
        assert!(!spec.waits_for_absence());
    }
}
