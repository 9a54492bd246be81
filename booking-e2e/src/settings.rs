//! Environment knobs of the fixture binaries.

use std::str::FromStr;
use std::time::Duration;

pub const PORT_VAR: &str = "BOOKING_PORT";
pub const TICKETS_VAR: &str = "BOOKING_TICKETS";
pub const IDLE_TIMEOUT_VAR: &str = "BOOKING_IDLE_TIMEOUT_MS";
pub const FAIL_STARTUP_VAR: &str = "BOOKING_FAIL_STARTUP";
pub const IGNORE_SIGTERM_VAR: &str = "BOOKING_IGNORE_SIGTERM";
pub const REQUEST_TIMEOUT_VAR: &str = "BOOKING_REQUEST_TIMEOUT_MS";
pub const EXIT_DELAY_VAR: &str = "BOOKING_EXIT_DELAY_MS";
pub const IGNORE_ERRORS_VAR: &str = "BOOKING_IGNORE_ERRORS";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TICKETS: u32 = 100;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("{var}={value:?} is not a valid {expected}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub port: u16,
    pub tickets: u32,
    /// `None` never evicts.
    pub idle_timeout: Option<Duration>,
    pub fail_startup: bool,
    pub ignore_sigterm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub port: u16,
    /// `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Linger this long before exiting.
    pub exit_delay: Option<Duration>,
    /// Exit 0 even when requests failed.
    pub ignore_errors: bool,
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        Ok(Self {
            port: parsed(&lookup, PORT_VAR, DEFAULT_PORT, "port")?,
            tickets: parsed(&lookup, TICKETS_VAR, DEFAULT_TICKETS, "ticket count")?,
            idle_timeout: millis(&lookup, IDLE_TIMEOUT_VAR, DEFAULT_IDLE_TIMEOUT_MS)?,
            fail_startup: flag(&lookup, FAIL_STARTUP_VAR),
            ignore_sigterm: flag(&lookup, IGNORE_SIGTERM_VAR),
        })
    }
}

impl ClientSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        Ok(Self {
            port: parsed(&lookup, PORT_VAR, DEFAULT_PORT, "port")?,
            request_timeout: millis(&lookup, REQUEST_TIMEOUT_VAR, DEFAULT_REQUEST_TIMEOUT_MS)?,
            exit_delay: millis(&lookup, EXIT_DELAY_VAR, 0)?,
            ignore_errors: flag(&lookup, IGNORE_ERRORS_VAR),
        })
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, SettingsError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| SettingsError::Invalid {
            var,
            value,
            expected,
        }),
    }
}

/// Milliseconds, with 0 meaning "disabled".
fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default_ms: u64,
) -> Result<Option<Duration>, SettingsError> {
    let ms = parsed(lookup, var, default_ms, "duration in milliseconds")?;
    Ok((ms > 0).then(|| Duration::from_millis(ms)))
}

/// Set to anything but empty or `0`.
fn flag(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> bool {
    lookup(var).is_some_and(|v| !v.is_empty() && v != "0")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_server_defaults() {
        let settings = ServerSettings::from_lookup(env(&[])).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.tickets, 100);
        assert_eq!(settings.idle_timeout, Some(Duration::from_secs(10)));
        assert!(!settings.fail_startup);
        assert!(!settings.ignore_sigterm);
    }

    #[test]
    fn test_zero_disables_timeouts() {
        let server =
            ServerSettings::from_lookup(env(&[(IDLE_TIMEOUT_VAR, "0"), (IGNORE_SIGTERM_VAR, "1")]))
                .unwrap();
        assert_eq!(server.idle_timeout, None);
        assert!(server.ignore_sigterm);

        let client = ClientSettings::from_lookup(env(&[(REQUEST_TIMEOUT_VAR, "0")])).unwrap();
        assert_eq!(client.request_timeout, None);
        assert_eq!(client.exit_delay, None);
    }

    #[test]
    fn test_flag_zero_is_off() {
        let client = ClientSettings::from_lookup(env(&[(IGNORE_ERRORS_VAR, "0")])).unwrap();
        assert!(!client.ignore_errors);
    }

    #[test]
    fn test_invalid_value() {
        let err = ServerSettings::from_lookup(env(&[(PORT_VAR, "eighty")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "BOOKING_PORT=\"eighty\" is not a valid port"
        );
    }
}
