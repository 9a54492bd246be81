//! Harness configuration.
//!
//! Every duration the harness waits on is derived from a single time unit,
//! so the scenarios can run at production scale (one second per unit) or
//! compressed for fast test runs without changing their logic.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{HarnessError, Result};

/// Well-known service port of the booking server.
pub const DEFAULT_PORT: u16 = 8080;

/// One time unit at production scale.
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);

/// Every bounded wait the harness performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Fixed delay after launching the server before it is used.
    pub startup_grace: Duration,
    /// How long a graceful termination may take before a forced kill.
    pub stop_timeout: Duration,
    /// Hard ceiling on a synchronous client run.
    pub client_watchdog: Duration,
    /// How long the mock server waits for the client to connect.
    pub accept_timeout: Duration,
    /// How long the mock server holds the accepted connection silent.
    pub client_stall: Duration,
    /// How long the client may take to exit once the stall is over.
    pub client_reap_timeout: Duration,
    /// How long the mock client stays idle before probing.
    pub server_idle_hold: Duration,
    pub connect_timeout: Duration,
    pub probe_read_timeout: Duration,
    /// Assumed internal request timeout of the client.
    pub expected_client_timeout: Duration,
    /// Assumed idle-eviction threshold of the server.
    pub expected_server_idle: Duration,
}

impl Timings {
    /// Timings scaled to the given time unit.
    pub fn from_unit(unit: Duration) -> Self {
        Self {
            startup_grace: unit * 2,
            stop_timeout: unit * 5,
            client_watchdog: unit * 15,
            accept_timeout: unit * 5,
            client_stall: unit * 7,
            client_reap_timeout: unit * 2,
            server_idle_hold: unit * 12,
            connect_timeout: unit * 5,
            probe_read_timeout: unit * 5,
            expected_client_timeout: unit * 5,
            expected_server_idle: unit * 10,
        }
    }

    /// Reject timings that cannot provoke the behavior under test.
    pub fn validate(&self) -> Result<()> {
        let ceilings = [
            ("startup grace", self.startup_grace),
            ("stop timeout", self.stop_timeout),
            ("client watchdog", self.client_watchdog),
            ("accept timeout", self.accept_timeout),
            ("client reap timeout", self.client_reap_timeout),
            ("connect timeout", self.connect_timeout),
            ("probe read timeout", self.probe_read_timeout),
        ];
        for (name, value) in ceilings {
            if value.is_zero() {
                return Err(HarnessError::Config(format!("{} must be non-zero", name)));
            }
        }

        if self.client_stall <= self.expected_client_timeout {
            return Err(HarnessError::Config(format!(
                "client stall ({:?}) must exceed the client's expected timeout ({:?})",
                self.client_stall, self.expected_client_timeout
            )));
        }
        if self.server_idle_hold <= self.expected_server_idle {
            return Err(HarnessError::Config(format!(
                "idle hold ({:?}) must exceed the server's expected idle threshold ({:?})",
                self.server_idle_hold, self.expected_server_idle
            )));
        }
        if self.expected_client_timeout >= self.client_watchdog {
            return Err(HarnessError::Config(format!(
                "client watchdog ({:?}) must exceed the client's expected timeout ({:?})",
                self.client_watchdog, self.expected_client_timeout
            )));
        }
        Ok(())
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::from_unit(DEFAULT_TIME_UNIT)
    }
}

/// Everything a scenario needs to know about its environment.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub server_bin: PathBuf,
    pub client_bin: PathBuf,
    pub port: u16,
    /// Address the mock server listens on.
    pub bind_host: IpAddr,
    /// Address the mock client connects to.
    pub connect_host: IpAddr,
    /// Append-only sink for server stdout and stderr.
    pub output_log: PathBuf,
    /// Extra environment applied to every spawned server and client.
    pub child_env: Vec<(String, String)>,
    pub timings: Timings,
    pub contest_threads: u32,
    pub stress_threads: u32,
    /// Upper bound on successful bookings in the concurrent contest.
    pub seat_capacity: Option<u32>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            server_bin: PathBuf::from("bin").join("server"),
            client_bin: PathBuf::from("bin").join("client"),
            port: DEFAULT_PORT,
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            connect_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            output_log: PathBuf::from("server_output.log"),
            child_env: Vec::new(),
            timings: Timings::default(),
            contest_threads: 10,
            stress_threads: 100,
            seat_capacity: None,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        self.timings.validate()?;
        if self.port == 0 {
            return Err(HarnessError::Config("port must be non-zero".to_string()));
        }
        if self.contest_threads == 0 || self.stress_threads == 0 {
            return Err(HarnessError::Config(
                "thread counts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Where the mock server listens.
    pub fn mock_listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.port)
    }

    /// Where the mock client connects.
    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.connect_host, self.port)
    }
}

/// Parse a `KEY=VALUE` pair.
pub fn parse_env_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings_match_time_units() {
        let t = Timings::default();
        assert_eq!(t.startup_grace, Duration::from_secs(2));
        assert_eq!(t.stop_timeout, Duration::from_secs(5));
        assert_eq!(t.client_watchdog, Duration::from_secs(15));
        assert_eq!(t.accept_timeout, Duration::from_secs(5));
        assert_eq!(t.client_stall, Duration::from_secs(7));
        assert_eq!(t.client_reap_timeout, Duration::from_secs(2));
        assert_eq!(t.server_idle_hold, Duration::from_secs(12));
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_scaled_timings_keep_ratios() {
        let t = Timings::from_unit(Duration::from_millis(100));
        assert_eq!(t.client_stall, Duration::from_millis(700));
        assert_eq!(t.expected_server_idle, Duration::from_millis(1000));
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_stall_must_exceed_client_timeout() {
        let mut t = Timings::default();
        t.client_stall = t.expected_client_timeout;
        assert!(matches!(t.validate(), Err(HarnessError::Config(_))));
    }

    #[test]
    fn test_idle_hold_must_exceed_server_threshold() {
        let mut t = Timings::default();
        t.server_idle_hold = Duration::from_secs(9);
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let mut t = Timings::default();
        t.accept_timeout = Duration::ZERO;
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("accept timeout"));
    }

    #[test]
    fn test_default_addresses() {
        let config = HarnessConfig::default();
        assert_eq!(config.mock_listen_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.server_addr().to_string(), "127.0.0.1:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(
            parse_env_pair("BOOKING_PORT=9000").unwrap(),
            ("BOOKING_PORT".to_string(), "9000".to_string())
        );
        assert_eq!(
            parse_env_pair("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_env_pair("=value").is_err());
        assert!(parse_env_pair("novalue").is_err());
    }
}
