//! Types for the RouterOS API crate.

use serde::{Deserialize, Serialize};
use std::fmt;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiErrorKind {
    ConnectionFailed,
    AuthenticationFailed,
    /// The router rejected a command (`!trap` reply).
    Trap,
    /// The router declared the connection dead (`!fatal` reply).
    Fatal,
    /// Malformed data on the wire.
    Protocol,
    NotConnected,
    Timeout,
    Io,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
    pub fn trap(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Trap, message)
    }
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Protocol, message)
    }
    pub fn not_connected() -> Self {
        Self::new(ApiErrorKind::NotConnected, "No usable API connection")
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::ConnectionRefused => {
                Self::new(ApiErrorKind::ConnectionFailed, e.to_string())
            }
            std::io::ErrorKind::TimedOut => Self::new(ApiErrorKind::Timeout, e.to_string()),
            _ => Self::new(ApiErrorKind::Io, e.to_string()),
        }
    }
}

// ── Connection config ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Applied to the TCP dial and to every command exchange.
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// `host:port` form used for dialing and log prefixes.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_timeout_secs() -> u64 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_kind_and_message() {
        let e = ApiError::trap("no such item");
        assert_eq!(e.to_string(), "[Trap] no such item");
    }

    #[test]
    fn io_error_mapping() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(ApiError::from(refused).kind, ApiErrorKind::ConnectionFailed);

        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(ApiError::from(timed_out).kind, ApiErrorKind::Timeout);

        let other = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert_eq!(ApiError::from(other).kind, ApiErrorKind::Io);
    }

    #[test]
    fn config_address_builds_host_port() {
        let cfg = ApiConfig::new("192.0.2.1", 8728, "admin").password("secret");
        assert_eq!(cfg.address(), "192.0.2.1:8728");
        assert_eq!(cfg.timeout_secs, 15);
        assert_eq!(cfg.password, "secret");
    }
}
