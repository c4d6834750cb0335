//! Types for the SSH transport crate.

use serde::{Deserialize, Serialize};
use std::fmt;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SshErrorKind {
    ConnectionFailed,
    AuthenticationFailed,
    Timeout,
    /// Opening a channel (SFTP subsystem) on an established session.
    Channel,
    /// A remote filesystem operation.
    Sftp,
    Io,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshError {
    pub kind: SshErrorKind,
    pub message: String,
}

impl fmt::Display for SshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for SshError {}

impl SshError {
    pub fn new(kind: SshErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
    pub fn sftp(message: impl Into<String>) -> Self {
        Self::new(SshErrorKind::Sftp, message)
    }
}

impl From<std::io::Error> for SshError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => Self::new(SshErrorKind::Timeout, e.to_string()),
            _ => Self::new(SshErrorKind::Io, e.to_string()),
        }
    }
}

// ── Connection config ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl SshConfig {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: String::new(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_connect_timeout_secs() -> u64 {
    15
}
