//! Error type for the agent core.
//!
//! The protocol crates keep their own error types; everything that
//! reaches a device loop is folded into [`AgentError`] so a cycle has
//! a single failure currency to log and back off on.

use rosman_api::{ApiError, ApiErrorKind};
use rosman_config::{ConfigError, ConfigErrorKind};
use rosman_ssh::{SshError, SshErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentErrorKind {
    /// Transport dial or authentication failure.
    Connection,
    /// The device rejected a control-plane command.
    Command,
    /// A file-transfer operation failed.
    Transfer,
    /// A bounded retry budget was used up.
    RetryExhausted,
    /// Shutdown arrived while the cycle was waiting.
    Interrupted,
    /// A named lookup (param, task) came up empty.
    NotFound,
    /// The declared state could not be loaded. Fatal at start-up.
    ConfigLoad,
    Io,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentError {
    pub kind: AgentErrorKind,
    pub message: String,
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for AgentError {}

impl AgentError {
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Connection, message)
    }
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Transfer, message)
    }
    pub fn retry_exhausted(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::RetryExhausted, message)
    }
    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Interrupted, message)
    }
}

impl From<ApiError> for AgentError {
    fn from(e: ApiError) -> Self {
        let kind = match e.kind {
            // A trap is a rejected command; a fatal reply also arrives
            // as the answer to one.
            ApiErrorKind::Trap | ApiErrorKind::Fatal => AgentErrorKind::Command,
            _ => AgentErrorKind::Connection,
        };
        Self::new(kind, e.message)
    }
}

impl From<SshError> for AgentError {
    fn from(e: SshError) -> Self {
        let kind = match e.kind {
            SshErrorKind::Sftp => AgentErrorKind::Transfer,
            _ => AgentErrorKind::Connection,
        };
        Self::new(kind, e.message)
    }
}

impl From<ConfigError> for AgentError {
    fn from(e: ConfigError) -> Self {
        let kind = match e.kind {
            ConfigErrorKind::NotFound => AgentErrorKind::NotFound,
            _ => AgentErrorKind::ConfigLoad,
        };
        Self::new(kind, e.message)
    }
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        Self::new(AgentErrorKind::Io, e.to_string())
    }
}
