//! Types for the configuration crate.
//!
//! The serde structs mirror the JSON files one to one. Schedule fields
//! that go straight onto the wire (`disabled`, `interval`, ...) stay
//! strings in RouterOS syntax rather than being re-modelled.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigErrorKind {
    Io,
    Parse,
    NotFound,
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::NotFound, message)
    }
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::Invalid, message)
    }
}

// ── Params ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub note: String,
}

/// The main params file: a flat list of named values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(pub Vec<Param>);

impl Params {
    pub fn get(&self, name: &str) -> Result<&Param, ConfigError> {
        self.0
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::not_found(format!("param \"{name}\" does not exist")))
    }

    pub fn value(&self, name: &str) -> Result<&str, ConfigError> {
        Ok(self.get(name)?.value.as_str())
    }
}

/// Expand the `{host.name}` / `{host.ip}` placeholders of a backup
/// directory template for one device. The template is never mutated;
/// every device gets a fresh expansion.
pub fn resolve_backup_dir(template: &str, device: &Device) -> String {
    template
        .replace("{host.name}", &device.name)
        .replace("{host.ip}", &device.ip)
}

// ── Declared records ────────────────────────────────────────────────

/// One entry of `hosts.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub ip: String,
    pub login: String,
    #[serde(default)]
    pub pass: String,
    pub port_api: u16,
    pub port_ssh: u16,
    #[serde(default)]
    pub backup_folder: String,
    pub task_name: String,
    #[serde(default)]
    pub users_aliases: Vec<String>,
    #[serde(default)]
    pub schedules_aliases: Vec<String>,
    /// Logins tolerated on the device beyond the declared ones.
    #[serde(default)]
    pub users_allowed: Vec<String>,
}

/// Cadence settings shared by the devices that name this task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    /// Unix-seconds anchor the cycle grid is aligned to.
    pub start: i64,
    /// Seconds between cycle starts. Strictly positive.
    pub delay: i64,
    /// Back-off in seconds after a failed cycle.
    pub expired: i64,
    /// A device is considered stale once this many seconds pass
    /// without a successful cycle.
    #[serde(default)]
    pub alert: i64,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub alias: String,
    /// Public key file name under `dir_ssh-pub-keys`, empty for none.
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub skin: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub policy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub name: String,
    #[serde(default)]
    pub disabled: String,
    #[serde(default, rename = "start-date")]
    pub start_date: String,
    #[serde(default, rename = "start-time")]
    pub start_time: String,
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub policy: String,
    #[serde(default)]
    pub comment: String,
    /// Script file name under `dir_scripts`.
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub alias: String,
    /// Script body pushed to the device, resolved from `script` at
    /// load time. Empty when the file is missing.
    #[serde(skip)]
    pub on_event: String,
}

// ── Resolved state ──────────────────────────────────────────────────

/// A device together with the declared state resolved for it: its
/// task, the users and schedules fanned out via aliases, and the
/// group set (groups apply to every device).
#[derive(Debug, Clone)]
pub struct ManagedDevice {
    pub device: Device,
    pub task: Arc<Task>,
    pub users: Vec<User>,
    pub schedules: Vec<Schedule>,
    pub groups: Arc<Vec<Group>>,
}

impl ManagedDevice {
    /// Logins that must survive user clean-up: the device's own admin
    /// login, the extra allowed logins, and every declared user.
    pub fn allowed_logins(&self) -> HashSet<String> {
        let mut allowed = HashSet::new();
        allowed.insert(self.device.login.clone());
        allowed.extend(self.device.users_allowed.iter().cloned());
        allowed.extend(self.users.iter().map(|u| u.login.clone()));
        allowed
    }
}

/// Everything the agent knows, loaded once at start-up and shared
/// read-only between device loops.
#[derive(Debug, Clone)]
pub struct Config {
    pub params: Params,
    pub devices: Vec<Arc<ManagedDevice>>,
}
