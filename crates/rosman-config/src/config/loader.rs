//! Loading and resolving the declared state.
//!
//! `main.json` holds the params; `dir_mikrotik-config` points at the
//! per-kind files. After parsing, schedule scripts are inlined and
//! every device gets its users/schedules fanned out by alias, the
//! whole group set, and its task.

use crate::config::types::{
    Config, ConfigError, ConfigErrorKind, Device, Group, ManagedDevice, Params, Schedule, Task,
    User,
};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_CONFIG_PATH: &str = "configs/main.json";

impl Config {
    /// Load and resolve everything. Any missing file, parse error,
    /// unknown task or non-positive task delay is fatal: a partially
    /// declared fleet must not start reconciling.
    pub fn load(main_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let params: Params = load_json(main_path.as_ref())?;
        let dir = PathBuf::from(params.value("dir_mikrotik-config")?);

        let devices: Vec<Device> = load_json(&dir.join("hosts.json"))?;
        let tasks: Vec<Task> = load_json(&dir.join("tasks.json"))?;
        let users: Vec<User> = load_json(&dir.join("users.json"))?;
        let groups: Vec<Group> = load_json(&dir.join("groups.json"))?;
        let mut schedules: Vec<Schedule> = load_json(&dir.join("schedules.json"))?;

        let scripts_dir = PathBuf::from(params.value("dir_scripts")?);
        load_on_event_scripts(&mut schedules, &scripts_dir);

        let tasks: Vec<Arc<Task>> = tasks.into_iter().map(Arc::new).collect();
        let groups = Arc::new(groups);

        let mut managed = Vec::with_capacity(devices.len());
        for device in devices {
            let task = tasks
                .iter()
                .find(|t| t.name == device.task_name)
                .cloned()
                .ok_or_else(|| {
                    ConfigError::not_found(format!(
                        "task \"{}\" (device \"{}\") does not exist",
                        device.task_name, device.name
                    ))
                })?;
            if task.delay <= 0 {
                return Err(ConfigError::invalid(format!(
                    "task \"{}\" has non-positive delay {}",
                    task.name, task.delay
                )));
            }
            managed.push(Arc::new(ManagedDevice {
                users: filter_users(&users, &device.users_aliases),
                schedules: filter_schedules(&schedules, &device.schedules_aliases),
                groups: Arc::clone(&groups),
                task,
                device,
            }));
        }

        Ok(Config { params, devices: managed })
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|e| {
        ConfigError::new(ConfigErrorKind::Io, format!("read \"{}\": {e}", path.display()))
    })?;
    let value = serde_json::from_str(&raw).map_err(|e| {
        ConfigError::new(ConfigErrorKind::Parse, format!("parse \"{}\": {e}", path.display()))
    })?;
    log::info!("[init] config \"{}\" loaded", path.display());
    Ok(value)
}

/// Inline each schedule's script body. A missing script file is a
/// warning, not an error: the schedule is still pushed, with an empty
/// on-event.
fn load_on_event_scripts(schedules: &mut [Schedule], dir: &Path) {
    for schedule in schedules {
        let path = dir.join(&schedule.script);
        match fs::read_to_string(&path) {
            Ok(content) => schedule.on_event = content,
            Err(_) => {
                log::warn!("script \"{}\" does not exist", schedule.script);
                schedule.on_event = String::new();
            }
        }
    }
}

fn filter_users(users: &[User], aliases: &[String]) -> Vec<User> {
    users.iter().filter(|u| aliases.contains(&u.alias)).cloned().collect()
}

fn filter_schedules(schedules: &[Schedule], aliases: &[String]) -> Vec<Schedule> {
    schedules.iter().filter(|s| aliases.contains(&s.alias)).cloned().collect()
}
