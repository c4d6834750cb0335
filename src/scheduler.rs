//! Per-device cycle loop.
//!
//! One [`DeviceRunner`] per device, spawned at start-up and looping
//! until cancelled. A successful cycle lands the next run on the
//! task's anchor grid, so cycles sit on the same absolute boundaries
//! across restarts; a failed cycle instead retries after the task's
//! fixed back-off, without re-aligning.

use crate::connection::DeviceConnections;
use crate::error::AgentError;
use crate::{keys, reconcile, transfer};
use rosman_config::{resolve_backup_dir, Config, ManagedDevice, Task};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Smallest instant on the `start + k*delay` grid strictly after the
/// grid slot containing `now`: `floor((now-start)/delay + 1)*delay +
/// start`.
pub fn next_aligned_instant(now: i64, start: i64, delay: i64) -> i64 {
    ((now - start).div_euclid(delay) + 1) * delay + start
}

/// Where the next cycle lands. A success returns to the task's anchor
/// grid; a failure retries after the task's fixed back-off, off the
/// grid, so a flapping device does not wait out a whole period.
pub fn next_cycle_instant(succeeded: bool, now: i64, task: &Task) -> i64 {
    if succeeded {
        next_aligned_instant(now, task.start, task.delay)
    } else {
        now + task.expired
    }
}

/// Seconds since the last successful cycle, once past the task's alert
/// threshold. `None` while the device is fresh, never succeeded, or
/// alerting is off (`alert == 0`).
pub fn staleness(last_success: Option<i64>, now: i64, alert: i64) -> Option<i64> {
    let seen = last_success?;
    if alert > 0 && now - seen > alert {
        Some(now - seen)
    } else {
        None
    }
}

pub struct DeviceRunner {
    device: Arc<ManagedDevice>,
    backup_dir: PathBuf,
    keys_dir: PathBuf,
    cancel: CancellationToken,
    /// Unix-seconds of the last successful cycle, for the staleness
    /// warning against the task's alert threshold.
    last_success: Option<i64>,
}

impl DeviceRunner {
    /// Resolve the per-device directories up front; a missing required
    /// param is a start-up error, not something to trip over mid-cycle.
    pub fn new(
        config: &Config,
        device: Arc<ManagedDevice>,
        cancel: CancellationToken,
    ) -> Result<Self, AgentError> {
        let template = config.params.value("dir_backup")?;
        let backup_dir = PathBuf::from(resolve_backup_dir(template, &device.device));
        let keys_dir = PathBuf::from(config.params.value("dir_ssh-pub-keys")?);
        Ok(Self { device, backup_dir, keys_dir, cancel, last_success: None })
    }

    /// Loop until cancelled. The cancellation token is observed at the
    /// top of every cycle and through the inter-cycle sleep.
    pub async fn run(mut self) {
        let ip = self.device.device.ip.clone();
        let task = Arc::clone(&self.device.task);
        log::info!(
            "[{ip}] device loop started (task \"{}\", every {}s)",
            task.name,
            task.delay
        );
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let outcome = self.run_cycle().await;
            let now = chrono::Utc::now().timestamp();
            match &outcome {
                Ok(()) => self.last_success = Some(now),
                Err(e) => {
                    log::error!("[{ip}] cycle failed: {e}");
                    if let Some(stale) = staleness(self.last_success, now, task.alert) {
                        log::warn!(
                            "[{ip}] no successful cycle for {stale}s (alert threshold {}s)",
                            task.alert
                        );
                    }
                }
            }
            let next = next_cycle_instant(outcome.is_ok(), now, &task);
            let wait = (next - now).max(0) as u64;
            log::info!("[{ip}] next cycle in {wait}s");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(wait)) => {}
            }
        }
        log::info!("[{ip}] device loop stopped");
    }

    /// One full reconcile-and-retrieve cycle. Sessions are torn down
    /// at the end whatever the outcome: a cached handle that just
    /// failed is worth less than a fresh dial next cycle.
    pub async fn run_cycle(&mut self) -> Result<(), AgentError> {
        let mut conn = DeviceConnections::new(&self.device.device);
        let result = self.cycle_steps(&mut conn).await;
        conn.disconnect().await;
        result
    }

    /// The fixed step order: clean users, groups, schedules; add
    /// groups, users (and their keys); make the backup folder; add
    /// schedules; retrieve the backup folder with move semantics. The
    /// first failing step aborts the rest; partial convergence is
    /// corrected on the next cycle.
    async fn cycle_steps(&mut self, conn: &mut DeviceConnections) -> Result<(), AgentError> {
        let md = Arc::clone(&self.device);
        let ip = &md.device.ip;

        log::info!("[{ip}] sequence for cleaning users");
        reconcile::clean_users(conn.api().await?, &md).await?;
        log::info!("[{ip}] sequence for cleaning groups");
        reconcile::clean_groups(conn.api().await?, &md).await?;
        log::info!("[{ip}] sequence for cleaning schedules");
        reconcile::clean_schedules(conn.api().await?, &md).await?;

        log::info!("[{ip}] sequence for adding groups");
        reconcile::add_groups(conn.api().await?, &md).await?;
        log::info!("[{ip}] sequence for adding users");
        let pending_keys = reconcile::add_users(conn.api().await?, &md).await?;
        for user in &pending_keys {
            keys::provision_user_key(conn, user, &self.keys_dir, &self.cancel).await?;
        }

        log::info!("[{ip}] sequence for adding backup folder");
        if !md.device.backup_folder.is_empty() {
            rosman_ssh::mkdir_all(conn.sftp().await?, &md.device.backup_folder)?;
        }

        log::info!("[{ip}] sequence for adding schedules");
        reconcile::add_schedules(conn.api().await?, &md).await?;

        log::info!("[{ip}] sequence for backup directory");
        let sftp = conn.sftp().await?;
        transfer::download_folder(sftp, &md.device.backup_folder, &self.backup_dir, true)?;
        Ok(())
    }
}
