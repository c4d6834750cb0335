//! Public-key provisioning: upload, then bounded-retry import.
//!
//! Right after a key file lands on the device its control plane can
//! take a moment before the import command sees it, so the import is
//! retried on a fixed delay rather than failed outright. The delay is
//! constant across attempts.

use crate::connection::DeviceConnections;
use crate::error::AgentError;
use rosman_api::{ApiClient, Command};
use rosman_config::User;
use ssh2::Sftp;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

/// Fixed wait before each import attempt.
pub const KEY_IMPORT_DELAY: Duration = Duration::from_millis(5000);
/// Import attempts before giving up on a key.
pub const KEY_IMPORT_ATTEMPTS: u32 = 10;

/// Upload a newly created user's declared key and import it into the
/// account, with the default retry budget.
pub async fn provision_user_key(
    conn: &mut DeviceConnections,
    user: &User,
    keys_dir: &Path,
    cancel: &CancellationToken,
) -> Result<(), AgentError> {
    let sftp = conn.sftp().await?;
    upload_key(sftp, keys_dir, &user.key)?;
    let api = conn.api().await?;
    import_ssh_key(api, &user.login, &user.key, KEY_IMPORT_ATTEMPTS, KEY_IMPORT_DELAY, cancel)
        .await
}

/// Copy `keys_dir/<key>` to the device root, where the import command
/// expects to find it.
pub fn upload_key(sftp: &Sftp, keys_dir: &Path, key: &str) -> Result<(), AgentError> {
    log::info!("uploading key \"{key}\"");
    let local_path = keys_dir.join(key);
    let mut src = fs::File::open(&local_path).map_err(|e| {
        AgentError::transfer(format!("open \"{}\" failed: {e}", local_path.display()))
    })?;
    let mut dst = sftp
        .create(Path::new(key))
        .map_err(|e| AgentError::transfer(format!("create remote \"{key}\" failed: {e}")))?;
    std::io::copy(&mut src, &mut dst)
        .map_err(|e| AgentError::transfer(format!("upload \"{key}\" failed: {e}")))?;
    dst.close()
        .map_err(|e| AgentError::transfer(format!("close remote \"{key}\" failed: {e}")))?;
    Ok(())
}

/// Import an uploaded key into `login`'s account: up to `attempts`
/// tries, each preceded by the fixed `delay`; the first success wins
/// and failed attempts are only logged. Shutdown cuts the inter-attempt
/// wait short and ends the cycle instead of draining the retry budget.
pub async fn import_ssh_key<S>(
    api: &mut ApiClient<S>,
    login: &str,
    key: &str,
    attempts: u32,
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<(), AgentError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    log::info!("importing key \"{key}\" for user \"{login}\"");
    for attempt in 1..=attempts {
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(AgentError::interrupted(format!(
                    "key import for \"{login}\" stopped by shutdown"
                )));
            }
            _ = tokio::time::sleep(delay) => {}
        }
        let imported = api
            .run(
                Command::new("/user/ssh-keys/import")
                    .attribute("public-key-file", key)
                    .attribute("user", login),
            )
            .await;
        match imported {
            Ok(_) => {
                log::info!("key \"{key}\" imported for user \"{login}\"");
                return Ok(());
            }
            Err(e) => {
                log::warn!("key import for \"{login}\" attempt {attempt}/{attempts} failed: {e}");
            }
        }
    }
    Err(AgentError::retry_exhausted(format!(
        "key import for \"{login}\" failed after {attempts} attempts"
    )))
}
