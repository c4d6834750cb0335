//! Per-device session handles.
//!
//! Each device loop owns exactly one `DeviceConnections`; nothing else
//! ever touches it, so the lazily filled `Option` slots need no
//! locking. Sessions are dialed on first use and stay cached until
//! [`DeviceConnections::disconnect`]. A session that errors mid-use is
//! not re-dialed here; the cycle fails, the handles are torn down, and
//! the next cycle starts fresh.

use crate::error::AgentError;
use rosman_api::{ApiClient, ApiConfig};
use rosman_config::Device;
use rosman_ssh::{connect_shell, open_sftp, SshConfig};
use ssh2::{Session, Sftp};

pub struct DeviceConnections {
    ip: String,
    api_config: ApiConfig,
    ssh_config: SshConfig,
    api: Option<ApiClient>,
    shell: Option<Session>,
    sftp: Option<Sftp>,
}

impl DeviceConnections {
    pub fn new(device: &Device) -> Self {
        Self {
            ip: device.ip.clone(),
            api_config: ApiConfig::new(&device.ip, device.port_api, &device.login)
                .password(&device.pass),
            ssh_config: SshConfig::new(&device.ip, device.port_ssh, &device.login)
                .password(&device.pass),
            api: None,
            shell: None,
            sftp: None,
        }
    }

    /// Control-plane session, dialed and logged in on first use.
    pub async fn api(&mut self) -> Result<&mut ApiClient, AgentError> {
        if self.api.is_none() {
            self.api = Some(ApiClient::connect(&self.api_config).await?);
        }
        match self.api.as_mut() {
            Some(api) => Ok(api),
            None => Err(AgentError::connection("API session slot is empty")),
        }
    }

    /// Secure-shell session, dialed on first use. Password auth, no
    /// host-key verification.
    pub async fn shell(&mut self) -> Result<&Session, AgentError> {
        if self.shell.is_none() {
            self.shell = Some(connect_shell(&self.ssh_config).await?);
        }
        match self.shell.as_ref() {
            Some(shell) => Ok(shell),
            None => Err(AgentError::connection("SSH session slot is empty")),
        }
    }

    /// File-transfer session, layered on the shell session. The shell
    /// is dialed first if needed.
    pub async fn sftp(&mut self) -> Result<&Sftp, AgentError> {
        if self.sftp.is_none() {
            if self.shell.is_none() {
                self.shell = Some(connect_shell(&self.ssh_config).await?);
            }
            let shell = match self.shell.as_ref() {
                Some(shell) => shell,
                None => return Err(AgentError::connection("SSH session slot is empty")),
            };
            let sftp = open_sftp(shell)?;
            log::info!("[{}] SFTP channel opened", self.ip);
            self.sftp = Some(sftp);
        }
        match self.sftp.as_ref() {
            Some(sftp) => Ok(sftp),
            None => Err(AgentError::connection("SFTP session slot is empty")),
        }
    }

    /// Both the control-plane and the file-transfer session live at
    /// once, as the backup/export operations in [`crate::transfer`]
    /// need them.
    pub async fn api_and_sftp(&mut self) -> Result<(&mut ApiClient, &Sftp), AgentError> {
        if self.api.is_none() {
            self.api = Some(ApiClient::connect(&self.api_config).await?);
        }
        self.sftp().await?;
        match (self.api.as_mut(), self.sftp.as_ref()) {
            (Some(api), Some(sftp)) => Ok((api, sftp)),
            _ => Err(AgentError::connection("session slots are empty")),
        }
    }

    /// Close whatever is open: control-plane first, then the file
    /// transfer channel, then the shell. Close errors are logged and
    /// dropped; all three slots are empty afterwards either way.
    pub async fn disconnect(&mut self) {
        if let Some(api) = self.api.take() {
            log::info!("[{}] disconnecting API", self.ip);
            if let Err(e) = api.close().await {
                log::warn!("[{}] API close failed: {e}", self.ip);
            }
        }
        if let Some(mut sftp) = self.sftp.take() {
            log::info!("[{}] closing SFTP channel", self.ip);
            if let Err(e) = sftp.shutdown() {
                log::warn!("[{}] SFTP shutdown failed: {e}", self.ip);
            }
        }
        if let Some(shell) = self.shell.take() {
            log::info!("[{}] disconnecting SSH", self.ip);
            if let Err(e) = shell.disconnect(None, "cycle finished", None) {
                log::warn!("[{}] SSH disconnect failed: {e}", self.ip);
            }
        }
    }
}
