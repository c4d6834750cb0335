//! SSH session establishment.
//!
//! The TCP dial happens on the tokio runtime under a timeout; the
//! stream is then handed to libssh2 in blocking mode with socket
//! read/write timeouts, matching how the rest of the agent drives
//! ssh2's blocking calls.

use crate::ssh::types::{SshConfig, SshError, SshErrorKind};
use ssh2::{Session, Sftp};
use std::time::Duration;
use tokio::net::TcpStream as AsyncTcpStream;

/// Dial, handshake and authenticate an SSH session.
pub async fn connect_shell(config: &SshConfig) -> Result<Session, SshError> {
    let address = config.address();
    log::info!("[{address}] connecting via SSH");

    let timeout_secs = config.connect_timeout_secs;
    let async_stream = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        AsyncTcpStream::connect(&address),
    )
    .await
    .map_err(|_| {
        SshError::new(
            SshErrorKind::Timeout,
            format!("SSH connect to {address} timed out after {timeout_secs}s"),
        )
    })?
    .map_err(|e| {
        SshError::new(
            SshErrorKind::ConnectionFailed,
            format!("SSH connect to {address} failed: {e}"),
        )
    })?;

    let stream = async_stream.into_std().map_err(|e| {
        SshError::new(SshErrorKind::ConnectionFailed, format!("stream conversion failed: {e}"))
    })?;
    stream.set_nonblocking(false).map_err(|e| {
        SshError::new(SshErrorKind::ConnectionFailed, format!("failed to set blocking mode: {e}"))
    })?;
    // Reads get extra headroom: a device busy writing a backup can be
    // slow to answer.
    stream
        .set_read_timeout(Some(Duration::from_secs(timeout_secs * 2)))
        .ok();
    stream
        .set_write_timeout(Some(Duration::from_secs(timeout_secs)))
        .ok();

    let mut session = Session::new().map_err(|e| {
        SshError::new(SshErrorKind::ConnectionFailed, format!("failed to create session: {e}"))
    })?;
    session.set_tcp_stream(stream);
    session.handshake().map_err(|e| {
        SshError::new(SshErrorKind::ConnectionFailed, format!("SSH handshake failed: {e}"))
    })?;

    session
        .userauth_password(&config.username, &config.password)
        .map_err(|e| {
            SshError::new(
                SshErrorKind::AuthenticationFailed,
                format!("SSH auth for \"{}\" failed: {e}", config.username),
            )
        })?;
    if !session.authenticated() {
        return Err(SshError::new(
            SshErrorKind::AuthenticationFailed,
            format!("SSH auth for \"{}\" was not accepted", config.username),
        ));
    }

    log::info!("[{address}] SSH session established");
    Ok(session)
}

/// Open an SFTP channel on an authenticated session.
pub fn open_sftp(session: &Session) -> Result<Sftp, SshError> {
    session.sftp().map_err(|e| {
        SshError::new(SshErrorKind::Channel, format!("failed to open SFTP channel: {e}"))
    })
}
