//! Remote filesystem helpers on top of an SFTP channel.

use crate::ssh::types::SshError;
use ssh2::Sftp;
use std::path::Path;

/// All prefixes of a slash-separated remote path, shortest first.
/// Empty and `.` components are skipped.
pub fn ancestor_paths(path: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut current = String::new();
    for component in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
        if !current.is_empty() {
            current.push('/');
        } else if path.starts_with('/') {
            current.push('/');
        }
        current.push_str(component);
        paths.push(current.clone());
    }
    paths
}

/// `mkdir -p` over SFTP: create every missing component of `path`.
/// Components that already exist are left alone, files included; the
/// subsequent mkdir of a child will fail with a clear message.
pub fn mkdir_all(sftp: &Sftp, path: &str) -> Result<(), SshError> {
    for dir in ancestor_paths(path) {
        let remote = Path::new(&dir);
        if sftp.stat(remote).is_ok() {
            continue;
        }
        log::debug!("SFTP mkdir \"{dir}\"");
        sftp.mkdir(remote, 0o755)
            .map_err(|e| SshError::sftp(format!("mkdir \"{dir}\" failed: {e}")))?;
    }
    Ok(())
}
