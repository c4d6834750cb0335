//! Recursive backup retrieval and on-device artifact creation.
//!
//! Copy-then-delete: a remote file is only removed after its bytes
//! are on local disk and synced, so a failed delete can never cost
//! data. Remote paths are always forward-slash-separated, whatever
//! shape they arrive in from config files.

use crate::error::AgentError;
use rosman_api::{ApiClient, Command};
use std::fs;
use std::io::Read;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};

/// Suffix RouterOS appends to a `/system/backup/save` artifact.
pub const BACKUP_SUFFIX: &str = ".backup";
/// Suffix RouterOS appends to an `/export =file=` artifact.
pub const EXPORT_SUFFIX: &str = ".rsc";

// ── Remote filesystem seam ──────────────────────────────────────────

/// One directory entry on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
}

/// The slice of SFTP the transfer code needs. Production wraps
/// `ssh2::Sftp`; tests use an in-memory tree.
pub trait RemoteFs {
    fn read_dir(&self, dir: &str) -> Result<Vec<RemoteEntry>, AgentError>;
    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, AgentError>;
    fn remove(&self, path: &str) -> Result<(), AgentError>;
    fn mkdir_all(&self, dir: &str) -> Result<(), AgentError>;
}

impl RemoteFs for ssh2::Sftp {
    fn read_dir(&self, dir: &str) -> Result<Vec<RemoteEntry>, AgentError> {
        let entries = self
            .readdir(Path::new(dir))
            .map_err(|e| AgentError::transfer(format!("readdir \"{dir}\" failed: {e}")))?;
        Ok(entries
            .into_iter()
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().to_string();
                if name == "." || name == ".." {
                    return None;
                }
                Some(RemoteEntry { name, is_dir: stat.is_dir() })
            })
            .collect())
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, AgentError> {
        let file = ssh2::Sftp::open(self, Path::new(path))
            .map_err(|e| AgentError::transfer(format!("open \"{path}\" failed: {e}")))?;
        Ok(Box::new(file))
    }

    fn remove(&self, path: &str) -> Result<(), AgentError> {
        self.unlink(Path::new(path))
            .map_err(|e| AgentError::transfer(format!("remove \"{path}\" failed: {e}")))
    }

    fn mkdir_all(&self, dir: &str) -> Result<(), AgentError> {
        rosman_ssh::mkdir_all(self, dir).map_err(AgentError::from)
    }
}

// ── Path handling ───────────────────────────────────────────────────

/// Join remote path components with a single forward slash, whatever
/// the caller's trailing-slash habits.
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    if dir == "/" {
        return format!("/{name}");
    }
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Split a remote path into (directory, file name), normalizing any
/// backslashes first. A bare file name gets an empty directory.
pub fn split_remote(path: &str) -> (String, String) {
    let normalized = path.replace('\\', "/");
    match normalized.rsplit_once('/') {
        Some(("", file)) => ("/".to_string(), file.to_string()),
        Some((dir, file)) => (dir.to_string(), file.to_string()),
        None => (String::new(), normalized),
    }
}

// ── Recursive download ──────────────────────────────────────────────

/// Mirror `remote_dir` into `local_dir`, recursing into
/// sub-directories. With `delete_after_copy` every mirrored file is
/// removed from the device once its local copy is synced; directories
/// are left in place.
pub fn download_folder(
    fs: &dyn RemoteFs,
    remote_dir: &str,
    local_dir: &Path,
    delete_after_copy: bool,
) -> Result<(), AgentError> {
    for entry in fs.read_dir(remote_dir)? {
        let remote = join_remote(remote_dir, &entry.name);
        if entry.is_dir {
            download_folder(fs, &remote, &local_dir.join(&entry.name), delete_after_copy)?;
        } else {
            download_file(fs, &remote, local_dir, delete_after_copy)?;
        }
    }
    Ok(())
}

/// Download one remote file into `local_dir` (created if missing).
/// The remote file is removed only after the local copy has been
/// synced to disk, and only when `delete_after_copy` is set.
pub fn download_file(
    fs: &dyn RemoteFs,
    remote_path: &str,
    local_dir: &Path,
    delete_after_copy: bool,
) -> Result<(), AgentError> {
    let (dir, file_name) = split_remote(remote_path);
    let remote_path = join_remote(&dir, &file_name);

    fs::create_dir_all(local_dir).map_err(|e| {
        AgentError::transfer(format!("create \"{}\" failed: {e}", local_dir.display()))
    })?;
    let local_path = local_dir.join(&file_name);

    let mut remote = fs.open(&remote_path)?;
    let mut local = fs::File::create(&local_path).map_err(|e| {
        AgentError::transfer(format!("create \"{}\" failed: {e}", local_path.display()))
    })?;
    std::io::copy(&mut remote, &mut local)
        .map_err(|e| AgentError::transfer(format!("copy \"{remote_path}\" failed: {e}")))?;
    local
        .sync_all()
        .map_err(|e| AgentError::transfer(format!("sync \"{}\" failed: {e}", local_path.display())))?;
    drop(remote);

    log::debug!("downloaded \"{remote_path}\" -> \"{}\"", local_path.display());
    if delete_after_copy {
        // The local copy already exists; a failure here is reported
        // without losing data.
        fs.remove(&remote_path)?;
    }
    Ok(())
}

// ── On-device artifacts ─────────────────────────────────────────────

/// Have the device write a binary backup image at `path`, creating
/// the containing remote directory first. Returns the artifact path
/// with its fixed suffix.
pub async fn make_backup<S>(
    api: &mut ApiClient<S>,
    fs: &dyn RemoteFs,
    path: &str,
) -> Result<String, AgentError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (dir, file) = split_remote(path);
    let path = join_remote(&dir, &file);
    if !dir.is_empty() && dir != "." {
        fs.mkdir_all(&dir)?;
    }
    api.run(Command::new("/system/backup/save").attribute("name", &path))
        .await?;
    Ok(format!("{path}{BACKUP_SUFFIX}"))
}

/// Have the device write a terse configuration export at `path`,
/// creating the containing remote directory first. Returns the
/// artifact path with its fixed suffix.
pub async fn make_export<S>(
    api: &mut ApiClient<S>,
    fs: &dyn RemoteFs,
    path: &str,
) -> Result<String, AgentError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (dir, file) = split_remote(path);
    let path = join_remote(&dir, &file);
    if !dir.is_empty() && dir != "." {
        fs.mkdir_all(&dir)?;
    }
    api.run(Command::new("/export").flag("terse").attribute("file", &path))
        .await?;
    Ok(format!("{path}{EXPORT_SUFFIX}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosman_api::codec::{encode_sentence, read_word};
    use rosman_api::ApiConfig;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::io::Cursor;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    // ── In-memory remote tree ───────────────────────────────────────

    #[derive(Default)]
    struct FakeRemote {
        files: RefCell<BTreeMap<String, Vec<u8>>>,
        made_dirs: RefCell<Vec<String>>,
        fail_remove: bool,
    }

    impl FakeRemote {
        fn insert(&self, path: &str, data: &[u8]) {
            self.files.borrow_mut().insert(path.to_string(), data.to_vec());
        }
    }

    impl RemoteFs for FakeRemote {
        fn read_dir(&self, dir: &str) -> Result<Vec<RemoteEntry>, AgentError> {
            let prefix = format!("{}/", dir.trim_end_matches('/'));
            let mut entries = Vec::new();
            let mut seen = std::collections::BTreeSet::new();
            for key in self.files.borrow().keys() {
                let rest = match key.strip_prefix(&prefix) {
                    Some(rest) => rest,
                    None => continue,
                };
                match rest.split_once('/') {
                    Some((child, _)) => {
                        if seen.insert(child.to_string()) {
                            entries.push(RemoteEntry { name: child.to_string(), is_dir: true });
                        }
                    }
                    None => {
                        if seen.insert(rest.to_string()) {
                            entries.push(RemoteEntry { name: rest.to_string(), is_dir: false });
                        }
                    }
                }
            }
            Ok(entries)
        }

        fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, AgentError> {
            let data = self
                .files
                .borrow()
                .get(path)
                .cloned()
                .ok_or_else(|| AgentError::transfer(format!("no such file \"{path}\"")))?;
            Ok(Box::new(Cursor::new(data)))
        }

        fn remove(&self, path: &str) -> Result<(), AgentError> {
            if self.fail_remove {
                return Err(AgentError::transfer(format!("remove \"{path}\" refused")));
            }
            self.files
                .borrow_mut()
                .remove(path)
                .map(|_| ())
                .ok_or_else(|| AgentError::transfer(format!("no such file \"{path}\"")))
        }

        fn mkdir_all(&self, dir: &str) -> Result<(), AgentError> {
            self.made_dirs.borrow_mut().push(dir.to_string());
            Ok(())
        }
    }

    // ── Path handling ───────────────────────────────────────────────

    #[test]
    fn join_remote_normalizes_trailing_slashes() {
        assert_eq!(join_remote("flash/backups", "a"), "flash/backups/a");
        assert_eq!(join_remote("flash/backups/", "a"), "flash/backups/a");
        assert_eq!(join_remote("/", "a"), "/a");
        assert_eq!(join_remote("", "a"), "a");
    }

    #[test]
    fn split_remote_handles_every_shape() {
        assert_eq!(split_remote("flash/backups/gw.backup"), ("flash/backups".into(), "gw.backup".into()));
        assert_eq!(split_remote("gw.backup"), (String::new(), "gw.backup".into()));
        assert_eq!(split_remote("/gw.backup"), ("/".into(), "gw.backup".into()));
        // Backslashes from configs written on Windows.
        assert_eq!(split_remote("flash\\backups\\gw.backup"), ("flash/backups".into(), "gw.backup".into()));
    }

    // ── Download ────────────────────────────────────────────────────

    #[test]
    fn download_file_keeps_remote_without_delete_flag() {
        let remote = FakeRemote::default();
        remote.insert("backups/gw.backup", b"bytes");
        let tmp = tempfile::tempdir().unwrap();

        download_file(&remote, "backups/gw.backup", tmp.path(), false).unwrap();

        assert_eq!(fs::read(tmp.path().join("gw.backup")).unwrap(), b"bytes");
        assert!(remote.files.borrow().contains_key("backups/gw.backup"));
    }

    #[test]
    fn failed_delete_reports_but_local_copy_survives() {
        let remote = FakeRemote { fail_remove: true, ..FakeRemote::default() };
        remote.insert("backups/gw.backup", b"bytes");
        let tmp = tempfile::tempdir().unwrap();

        let err = download_file(&remote, "backups/gw.backup", tmp.path(), true).unwrap_err();
        assert!(err.message.contains("refused"), "{}", err.message);
        // Copy-then-delete ordering: the bytes made it home first.
        assert_eq!(fs::read(tmp.path().join("gw.backup")).unwrap(), b"bytes");
    }

    #[test]
    fn download_folder_recurses_and_deletes_files() {
        let remote = FakeRemote::default();
        remote.insert("backups/a/file1", b"one");
        remote.insert("backups/a/b/file2", b"two");
        let tmp = tempfile::tempdir().unwrap();

        download_folder(&remote, "backups", tmp.path(), true).unwrap();

        assert_eq!(fs::read(tmp.path().join("a/file1")).unwrap(), b"one");
        assert_eq!(fs::read(tmp.path().join("a/b/file2")).unwrap(), b"two");
        assert!(remote.files.borrow().is_empty());
    }

    // ── Artifacts ───────────────────────────────────────────────────

    /// One-command fake device for the artifact operations.
    fn serve_one_done(mut io: DuplexStream) -> tokio::task::JoinHandle<Vec<String>> {
        tokio::spawn(async move {
            let mut words = Vec::new();
            while let Some(word) = read_word(&mut io).await.unwrap() {
                words.push(word);
            }
            io.write_all(&encode_sentence(&["!done"])).await.unwrap();
            io.flush().await.unwrap();
            words
        })
    }

    fn client(io: DuplexStream) -> ApiClient<DuplexStream> {
        ApiClient::over_stream(io, ApiConfig::new("router", 8728, "admin"))
    }

    #[tokio::test]
    async fn make_backup_creates_dir_and_appends_suffix() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let server = serve_one_done(server_io);
        let remote = FakeRemote::default();

        let mut api = client(client_io);
        let artifact = make_backup(&mut api, &remote, "flash/exports/gw-01").await.unwrap();

        assert_eq!(artifact, "flash/exports/gw-01.backup");
        assert_eq!(*remote.made_dirs.borrow(), vec!["flash/exports"]);
        let request = server.await.unwrap();
        assert_eq!(request[0], "/system/backup/save");
        assert!(request.contains(&"=name=flash/exports/gw-01".to_string()));
    }

    #[tokio::test]
    async fn make_export_is_terse_and_appends_suffix() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let server = serve_one_done(server_io);
        let remote = FakeRemote::default();

        let mut api = client(client_io);
        let artifact = make_export(&mut api, &remote, "flash/exports/gw-01").await.unwrap();

        assert_eq!(artifact, "flash/exports/gw-01.rsc");
        let request = server.await.unwrap();
        assert_eq!(request[0], "/export");
        assert!(request.contains(&"=terse".to_string()));
        assert!(request.contains(&"=file=flash/exports/gw-01".to_string()));
    }

    #[tokio::test]
    async fn bare_artifact_name_needs_no_directory() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let server = serve_one_done(server_io);
        let remote = FakeRemote::default();

        let mut api = client(client_io);
        let artifact = make_backup(&mut api, &remote, "gw-01").await.unwrap();

        assert_eq!(artifact, "gw-01.backup");
        assert!(remote.made_dirs.borrow().is_empty());
        server.await.unwrap();
    }
}
