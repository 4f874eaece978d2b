//! SFTP transport over ssh2, with password or private-key authentication.

use super::{
    apply_socket_timeouts, dir_prefixes, entry_name, normalize_dir, remote_parent,
    RemoteTransport, TransportError, TransportResult, TRANSPORT_TIMEOUT,
};
use crate::config::{Protocol, RemoteConfig};
use ssh2::{Session, Sftp};
use std::fs::File;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use tracing::{debug, info};

pub struct SftpTransport {
    config: RemoteConfig,
    session: Option<(Session, Sftp)>,
}

impl SftpTransport {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    fn sftp(&self) -> TransportResult<&Sftp> {
        self.session
            .as_ref()
            .map(|(_, sftp)| sftp)
            .ok_or(TransportError::NotConnected)
    }

    fn open_tcp(&self) -> TransportResult<TcpStream> {
        let host = self.config.host.as_str();
        let port = self.config.port();
        let connect_err = |detail: String| {
            TransportError::Connect(format!(
                "Failed to connect to SFTP server: {}:{} ({})",
                host, port, detail
            ))
        };

        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| connect_err(e.to_string()))?
            .next()
            .ok_or_else(|| connect_err("no address".into()))?;

        let tcp = TcpStream::connect_timeout(&addr, TRANSPORT_TIMEOUT)
            .map_err(|e| connect_err(e.to_string()))?;
        apply_socket_timeouts(&tcp);
        Ok(tcp)
    }

    fn authenticate(&self, sess: &Session) -> TransportResult<()> {
        let username = self.config.username.as_str();

        let result = match &self.config.private_key {
            Some(key_path) => {
                if !key_path.exists() {
                    return Err(TransportError::Configuration(format!(
                        "Private key file not found: {}",
                        key_path.display()
                    )));
                }
                sess.userauth_pubkey_file(
                    username,
                    None,
                    key_path,
                    self.config.passphrase.as_deref(),
                )
                .map_err(|e| {
                    TransportError::Auth(format!("SFTP key authentication failed: {}", e))
                })
            }
            None => sess
                .userauth_password(username, &self.config.password)
                .map_err(|e| TransportError::Auth(format!("SFTP password authentication failed: {}", e))),
        };
        result?;

        if !sess.authenticated() {
            return Err(TransportError::Auth("SFTP authentication failed".into()));
        }
        Ok(())
    }
}

fn op_error(action: &str, path: &str, e: impl std::fmt::Display) -> TransportError {
    TransportError::Operation(format!("Failed to {} on SFTP server: {} ({})", action, path, e))
}

impl RemoteTransport for SftpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Sftp
    }

    fn connect(&mut self) -> TransportResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let tcp = self.open_tcp()?;
        let mut sess =
            Session::new().map_err(|e| TransportError::Connect(format!("SSH session: {}", e)))?;
        sess.set_tcp_stream(tcp);
        sess.set_timeout(TRANSPORT_TIMEOUT.as_millis() as u32);
        sess.handshake()
            .map_err(|e| TransportError::Connect(format!("SSH handshake failed: {}", e)))?;

        self.authenticate(&sess)?;

        let sftp = sess
            .sftp()
            .map_err(|e| TransportError::Connect(format!("Failed to initialize SFTP subsystem: {}", e)))?;

        info!(host = %self.config.host, "SFTP session established");
        self.session = Some((sess, sftp));
        Ok(())
    }

    fn upload(&mut self, local: &Path, remote: &str) -> TransportResult<()> {
        let local_size = std::fs::metadata(local)
            .map_err(|e| op_error("read local file", &local.display().to_string(), e))?
            .len();
        if local_size == 0 {
            return Err(TransportError::Operation(format!(
                "Local file is empty: {}",
                local.display()
            )));
        }

        self.create_dir(remote_parent(remote))?;

        let sftp = self.sftp()?;
        let mut source = File::open(local)
            .map_err(|e| op_error("read local file", &local.display().to_string(), e))?;
        let mut target = sftp
            .create(Path::new(remote))
            .map_err(|e| op_error("open remote file", remote, e))?;
        std::io::copy(&mut source, &mut target).map_err(|e| op_error("upload file", remote, e))?;
        drop(target);

        let remote_size = self.stat_size(remote)?;
        if remote_size != local_size {
            return Err(TransportError::Operation(format!(
                "Upload verification failed for {}: local {} bytes, remote {} bytes",
                remote, local_size, remote_size
            )));
        }

        debug!(remote = %remote, bytes = local_size, "Uploaded and verified file");
        Ok(())
    }

    fn create_dir(&mut self, dir: &str) -> TransportResult<()> {
        let sftp = self.sftp()?;
        for path in dir_prefixes(dir) {
            if sftp.stat(Path::new(&path)).is_err() {
                sftp.mkdir(Path::new(&path), 0o755)
                    .map_err(|e| op_error("create directory", &path, e))?;
            }
        }
        Ok(())
    }

    fn delete(&mut self, remote: &str) -> TransportResult<()> {
        self.sftp()?
            .unlink(Path::new(remote))
            .map_err(|e| op_error("delete file", remote, e))
    }

    fn list(&mut self, dir: &str) -> TransportResult<Vec<String>> {
        let dir = normalize_dir(dir);
        let entries = self
            .sftp()?
            .readdir(Path::new(dir))
            .map_err(|e| op_error("list directory", dir, e))?;

        Ok(entries
            .iter()
            .filter_map(|(path, _)| entry_name(&path.to_string_lossy()))
            .collect())
    }

    fn stat_size(&mut self, remote: &str) -> TransportResult<u64> {
        self.sftp()?
            .stat(Path::new(remote))
            .map_err(|e| op_error("get file size", remote, e))?
            .size
            .ok_or_else(|| op_error("get file size", remote, "size not reported"))
    }

    fn stat_mtime(&mut self, remote: &str) -> TransportResult<i64> {
        self.sftp()?
            .stat(Path::new(remote))
            .map_err(|e| op_error("get modified time", remote, e))?
            .mtime
            .map(|mtime| mtime as i64)
            .ok_or_else(|| op_error("get modified time", remote, "mtime not reported"))
    }

    fn disconnect(&mut self) {
        if let Some((sess, sftp)) = self.session.take() {
            drop(sftp);
            if let Err(e) = sess.disconnect(None, "Backup finished", None) {
                debug!(error = %e, "SSH disconnect failed");
            }
        }
    }
}

impl Drop for SftpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_operations_require_connection() {
        let mut transport = SftpTransport::new(RemoteConfig::default());
        assert_eq!(transport.delete("/a.zip"), Err(TransportError::NotConnected));
        assert_eq!(transport.stat_mtime("/a.zip"), Err(TransportError::NotConnected));
        transport.disconnect();
    }

    #[test]
    fn test_empty_local_file_rejected() {
        let empty = NamedTempFile::new().unwrap();
        let mut transport = SftpTransport::new(RemoteConfig::default());
        match transport.upload(empty.path(), "/backups/a.zip") {
            Err(TransportError::Operation(msg)) => assert!(msg.contains("empty")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_non_empty_upload_needs_connection() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"PK").unwrap();
        let mut transport = SftpTransport::new(RemoteConfig::default());
        assert_eq!(
            transport.upload(file.path(), "/backups/a.zip"),
            Err(TransportError::NotConnected)
        );
    }
}
