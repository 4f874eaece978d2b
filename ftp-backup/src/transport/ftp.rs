//! FTP and explicit FTPS transport built on suppaftp.

use super::{
    apply_socket_timeouts, dir_prefixes, entry_name, normalize_dir, remote_parent,
    RemoteTransport, TransportError, TransportResult, TRANSPORT_TIMEOUT,
};
use crate::config::{Protocol, RemoteConfig};
use std::fs::File;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use suppaftp::native_tls::TlsConnector;
use suppaftp::types::{FileType, Mode};
use suppaftp::{FtpStream, NativeTlsConnector, NativeTlsFtpStream};
use tracing::{debug, info, warn};

enum Session {
    Plain(FtpStream),
    Secure(NativeTlsFtpStream),
}

/// Run the same expression against whichever stream type is active.
macro_rules! with_stream {
    ($session:expr, $stream:ident => $body:expr) => {
        match $session {
            Session::Plain($stream) => $body,
            Session::Secure($stream) => $body,
        }
    };
}

pub struct FtpTransport {
    config: RemoteConfig,
    secure: bool,
    session: Option<Session>,
}

impl FtpTransport {
    pub fn new(config: RemoteConfig, secure: bool) -> Self {
        Self {
            config,
            secure,
            session: None,
        }
    }

    fn session(&mut self) -> TransportResult<&mut Session> {
        self.session.as_mut().ok_or(TransportError::NotConnected)
    }

    fn resolve(&self) -> TransportResult<SocketAddr> {
        let target = (self.config.host.as_str(), self.config.port());
        target
            .to_socket_addrs()
            .map_err(|e| TransportError::Connect(format!("{}:{} ({})", target.0, target.1, e)))?
            .next()
            .ok_or_else(|| {
                TransportError::Connect(format!("{}:{} did not resolve", target.0, target.1))
            })
    }

    fn open_plain(&self, addr: SocketAddr) -> TransportResult<Session> {
        let stream = FtpStream::connect_timeout(addr, TRANSPORT_TIMEOUT).map_err(|e| {
            TransportError::Connect(format!(
                "Failed to connect to FTP server: {}:{} ({})",
                self.config.host,
                self.config.port(),
                e
            ))
        })?;
        apply_socket_timeouts(stream.get_ref());
        Ok(Session::Plain(stream))
    }

    fn open_secure(&self, addr: SocketAddr) -> TransportResult<Session> {
        let connector = TlsConnector::new()
            .map_err(|e| TransportError::Connect(format!("TLS setup failed: {}", e)))?;
        let stream = NativeTlsFtpStream::connect_timeout(addr, TRANSPORT_TIMEOUT)
            .and_then(|s| s.into_secure(NativeTlsConnector::from(connector), &self.config.host))
            .map_err(|e| {
                TransportError::Connect(format!(
                    "Failed to connect to FTPS server: {}:{} ({})",
                    self.config.host,
                    self.config.port(),
                    e
                ))
            })?;
        apply_socket_timeouts(stream.get_ref());
        Ok(Session::Secure(stream))
    }
}

fn op_error(action: &str, path: &str, e: impl std::fmt::Display) -> TransportError {
    TransportError::Operation(format!("Failed to {} on FTP server: {} ({})", action, path, e))
}

impl RemoteTransport for FtpTransport {
    fn protocol(&self) -> Protocol {
        if self.secure {
            Protocol::Ftps
        } else {
            Protocol::Ftp
        }
    }

    fn connect(&mut self) -> TransportResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let addr = self.resolve()?;
        let mut session = if self.secure {
            self.open_secure(addr)?
        } else {
            self.open_plain(addr)?
        };

        let username = self.config.username.clone();
        let password = self.config.password.clone();
        with_stream!(&mut session, s => s.login(&username, &password))
            .map_err(|_| TransportError::Auth("Failed to login to FTP server: Invalid credentials".into()))?;

        if self.config.passive {
            with_stream!(&mut session, s => s.set_mode(Mode::Passive));
        } else {
            with_stream!(&mut session, s => s.set_mode(Mode::Active));
        }

        info!(host = %self.config.host, secure = self.secure, "FTP session established");
        self.session = Some(session);
        Ok(())
    }

    fn upload(&mut self, local: &Path, remote: &str) -> TransportResult<()> {
        self.create_dir(remote_parent(remote))?;

        let mut file = File::open(local)
            .map_err(|e| op_error("read local file", &local.display().to_string(), e))?;
        let session = self.session()?;

        with_stream!(&mut *session, s => s.transfer_type(FileType::Binary))
            .map_err(|e| op_error("set binary mode", remote, e))?;
        let written = with_stream!(session, s => s.put_file(remote, &mut file))
            .map_err(|e| op_error("upload file", remote, e))?;

        debug!(remote = %remote, bytes = written, "Uploaded file");
        Ok(())
    }

    fn create_dir(&mut self, dir: &str) -> TransportResult<()> {
        let session = self.session()?;

        for path in dir_prefixes(dir) {
            let exists = with_stream!(&mut *session, s => s.cwd(&path)).is_ok();
            if !exists {
                with_stream!(&mut *session, s => s.mkdir(&path))
                    .map_err(|e| op_error("create directory", &path, e))?;
            }
        }

        if let Err(e) = with_stream!(&mut *session, s => s.cwd("/")) {
            warn!(error = %e, "Could not return to root directory");
        }
        Ok(())
    }

    fn delete(&mut self, remote: &str) -> TransportResult<()> {
        let session = self.session()?;
        with_stream!(session, s => s.rm(remote)).map_err(|e| op_error("delete file", remote, e))
    }

    fn list(&mut self, dir: &str) -> TransportResult<Vec<String>> {
        let dir = normalize_dir(dir);
        let session = self.session()?;
        let entries = with_stream!(session, s => s.nlst(Some(dir)))
            .map_err(|e| op_error("list directory", dir, e))?;

        Ok(entries.iter().filter_map(|e| entry_name(e)).collect())
    }

    fn stat_size(&mut self, remote: &str) -> TransportResult<u64> {
        let session = self.session()?;
        with_stream!(session, s => s.size(remote))
            .map(|size| size as u64)
            .map_err(|e| op_error("get file size", remote, e))
    }

    fn stat_mtime(&mut self, remote: &str) -> TransportResult<i64> {
        let session = self.session()?;
        with_stream!(session, s => s.mdtm(remote))
            .map(|mtime| mtime.and_utc().timestamp())
            .map_err(|e| op_error("get modified time", remote, e))
    }

    fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = with_stream!(&mut session, s => s.quit()) {
                debug!(error = %e, "FTP QUIT failed");
            }
        }
    }
}

impl Drop for FtpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_follows_tls_flag() {
        assert_eq!(FtpTransport::new(RemoteConfig::default(), false).protocol(), Protocol::Ftp);
        assert_eq!(FtpTransport::new(RemoteConfig::default(), true).protocol(), Protocol::Ftps);
    }

    #[test]
    fn test_operations_require_connection() {
        let mut transport = FtpTransport::new(RemoteConfig::default(), false);
        assert_eq!(transport.delete("/a.zip"), Err(TransportError::NotConnected));
        assert_eq!(transport.list("/"), Err(TransportError::NotConnected));
        assert_eq!(transport.stat_size("/a.zip"), Err(TransportError::NotConnected));
        transport.disconnect();
        transport.disconnect();
    }

    #[test]
    fn test_unresolvable_host_is_connect_error() {
        let config = RemoteConfig {
            host: "host.invalid".into(),
            username: "user".into(),
            password: "pass".into(),
            ..RemoteConfig::default()
        };
        let mut transport = FtpTransport::new(config, false);
        assert!(matches!(transport.connect(), Err(TransportError::Connect(_))));
    }
}
