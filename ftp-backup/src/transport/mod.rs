//! Remote transports for shipping archives off-site.
//!
//! One [`RemoteTransport`] trait with an FTP/FTPS and an SFTP implementation,
//! picked by [`Protocol`]. All calls are blocking.

pub mod ftp;
pub mod sftp;

pub use ftp::FtpTransport;
pub use sftp::SftpTransport;

use crate::config::{Protocol, RemoteConfig};
use std::net::TcpStream;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Connect and per-operation timeout.
pub const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound blocking reads and writes on a connected socket; failures are logged.
pub(crate) fn apply_socket_timeouts(stream: &TcpStream) {
    if let Err(e) = stream.set_read_timeout(Some(TRANSPORT_TIMEOUT)) {
        warn!(error = %e, "Could not set socket read timeout");
    }
    if let Err(e) = stream.set_write_timeout(Some(TRANSPORT_TIMEOUT)) {
        warn!(error = %e, "Could not set socket write timeout");
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0}")]
    Configuration(String),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("{0}")]
    Operation(String),

    #[error("Not connected to remote server")]
    NotConnected,
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

pub trait RemoteTransport {
    fn protocol(&self) -> Protocol;

    fn connect(&mut self) -> TransportResult<()>;

    /// Upload `local` to `remote`, creating the remote parent directory first.
    fn upload(&mut self, local: &Path, remote: &str) -> TransportResult<()>;

    /// Create `dir` and any missing parents.
    fn create_dir(&mut self, dir: &str) -> TransportResult<()>;

    fn delete(&mut self, remote: &str) -> TransportResult<()>;

    /// Plain file names in `dir`, without `.` and `..`.
    fn list(&mut self, dir: &str) -> TransportResult<Vec<String>>;

    fn stat_size(&mut self, remote: &str) -> TransportResult<u64>;

    /// Modification time in seconds since epoch.
    fn stat_mtime(&mut self, remote: &str) -> TransportResult<i64>;

    /// Close the session. Safe to call when not connected.
    fn disconnect(&mut self);
}

/// Builds an unconnected transport for a remote configuration.
pub type TransportFactory =
    Arc<dyn Fn(&RemoteConfig) -> TransportResult<Box<dyn RemoteTransport>> + Send + Sync>;

/// Pick the transport implementation for `remote.protocol`.
///
/// Incomplete credentials are rejected here, before any network activity.
pub fn from_config(remote: &RemoteConfig) -> TransportResult<Box<dyn RemoteTransport>> {
    if let Some(message) = remote.missing_credentials() {
        return Err(TransportError::Configuration(message));
    }

    Ok(match remote.protocol {
        Protocol::Ftp => Box::new(FtpTransport::new(remote.clone(), false)),
        Protocol::Ftps => Box::new(FtpTransport::new(remote.clone(), true)),
        Protocol::Sftp => Box::new(SftpTransport::new(remote.clone())),
    })
}

pub fn default_factory() -> TransportFactory {
    Arc::new(from_config)
}

/// A connected transport that disconnects when dropped.
pub struct Connection {
    inner: Box<dyn RemoteTransport>,
}

impl Connection {
    pub fn open(remote: &RemoteConfig, factory: &TransportFactory) -> TransportResult<Self> {
        let mut inner = factory(remote)?;
        if let Err(e) = inner.connect() {
            inner.disconnect();
            return Err(e);
        }
        Ok(Self { inner })
    }
}

impl Deref for Connection {
    type Target = dyn RemoteTransport;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for Connection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.inner.disconnect();
    }
}

/// Cumulative paths for each component of `dir`: `/a/b` gives `/a`, `/a/b`.
pub(crate) fn dir_prefixes(dir: &str) -> Vec<String> {
    let mut path = String::new();
    dir.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .map(|part| {
            path.push('/');
            path.push_str(part);
            path.clone()
        })
        .collect()
}

/// Parent directory of a remote path, `/` when there is none.
pub(crate) fn remote_parent(remote: &str) -> &str {
    match remote.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &remote[..idx],
    }
}

/// Last path component of a listing entry.
pub(crate) fn entry_name(entry: &str) -> Option<String> {
    let name = entry.trim_end_matches('/').rsplit('/').next()?;
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

/// Directory argument for listings: no trailing slash, `/` when empty.
pub(crate) fn normalize_dir(dir: &str) -> &str {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}
