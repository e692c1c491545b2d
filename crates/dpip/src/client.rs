//! Client helpers for talking to the daemon's rendezvous socket.

use std::fs;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::auth::{KEYS_FILE_NAME, KeysFile};
use crate::dsh::Dsh;
use crate::error::ClientError;
use crate::tag::{build_cmd, get_attr};

/// File name of the rendezvous socket inside the runtime socket directory.
pub const RENDEZVOUS_SOCKET_NAME: &str = "dpid.srs";

/// File name of the pointer file recording the runtime socket directory.
pub const SOCKET_DIR_POINTER_NAME: &str = "dpi_socket_dir";

const CLIENT_TARGET: &str = "dpip::client";

/// Authenticated client for the rendezvous socket.
#[derive(Debug, Clone)]
pub struct RendezvousClient {
    socket_path: PathBuf,
    keys_path: PathBuf,
}

impl RendezvousClient {
    /// Creates a client for an explicit socket and keys file.
    #[must_use]
    pub const fn new(socket_path: PathBuf, keys_path: PathBuf) -> Self {
        Self {
            socket_path,
            keys_path,
        }
    }

    /// Locates the daemon through the per-user configuration directory.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::SocketDirPointer`] when the pointer file cannot
    /// be read.
    pub fn from_config_dir(config_dir: &Path) -> Result<Self, ClientError> {
        let pointer = config_dir.join(SOCKET_DIR_POINTER_NAME);
        let contents =
            fs::read_to_string(&pointer).map_err(|source| ClientError::SocketDirPointer {
                path: pointer.clone(),
                source,
            })?;
        let socket_dir = PathBuf::from(contents.trim_end_matches(['\n', '\r']));
        Ok(Self::new(
            socket_dir.join(RENDEZVOUS_SOCKET_NAME),
            config_dir.join(KEYS_FILE_NAME),
        ))
    }

    /// Path of the rendezvous socket this client connects to.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Asks the daemon for the socket serving `service`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] when the daemon answers with
    /// `DpiError`, and transport or authentication errors otherwise.
    pub fn check_server(&self, service: &str) -> Result<PathBuf, ClientError> {
        let mut dsh = self.connect()?;
        dsh.write_str(true, &build_cmd(&[("cmd", "check_server"), ("msg", service)])?)?;
        let reply = dsh.read_tag(true).ok_or(ClientError::NoReply)?;
        dsh.close()?;
        match get_attr(&reply, "cmd").as_deref() {
            Some("send_data") => get_attr(&reply, "msg")
                .map(PathBuf::from)
                .ok_or(ClientError::UnexpectedReply { tag: reply }),
            Some("DpiError") => Err(ClientError::Rejected {
                message: get_attr(&reply, "msg").unwrap_or_default(),
            }),
            _ => Err(ClientError::UnexpectedReply { tag: reply }),
        }
    }

    /// Asks the daemon to rescan its plugins and services.
    ///
    /// # Errors
    ///
    /// Returns transport or authentication errors.
    pub fn register_all(&self) -> Result<(), ClientError> {
        self.send(&build_cmd(&[("cmd", "register_all")])?)
    }

    /// Asks the daemon to stop its server plugins and exit.
    ///
    /// # Errors
    ///
    /// Returns transport or authentication errors.
    pub fn bye(&self) -> Result<(), ClientError> {
        self.send(&build_cmd(&[("cmd", "DpiBye")])?)
    }

    fn send(&self, tag: &str) -> Result<(), ClientError> {
        let mut dsh = self.connect()?;
        dsh.write_str(true, tag)?;
        dsh.close()?;
        Ok(())
    }

    fn connect(&self) -> Result<Dsh, ClientError> {
        let keys = KeysFile::load(&self.keys_path)?;
        connect_authenticated(&self.socket_path, &keys)
    }
}

/// Connects to `socket_path` and presents the secret as the first tag.
///
/// # Errors
///
/// Returns [`ClientError::Connect`] when the socket cannot be reached and
/// [`ClientError::Transport`] when the `auth` tag cannot be sent.
pub fn connect_authenticated(socket_path: &Path, keys: &KeysFile) -> Result<Dsh, ClientError> {
    let stream = UnixStream::connect(socket_path).map_err(|source| ClientError::Connect {
        path: socket_path.to_path_buf(),
        source,
    })?;
    let mut dsh = Dsh::from_stream(stream);
    dsh.write_str(true, &keys.auth_tag()?)?;
    debug!(
        target: CLIENT_TARGET,
        socket = %socket_path.display(),
        "authenticated connection"
    );
    Ok(dsh)
}
