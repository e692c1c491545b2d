//! Runtime socket directory, rendezvous socket, and per-plugin sockets.
//!
//! Every socket created here is unlinked when its owner is dropped, and the
//! runtime directory is removed with its contents when [`SocketDir`] goes.

mod error;

use std::fs::{self, Permissions};
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use dpip::RENDEZVOUS_SOCKET_NAME;
use socket2::{Domain, SockAddr, Socket, Type};
use tempfile::{Builder, NamedTempFile, TempDir};
use tracing::{debug, warn};

use crate::registry::Plugin;

pub use error::SocketError;

pub(crate) const SOCKETS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::sockets");

const BACKLOG: i32 = 5;
const SUFFIX_LEN: usize = 6;
const PLUGIN_SEND_BUFFER: usize = 64 * 1024;

/// Private directory holding every socket of one daemon run.
#[derive(Debug)]
pub struct SocketDir {
    dir: TempDir,
}

impl SocketDir {
    /// Creates `<root>/<user>-XXXXXX` with mode 0700.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Directory`] when the directory cannot be
    /// created.
    pub fn create(root: &Path, user: &str) -> Result<Self, SocketError> {
        let dir = Builder::new()
            .prefix(&format!("{user}-"))
            .rand_bytes(SUFFIX_LEN)
            .permissions(Permissions::from_mode(0o700))
            .tempdir_in(root)
            .map_err(|source| SocketError::Directory {
                path: root.to_path_buf(),
                source,
            })?;
        debug!(target: SOCKETS_TARGET, dir = %dir.path().display(), "socket directory created");
        Ok(Self { dir })
    }

    /// Path of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// The daemon's well-known listening socket, `<sockdir>/dpid.srs`.
#[derive(Debug)]
pub struct RendezvousSocket {
    listener: UnixListener,
    path: PathBuf,
}

impl RendezvousSocket {
    /// Binds and listens on `<sockdir>/dpid.srs`, mode 0600.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::AddressInUse`] when another socket already
    /// occupies the path, and [`SocketError::Bind`] for other failures.
    pub fn bind(sockdir: &Path) -> Result<Self, SocketError> {
        let path = sockdir.join(RENDEZVOUS_SOCKET_NAME);
        let listener = listen_at(&path, None).map_err(|source| {
            if source.kind() == io::ErrorKind::AddrInUse {
                SocketError::AddressInUse { path: path.clone() }
            } else {
                SocketError::Bind {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| SocketError::Bind {
                path: path.clone(),
                source,
            })?;
        debug!(target: SOCKETS_TARGET, socket = %path.display(), "rendezvous socket listening");
        Ok(Self { listener, path })
    }

    /// Path of the socket.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts one pending connection, if any.
    ///
    /// The returned stream is in blocking mode.
    ///
    /// # Errors
    ///
    /// Returns the underlying error; `WouldBlock` means nothing was pending.
    pub fn accept(&self) -> io::Result<UnixStream> {
        let (stream, _) = self.listener.accept()?;
        stream.set_nonblocking(false)?;
        Ok(stream)
    }
}

impl AsFd for RendezvousSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.listener.as_fd()
    }
}

impl Drop for RendezvousSocket {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                warn!(
                    target: SOCKETS_TARGET,
                    socket = %self.path.display(),
                    error = %error,
                    "failed to remove rendezvous socket"
                );
            }
            _ => {}
        }
    }
}

/// Listening socket dedicated to one plugin.
#[derive(Debug)]
pub struct PluginSocket {
    listener: NamedTempFile<UnixListener>,
}

impl PluginSocket {
    /// Binds `<sockdir>/<plugin-basename>-XXXXXX`, mode 0600, retrying on
    /// name collisions.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Bind`] when no socket could be bound.
    pub fn bind(plugin: &Plugin, sockdir: &Path) -> Result<Self, SocketError> {
        let basename = plugin
            .path()
            .file_name()
            .map_or_else(|| plugin.id().to_owned(), |name| name.to_string_lossy().into_owned());
        let listener = Builder::new()
            .prefix(&format!("{basename}-"))
            .rand_bytes(SUFFIX_LEN)
            .make_in(sockdir, |path| listen_at(path, Some(PLUGIN_SEND_BUFFER)))
            .map_err(|source| SocketError::Bind {
                path: sockdir.join(&basename),
                source,
            })?;
        debug!(
            target: SOCKETS_TARGET,
            plugin = plugin.id(),
            socket = %listener.path().display(),
            "plugin socket listening"
        );
        Ok(Self { listener })
    }

    /// Path of the socket.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.listener.path()
    }

    /// Accepts one pending connection.
    ///
    /// # Errors
    ///
    /// Returns the underlying error.
    pub fn accept(&self) -> io::Result<UnixStream> {
        self.listener.as_file().accept().map(|(stream, _)| stream)
    }

    /// Duplicates the listening descriptor for handing to a child process.
    ///
    /// # Errors
    ///
    /// Returns the underlying error.
    pub fn try_clone_fd(&self) -> io::Result<OwnedFd> {
        self.listener.as_file().try_clone().map(OwnedFd::from)
    }
}

impl AsFd for PluginSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.listener.as_file().as_fd()
    }
}

/// Creates a close-on-exec Unix stream socket listening at `path`.
fn listen_at(path: &Path, send_buffer: Option<usize>) -> io::Result<UnixListener> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    if let Some(size) = send_buffer {
        socket.set_send_buffer_size(size)?;
    }
    socket.bind(&SockAddr::unix(path)?)?;
    fs::set_permissions(path, Permissions::from_mode(0o600))?;
    socket.listen(BACKLOG)?;
    Ok(UnixListener::from(OwnedFd::from(socket)))
}
