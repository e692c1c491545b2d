//! Defines the unified error surface for daemon launch and supervision.

use std::io;
use std::path::PathBuf;

use dpid_config::ConfigError;
use nix::errno::Errno;
use thiserror::Error;

use crate::registry::RegistryError;
use crate::sockets::SocketError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration or per-user paths could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Another daemon answers on the recorded rendezvous socket.
    #[error("dpid already running on '{socket}'")]
    AlreadyRunning {
        /// Rendezvous socket of the running instance.
        socket: PathBuf,
    },

    /// Plugin registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A socket could not be created.
    #[error(transparent)]
    Socket(#[from] SocketError),

    /// Writing the keys file failed.
    #[error("failed to write keys file '{path}': {source}")]
    KeysWrite {
        /// Keys file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Writing the socket directory pointer failed.
    #[error("failed to write socket directory pointer '{path}': {source}")]
    PointerWrite {
        /// Pointer file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Installing the signal pipes failed.
    #[error("failed to install signal handlers: {source}")]
    Signals {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Waiting for readiness failed.
    #[error("event loop failed: {source}")]
    Poll {
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
}
