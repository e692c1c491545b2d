use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while creating daemon sockets.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The runtime socket directory could not be created.
    #[error("failed to create socket directory in '{path}': {source}")]
    Directory {
        /// Parent directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The rendezvous path is already bound; another daemon is probably
    /// running.
    #[error("socket '{path}' is already in use; is another dpid running?")]
    AddressInUse {
        /// Socket path.
        path: PathBuf,
    },

    /// Creating, binding, or listening on a socket failed.
    #[error("failed to listen on '{path}': {source}")]
    Bind {
        /// Socket path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}
