//! Error types raised by the dpip codec, socket handle, and client helpers.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors arising while building or interpreting dpip tags.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DpipError {
    /// An attribute name contained the quote character.
    #[error("attribute name '{name}' contains a quote")]
    QuoteInName {
        /// Offending attribute name.
        name: String,
    },

    /// An attribute name was empty or contained whitespace or `=`.
    #[error("attribute name '{name}' is not a valid dpip name")]
    InvalidName {
        /// Offending attribute name.
        name: String,
    },

    /// A tag was requested without any attributes.
    #[error("a dpip tag needs at least one attribute")]
    EmptyTag,

    /// The command template used a conversion other than `%s`.
    #[error("unsupported conversion '%{conversion}' in command template")]
    UnsupportedConversion {
        /// The character following `%`.
        conversion: char,
    },

    /// The number of template placeholders and values differ.
    #[error("command template expects {expected} values but {supplied} were supplied")]
    ArgumentCount {
        /// Placeholders present in the template.
        expected: usize,
        /// Values supplied by the caller.
        supplied: usize,
    },
}

/// Errors surfaced by a [`Dsh`](crate::Dsh).
#[derive(Debug, Error, Clone)]
pub enum DshError {
    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// An unrecoverable I/O error occurred.
    #[error("socket I/O failed: {source}")]
    Io {
        /// Underlying error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl DshError {
    pub(crate) fn io(source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof => Self::Closed,
            _ => Self::Io {
                source: Arc::new(source),
            },
        }
    }
}

impl From<nix::errno::Errno> for DshError {
    fn from(errno: nix::errno::Errno) -> Self {
        Self::io(io::Error::from(errno))
    }
}

/// Errors raised while reading the per-user keys file.
#[derive(Debug, Error)]
pub enum KeysError {
    /// The keys file could not be read.
    #[error("failed to read keys file '{path}': {source}")]
    Read {
        /// Keys file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The first line did not have the `<port> <hex-secret>` shape.
    #[error("keys file '{path}' is malformed")]
    Malformed {
        /// Keys file path.
        path: PathBuf,
    },
}

/// Errors raised by the rendezvous client helpers.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The socket directory pointer file could not be read.
    #[error("failed to read socket directory pointer '{path}': {source}")]
    SocketDirPointer {
        /// Pointer file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Connecting to a daemon or plugin socket failed.
    #[error("failed to connect to '{path}': {source}")]
    Connect {
        /// Socket path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Loading the shared secret failed.
    #[error(transparent)]
    Keys(#[from] KeysError),

    /// Building a request tag failed.
    #[error(transparent)]
    Tag(#[from] DpipError),

    /// The connection failed mid-exchange.
    #[error(transparent)]
    Transport(#[from] DshError),

    /// The daemon closed the connection without answering.
    #[error("daemon closed the connection without a reply")]
    NoReply,

    /// The daemon answered with a `DpiError` tag.
    #[error("daemon rejected the request: {message}")]
    Rejected {
        /// Message carried by the error tag.
        message: String,
    },

    /// The daemon answered with an unexpected tag.
    #[error("unexpected reply from daemon: {tag}")]
    UnexpectedReply {
        /// The raw reply.
        tag: String,
    },
}
