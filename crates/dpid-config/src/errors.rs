use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving configuration and per-user files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration directory was given and `$HOME` is unknown.
    #[error("cannot determine the home directory; pass --config-dir")]
    MissingHome,

    /// The per-user configuration directory could not be created.
    #[error("failed to prepare configuration directory '{path}': {source}")]
    ConfigDirectory {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A `dpidrc` file could not be read.
    #[error("failed to read service configuration '{path}': {source}")]
    ReadRc {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The `dpidrc` file has no `dpi_dir` line.
    #[error("service configuration '{path}' does not set dpi_dir")]
    MissingDpiDir {
        /// Configuration file path.
        path: PathBuf,
    },
}
