//! Error types for the client runtime.

use dpip::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("cannot determine the configuration directory; pass --config-dir")]
    MissingConfigDir,
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to write output: {0}")]
    Output(std::io::Error),
}
