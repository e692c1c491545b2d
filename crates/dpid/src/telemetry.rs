//! Log output of the daemon.
//!
//! `dpid` normally runs detached from any terminal, so every event goes to
//! stderr, which the launching browser either inherits or discards. Plugin
//! processes get their own stderr and never share this subscriber.

use std::io::{self, IsTerminal};

use dpid_config::LogFormat;
use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

static INSTALLED_FORMAT: OnceCell<LogFormat> = OnceCell::new();

/// Errors encountered while configuring log output.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The `--log-filter` directive could not be parsed.
    #[error("invalid log filter '{directive}': {message}")]
    Filter { directive: String, message: String },
    /// Another subscriber already owns the process.
    #[error("failed to install log subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Routes daemon events matching `filter` to stderr in `format`.
///
/// Only the first call installs a subscriber. Every call returns the format
/// actually in effect.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable directive and
/// [`TelemetryError::Subscriber`] when a foreign subscriber is installed.
pub fn initialise(filter: &str, format: LogFormat) -> Result<LogFormat, TelemetryError> {
    INSTALLED_FORMAT
        .get_or_try_init(|| install_subscriber(filter, format).map(|()| format))
        .copied()
}

fn parse_filter(directive: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directive).map_err(|error| TelemetryError::Filter {
        directive: directive.to_owned(),
        message: error.to_string(),
    })
}

fn install_subscriber(directive: &str, format: LogFormat) -> Result<(), TelemetryError> {
    let filter = parse_filter(directive)?;
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
