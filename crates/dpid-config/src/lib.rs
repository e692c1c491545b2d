//! Configuration shared by the dpid daemon and its client.
//!
//! Command-line flags take precedence over environment variables, which take
//! precedence over the built-in defaults in [`defaults`]. The per-user file
//! layout lives in [`UserPaths`] and the service configuration grammar in
//! [`dpidrc`].

pub mod defaults;
pub mod dpidrc;
mod errors;
mod logging;
mod paths;

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

pub use defaults::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_KEEP_ALIVE_PLUGIN, DEFAULT_LOG_FILTER,
    DEFAULT_SYSTEM_CONFIG, default_config_dir, default_socket_root,
};
pub use dpidrc::{ServiceEntry, get_dpi_dir, load_services};
pub use errors::ConfigError;
pub use logging::{LogFormat, LogFormatParseError};
pub use paths::UserPaths;

/// Daemon configuration.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dpid",
    version,
    about = "Discovers, authenticates, and supervises dpip plugins"
)]
pub struct Config {
    /// Per-user configuration directory (defaults to ~/.dpid).
    #[arg(long, env = "DPID_CONFIG_DIR", value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Directory under which the runtime socket directory is created.
    #[arg(long, env = "DPID_SOCKET_ROOT", value_name = "DIR")]
    socket_root: Option<PathBuf>,

    /// System-wide service configuration used when the user has none.
    #[arg(
        long,
        env = "DPID_SYSTEM_CONFIG",
        value_name = "FILE",
        default_value = DEFAULT_SYSTEM_CONFIG
    )]
    system_config: PathBuf,

    /// Seconds without activity before the daemon exits; 0 disables.
    #[arg(
        long,
        env = "DPID_IDLE_TIMEOUT",
        value_name = "SECONDS",
        default_value_t = DEFAULT_IDLE_TIMEOUT_SECS
    )]
    idle_timeout: u64,

    /// Plugin id whose liveness suppresses the idle timeout.
    #[arg(
        long,
        env = "DPID_KEEP_ALIVE_PLUGIN",
        value_name = "ID",
        default_value = DEFAULT_KEEP_ALIVE_PLUGIN
    )]
    keep_alive_plugin: String,

    /// Tracing filter directive.
    #[arg(
        long,
        env = "DPID_LOG_FILTER",
        value_name = "FILTER",
        default_value = DEFAULT_LOG_FILTER
    )]
    log_filter: String,

    /// Log output format.
    #[arg(
        long,
        env = "DPID_LOG_FORMAT",
        value_name = "FORMAT",
        default_value_t = LogFormat::default()
    )]
    log_format: LogFormat,
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns the [`clap::Error`] describing invalid arguments; help and
    /// version requests are reported the same way.
    pub fn load() -> Result<Self, clap::Error> {
        Self::try_parse()
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)
    }

    /// Resolves the per-user configuration directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingHome`] when neither a flag nor `$HOME`
    /// provides a directory.
    pub fn config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.config_dir
            .clone()
            .or_else(default_config_dir)
            .ok_or(ConfigError::MissingHome)
    }

    /// Per-user paths rooted at [`Config::config_dir`].
    ///
    /// # Errors
    ///
    /// See [`Config::config_dir`].
    pub fn user_paths(&self) -> Result<UserPaths, ConfigError> {
        self.config_dir().map(UserPaths::new)
    }

    /// Directory under which the runtime socket directory is created.
    #[must_use]
    pub fn socket_root(&self) -> PathBuf {
        self.socket_root
            .clone()
            .unwrap_or_else(default_socket_root)
    }

    /// System-wide service configuration file.
    #[must_use]
    pub fn system_config(&self) -> &std::path::Path {
        &self.system_config
    }

    /// Idle timeout, or `None` when idling out is disabled.
    #[must_use]
    pub const fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Plugin id whose liveness suppresses the idle timeout.
    #[must_use]
    pub fn keep_alive_plugin(&self) -> &str {
        &self.keep_alive_plugin
    }

    /// Tracing filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
