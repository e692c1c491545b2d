use std::env;
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Name of the per-user configuration directory under `$HOME`.
pub const CONFIG_DIR_NAME: &str = ".dpid";

/// Default location of the system-wide service configuration.
pub const DEFAULT_SYSTEM_CONFIG: &str = "/etc/dpid/dpidrc";

/// Seconds of inactivity after which the daemon exits.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 3600;

/// Plugin whose liveness keeps the daemon from idling out.
pub const DEFAULT_KEEP_ALIVE_PLUGIN: &str = "downloads";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::default()
}

/// Per-user configuration directory, `~/.dpid`.
///
/// Returns `None` when the home directory cannot be determined.
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME))
}

/// Directory under which runtime socket directories are created.
#[must_use]
pub fn default_socket_root() -> PathBuf {
    env::temp_dir()
}
