use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while registering plugins.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Neither the user nor the system plugin directory exists.
    #[error(
        "no plugin directory found (user: '{}', system: '{}')",
        user.display(),
        system.as_deref().map_or_else(|| String::from("unset"), |dir| dir.display().to_string())
    )]
    NoPluginDirectory {
        /// User plugin directory.
        user: PathBuf,
        /// System plugin directory named by `dpi_dir`, if any.
        system: Option<PathBuf>,
    },
}
