//! Per-user file layout shared by the daemon and its clients.
//!
//! ```text
//! <config_dir>/            mode 0700
//!     dpi_socket_dir       path of the current runtime socket directory
//!     dpid_comm_keys       "<port> <hex-secret>"
//!     dpidrc               service configuration
//!     dpi/<id>/<name>.dpi  user plugins
//! ```

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use dpip::{KEYS_FILE_NAME, SOCKET_DIR_POINTER_NAME};

use crate::ConfigError;

const USER_RC: &str = "dpidrc";
const USER_PLUGIN_DIR: &str = "dpi";

/// Canonical paths of the per-user files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPaths {
    config_dir: PathBuf,
    socket_dir_pointer: PathBuf,
    keys_path: PathBuf,
    user_rc: PathBuf,
    user_plugin_dir: PathBuf,
}

impl UserPaths {
    /// Derives the layout rooted at `config_dir`.
    #[must_use]
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            socket_dir_pointer: config_dir.join(SOCKET_DIR_POINTER_NAME),
            keys_path: config_dir.join(KEYS_FILE_NAME),
            user_rc: config_dir.join(USER_RC),
            user_plugin_dir: config_dir.join(USER_PLUGIN_DIR),
            config_dir,
        }
    }

    /// Creates the configuration directory, private to the user.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConfigDirectory`] when creation fails.
    pub fn prepare(&self) -> Result<(), ConfigError> {
        DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&self.config_dir)
            .map_err(|source| ConfigError::ConfigDirectory {
                path: self.config_dir.clone(),
                source,
            })
    }

    /// The configuration directory itself.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// File recording the runtime socket directory.
    #[must_use]
    pub fn socket_dir_pointer(&self) -> &Path {
        &self.socket_dir_pointer
    }

    /// File holding the shared secret.
    #[must_use]
    pub fn keys_path(&self) -> &Path {
        &self.keys_path
    }

    /// The user's own service configuration.
    #[must_use]
    pub fn user_rc(&self) -> &Path {
        &self.user_rc
    }

    /// Directory scanned for user plugins before the system directory.
    #[must_use]
    pub fn user_plugin_dir(&self) -> &Path {
        &self.user_plugin_dir
    }

    /// The service configuration in effect: the user's copy when present,
    /// otherwise `system_rc`.
    #[must_use]
    pub fn effective_rc(&self, system_rc: &Path) -> PathBuf {
        if self.user_rc.is_file() {
            self.user_rc.clone()
        } else {
            system_rc.to_path_buf()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn prepare_creates_private_directory() {
        let root = TempDir::new().expect("temp dir");
        let paths = UserPaths::new(root.path().join("nested").join(".dpid"));

        paths.prepare().expect("prepare");

        let mode = fs::metadata(paths.config_dir())
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn effective_rc_prefers_user_copy() {
        let root = TempDir::new().expect("temp dir");
        let paths = UserPaths::new(root.path().to_path_buf());
        let system = root.path().join("system-dpidrc");

        assert_eq!(paths.effective_rc(&system), system);

        fs::write(paths.user_rc(), "dpi_dir=/x\n").expect("write rc");
        assert_eq!(paths.effective_rc(&system), paths.user_rc());
    }

    #[test]
    fn shared_files_use_the_client_names() {
        let paths = UserPaths::new(PathBuf::from("/home/u/.dpid"));

        assert_eq!(
            paths.keys_path().file_name().and_then(|name| name.to_str()),
            Some(KEYS_FILE_NAME)
        );
        assert_eq!(
            paths
                .socket_dir_pointer()
                .file_name()
                .and_then(|name| name.to_str()),
            Some(SOCKET_DIR_POINTER_NAME)
        );
    }
}
