//! The `dpidrc` service configuration grammar.
//!
//! ```text
//! # comment
//! dpi_dir=/usr/lib/dpid/dpi
//! proto.file = file/file.dpi
//! proto.http* = http/http.filter.dpi
//! ```
//!
//! `dpi_dir` names the system plugin directory and must start in column 0.
//! Every other `key = value` line maps a service name to a plugin path
//! relative to a plugin directory. Names ending in `*` match any service
//! sharing the prefix.

use std::fs;
use std::path::{Path, PathBuf};

use crate::ConfigError;

const DPI_DIR_KEY: &str = "dpi_dir";

/// One `service = relative/path` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    /// Service name, possibly ending in the `*` wildcard.
    pub name: String,
    /// Plugin path relative to a plugin directory.
    pub path: PathBuf,
}

/// Reads the system plugin directory from the `dpidrc` at `rc`.
///
/// # Errors
///
/// Returns [`ConfigError::ReadRc`] when the file cannot be read and
/// [`ConfigError::MissingDpiDir`] when it has no `dpi_dir` line.
pub fn get_dpi_dir(rc: &Path) -> Result<PathBuf, ConfigError> {
    let contents = read_rc(rc)?;
    parse_dpi_dir(&contents).ok_or_else(|| ConfigError::MissingDpiDir {
        path: rc.to_path_buf(),
    })
}

/// Reads every service line from the `dpidrc` at `rc`.
///
/// # Errors
///
/// Returns [`ConfigError::ReadRc`] when the file cannot be read.
pub fn load_services(rc: &Path) -> Result<Vec<ServiceEntry>, ConfigError> {
    read_rc(rc).map(|contents| parse_services(&contents))
}

/// Extracts the `dpi_dir` value. The key must start in column 0; spaces
/// around `=` are allowed.
#[must_use]
pub fn parse_dpi_dir(contents: &str) -> Option<PathBuf> {
    contents.lines().find_map(|line| {
        let rest = line.strip_prefix(DPI_DIR_KEY)?;
        let value = rest.trim_start().strip_prefix('=')?.trim();
        (!value.is_empty()).then(|| PathBuf::from(value))
    })
}

/// Extracts the service lines, skipping comments, blank lines, malformed
/// lines, and `dpi_dir`.
#[must_use]
pub fn parse_services(contents: &str) -> Vec<ServiceEntry> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (name, path) = line.split_once('=')?;
            let (name, path) = (name.trim(), path.trim());
            if name.is_empty() || path.is_empty() || name == DPI_DIR_KEY {
                return None;
            }
            Some(ServiceEntry {
                name: name.to_owned(),
                path: PathBuf::from(path),
            })
        })
        .collect()
}

fn read_rc(rc: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(rc).map_err(|source| ConfigError::ReadRc {
        path: rc.to_path_buf(),
        source,
    })
}
