//! Plugin discovery and service resolution.
//!
//! Plugins live one level deep inside a plugin directory
//! (`<dir>/<id>/<name>.dpi`). The user directory is scanned before the
//! system directory and the first plugin registered under an id wins.
//! Services come from `dpidrc` lines mapping a name to a plugin path relative
//! to a plugin directory; a name ending in `*` matches every service sharing
//! its prefix.

mod error;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use dpid_config::{ServiceEntry, UserPaths, get_dpi_dir, load_services};
use tracing::{debug, info, warn};

pub use error::RegistryError;

pub(crate) const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

const PLUGIN_SUFFIX: &str = ".dpi";
const FILTER_SUFFIX: &str = ".filter.dpi";
const FILTER_MARKER: &str = ".filter";
const WILDCARD: char = '*';

/// A discovered plugin executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    id: String,
    path: PathBuf,
    filter: bool,
}

impl Plugin {
    /// Describes the plugin at `path`, registered under `id`.
    #[must_use]
    pub fn new(id: impl Into<String>, path: PathBuf) -> Self {
        let filter = path.to_string_lossy().contains(FILTER_MARKER);
        Self {
            id: id.into(),
            path,
            filter,
        }
    }

    /// Logical name, taken from the containing directory.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Absolute path of the executable.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the plugin is spawned once per connection.
    #[must_use]
    pub const fn is_filter(&self) -> bool {
        self.filter
    }

    /// File name without the `.dpi` or `.filter.dpi` suffix.
    #[must_use]
    pub fn stem(&self) -> Option<&str> {
        let name = self.path.file_name()?.to_str()?;
        name.strip_suffix(FILTER_SUFFIX)
            .or_else(|| name.strip_suffix(PLUGIN_SUFFIX))
    }
}

/// A named service and the plugin it resolved to, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    name: String,
    plugin: Option<usize>,
}

impl Service {
    /// Service name as written in `dpidrc`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the resolved plugin.
    #[must_use]
    pub const fn plugin(&self) -> Option<usize> {
        self.plugin
    }

    fn wildcard_prefix(&self) -> Option<&str> {
        self.name.strip_suffix(WILDCARD)
    }
}

/// Plugins and services of one registration generation.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    plugins: Vec<Plugin>,
    services: Vec<Service>,
    exact: HashMap<String, usize>,
    wildcards: Vec<(String, usize)>,
}

impl Registry {
    /// Scans the plugin directories and reads the service configuration.
    ///
    /// The service configuration is the user's `dpidrc` when present,
    /// otherwise `system_rc`. Its `dpi_dir` names the system plugin
    /// directory. A missing configuration leaves only the user directory and
    /// no services.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NoPluginDirectory`] when neither plugin
    /// directory exists.
    pub fn load(paths: &UserPaths, system_rc: &Path) -> Result<Self, RegistryError> {
        let rc = paths.effective_rc(system_rc);
        let system_dir = match get_dpi_dir(&rc) {
            Ok(dir) => Some(dir),
            Err(error) => {
                warn!(target: REGISTRY_TARGET, %error, "no system plugin directory");
                None
            }
        };
        let dirs: Vec<&Path> = [Some(paths.user_plugin_dir()), system_dir.as_deref()]
            .into_iter()
            .flatten()
            .filter(|dir| dir.is_dir())
            .collect();
        if dirs.is_empty() {
            return Err(RegistryError::NoPluginDirectory {
                user: paths.user_plugin_dir().to_path_buf(),
                system: system_dir,
            });
        }

        let plugins = register_plugins(&dirs);
        let entries = load_services(&rc).unwrap_or_else(|error| {
            warn!(target: REGISTRY_TARGET, %error, "no services configured");
            Vec::new()
        });
        let registry = Self::build(plugins, &entries);
        info!(
            target: REGISTRY_TARGET,
            plugins = registry.plugins.len(),
            services = registry.services.len(),
            config = %rc.display(),
            "plugins registered"
        );
        Ok(registry)
    }

    /// Resolves `entries` against `plugins` and builds the lookup tables.
    #[must_use]
    pub fn build(plugins: Vec<Plugin>, entries: &[ServiceEntry]) -> Self {
        let services = fill_services_list(&plugins, entries);
        let mut exact = HashMap::new();
        let mut wildcards = Vec::new();
        for (index, service) in services.iter().enumerate() {
            match service.wildcard_prefix() {
                Some(prefix) => wildcards.push((prefix.to_ascii_lowercase(), index)),
                None => {
                    exact
                        .entry(service.name.to_ascii_lowercase())
                        .or_insert(index);
                }
            }
        }
        wildcards.sort_by(|(left, _), (right, _)| right.len().cmp(&left.len()));
        Self {
            plugins,
            services,
            exact,
            wildcards,
        }
    }

    /// Registered plugins in scan order.
    #[must_use]
    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Configured services.
    #[must_use]
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Resolves a service name to a plugin index.
    ///
    /// Exact names (ASCII case-insensitive) win over wildcards, and longer
    /// wildcard prefixes win over shorter ones. When no configured service
    /// resolves, a plugin whose id or file stem equals the name is used.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<usize> {
        let lowered = name.to_ascii_lowercase();
        let configured = self.exact.get(&lowered).copied().or_else(|| {
            self.wildcards
                .iter()
                .find(|(prefix, _)| lowered.starts_with(prefix.as_str()))
                .map(|(_, index)| *index)
        });
        configured
            .and_then(|index| self.services.get(index))
            .and_then(Service::plugin)
            .or_else(|| self.legacy_match(name))
    }

    fn legacy_match(&self, name: &str) -> Option<usize> {
        let found = self.plugins.iter().position(|plugin| {
            plugin.id.eq_ignore_ascii_case(name)
                || plugin
                    .stem()
                    .is_some_and(|stem| stem.eq_ignore_ascii_case(name))
        });
        if let Some(index) = found {
            debug!(target: REGISTRY_TARGET, service = name, index, "resolved by plugin name");
        }
        found
    }
}

/// Scans `dirs` in order, one level deep, for `.dpi` executables.
///
/// The first plugin registered under an id is kept; later duplicates are
/// skipped.
#[must_use]
pub fn register_plugins(dirs: &[&Path]) -> Vec<Plugin> {
    let mut plugins: Vec<Plugin> = Vec::new();
    for dir in dirs {
        for candidate in scan_dir(dir) {
            if plugins.iter().any(|known| known.id == candidate.id) {
                debug!(
                    target: REGISTRY_TARGET,
                    id = %candidate.id,
                    path = %candidate.path.display(),
                    "skipping duplicate plugin"
                );
                continue;
            }
            debug!(
                target: REGISTRY_TARGET,
                id = %candidate.id,
                path = %candidate.path.display(),
                filter = candidate.filter,
                "plugin found"
            );
            plugins.push(candidate);
        }
    }
    plugins
}

fn scan_dir(dir: &Path) -> Vec<Plugin> {
    let mut found = Vec::new();
    for subdir in sorted_entries(dir).into_iter().filter(|path| path.is_dir()) {
        let Some(id) = subdir.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let executables = sorted_entries(&subdir).into_iter().filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(PLUGIN_SUFFIX))
        });
        found.extend(executables.map(|path| Plugin::new(id, path)));
    }
    found
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .collect(),
        Err(error) => {
            warn!(
                target: REGISTRY_TARGET,
                dir = %dir.display(),
                %error,
                "cannot read plugin directory"
            );
            Vec::new()
        }
    };
    entries.sort();
    entries
}

/// Resolves each entry to the plugin whose path ends with the entry's
/// relative path.
#[must_use]
pub fn fill_services_list(plugins: &[Plugin], entries: &[ServiceEntry]) -> Vec<Service> {
    entries
        .iter()
        .map(|entry| {
            let plugin = plugins
                .iter()
                .position(|plugin| plugin.path.ends_with(&entry.path));
            if plugin.is_none() {
                debug!(
                    target: REGISTRY_TARGET,
                    service = %entry.name,
                    path = %entry.path.display(),
                    "service has no matching plugin"
                );
            }
            Service {
                name: entry.name.clone(),
                plugin,
            }
        })
        .collect()
}
