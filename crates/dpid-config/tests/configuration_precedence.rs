//! Flag, environment, and default precedence for the daemon configuration.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use once_cell::sync::Lazy;
use rstest::rstest;

use dpid_config::{Config, LogFormat};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        let previous = std::env::var_os(key);
        // Environment mutation is unsafe in edition 2024; the mutex serialises it.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

#[test]
fn environment_overrides_defaults() {
    let _env = EnvOverride::set_var("DPID_KEEP_ALIVE_PLUGIN", OsStr::new("transfers"));

    let config = Config::load_from_iter(["dpid"]).expect("load config");

    assert_eq!(config.keep_alive_plugin(), "transfers");
}

#[test]
fn flags_override_environment() {
    let _env = EnvOverride::set_var("DPID_IDLE_TIMEOUT", OsStr::new("10"));

    let config = Config::load_from_iter(["dpid", "--idle-timeout", "20"]).expect("load config");

    assert_eq!(config.idle_timeout(), Some(Duration::from_secs(20)));
}

#[rstest]
#[case::json("json", LogFormat::Json)]
#[case::compact("COMPACT", LogFormat::Compact)]
fn log_format_reads_environment(#[case] value: &str, #[case] expected: LogFormat) {
    let _env = EnvOverride::set_var("DPID_LOG_FORMAT", OsStr::new(value));

    let config = Config::load_from_iter(["dpid"]).expect("load config");

    assert_eq!(config.log_format(), expected);
}

#[test]
fn config_dir_flag_drives_user_paths() {
    let config =
        Config::load_from_iter(["dpid", "--config-dir", "/srv/u/.dpid"]).expect("load config");

    let paths = config.user_paths().expect("user paths");

    assert_eq!(
        paths.keys_path(),
        PathBuf::from("/srv/u/.dpid/dpid_comm_keys")
    );
    assert_eq!(paths.user_plugin_dir(), PathBuf::from("/srv/u/.dpid/dpi"));
}
