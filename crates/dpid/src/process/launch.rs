//! Supervises daemon launch sequencing.
//!
//! Startup order matters to clients: the sockets are listening before the
//! keys file and the socket directory pointer are published, so a client
//! that can read the pointer can always connect.

use std::fs;
use std::os::unix::net::UnixStream;
use std::path::Path;

use dpid_config::{Config, UserPaths};
use dpip::{KeysFile, RENDEZVOUS_SOCKET_NAME};
use nix::unistd::{User, getuid};
use tracing::{debug, info};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::files::publish;
use super::signals::SignalPipes;
use crate::registry::Registry;
use crate::sockets::SocketDir;
use crate::supervisor::{DaemonState, Settings, Shutdown};

/// Runs the daemon until `DpiBye`, the idle timeout, or a termination
/// signal.
///
/// # Errors
///
/// Returns a [`LaunchError`] when startup fails or the event loop cannot
/// continue.
pub fn run_daemon(config: &Config) -> Result<Shutdown, LaunchError> {
    let user_paths = config.user_paths()?;
    user_paths.prepare()?;
    ensure_not_running(&user_paths)?;
    info!(
        target: PROCESS_TARGET,
        config_dir = %user_paths.config_dir().display(),
        "starting daemon"
    );

    let registry = Registry::load(&user_paths, config.system_config())?;
    let socket_dir = SocketDir::create(&config.socket_root(), &user_name())?;
    let signals = SignalPipes::install().map_err(|source| LaunchError::Signals { source })?;
    let settings = Settings {
        user_paths: user_paths.clone(),
        system_rc: config.system_config().to_path_buf(),
        keep_alive: config.keep_alive_plugin().to_owned(),
        idle_timeout: config.idle_timeout(),
    };
    let state = DaemonState::start(settings, registry, socket_dir, signals)?;

    write_keys(&user_paths)?;
    write_pointer(&user_paths, state.socket_dir())?;

    let shutdown = state.run()?;
    info!(target: PROCESS_TARGET, ?shutdown, "daemon stopped");
    Ok(shutdown)
}

/// Fails when the recorded rendezvous socket still accepts connections.
fn ensure_not_running(paths: &UserPaths) -> Result<(), LaunchError> {
    let Ok(recorded) = fs::read_to_string(paths.socket_dir_pointer()) else {
        return Ok(());
    };
    let socket = Path::new(recorded.trim_end()).join(RENDEZVOUS_SOCKET_NAME);
    if UnixStream::connect(&socket).is_ok() {
        return Err(LaunchError::AlreadyRunning { socket });
    }
    debug!(
        target: PROCESS_TARGET,
        socket = %socket.display(),
        "stale socket directory pointer"
    );
    Ok(())
}

fn write_keys(paths: &UserPaths) -> Result<(), LaunchError> {
    let keys = KeysFile {
        port: 0,
        secret: format!("{:032x}", rand::random::<u128>()),
    };
    publish(paths.keys_path(), keys.render().as_bytes()).map_err(|source| {
        LaunchError::KeysWrite {
            path: paths.keys_path().to_path_buf(),
            source,
        }
    })?;
    debug!(target: PROCESS_TARGET, file = %paths.keys_path().display(), "keys file written");
    Ok(())
}

fn write_pointer(paths: &UserPaths, socket_dir: &Path) -> Result<(), LaunchError> {
    let contents = format!("{}\n", socket_dir.display());
    publish(paths.socket_dir_pointer(), contents.as_bytes()).map_err(|source| {
        LaunchError::PointerWrite {
            path: paths.socket_dir_pointer().to_path_buf(),
            source,
        }
    })
}

fn user_name() -> String {
    let uid = getuid();
    match User::from_uid(uid) {
        Ok(Some(user)) => user.name,
        _ => format!("uid-{uid}"),
    }
}
