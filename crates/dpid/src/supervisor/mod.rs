//! The single-threaded event loop.
//!
//! One [`DaemonState`] owns everything the loop touches: the registry of the
//! current generation, one listening socket per plugin, the rendezvous
//! socket, and the signal pipes. The readiness set is rebuilt before every
//! wait from that state:
//!
//! - the termination and SIGCHLD pipes,
//! - every filter plugin's socket,
//! - a server plugin's socket only while no instance of it is running,
//! - the rendezvous socket.
//!
//! A server plugin receives its listening socket and runs its own accept
//! loop, so the daemon stops watching the socket until reaping confirms the
//! child exited. Whatever ends the loop, running server plugins are sent
//! `DpiBye` before their sockets are unlinked.

mod commands;

use std::os::fd::{AsFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

use dpid_config::UserPaths;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::process::LaunchError;
use crate::process::signals::SignalPipes;
use crate::process::spawn::{FdRemap, SpawnError};
use crate::registry::{Plugin, Registry};
use crate::sockets::{PluginSocket, RendezvousSocket, SocketDir, SocketError};

pub(crate) const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Why the event loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// A client sent `DpiBye`.
    Bye,
    /// No activity for the idle timeout while the keep-alive plugin was not
    /// running.
    IdleTimeout,
    /// SIGTERM or SIGINT arrived.
    Signal,
}

/// Static settings of one daemon run.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) user_paths: UserPaths,
    pub(crate) system_rc: PathBuf,
    pub(crate) keep_alive: String,
    pub(crate) idle_timeout: Option<Duration>,
}

/// A plugin's listening socket and the server instance currently using it.
#[derive(Debug)]
struct PluginSlot {
    socket: PluginSocket,
    pid: Option<Pid>,
}

impl PluginSlot {
    fn bind_all(registry: &Registry, sockdir: &Path) -> Result<Vec<Self>, SocketError> {
        registry
            .plugins()
            .iter()
            .map(|plugin| {
                PluginSocket::bind(plugin, sockdir).map(|socket| Self { socket, pid: None })
            })
            .collect()
    }
}

/// Whether a plugin's socket belongs in the readiness set.
const fn is_armed(plugin: &Plugin, pid: Option<Pid>) -> bool {
    plugin.is_filter() || pid.is_none()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Terminate,
    Child,
    Plugin(usize),
    Rendezvous,
}

/// Everything the event loop reads and mutates.
#[derive(Debug)]
pub(crate) struct DaemonState {
    settings: Settings,
    registry: Registry,
    slots: Vec<PluginSlot>,
    rendezvous: RendezvousSocket,
    signals: SignalPipes,
    socket_dir: SocketDir,
}

impl DaemonState {
    /// Binds the rendezvous socket and one socket per registered plugin.
    pub(crate) fn start(
        settings: Settings,
        registry: Registry,
        socket_dir: SocketDir,
        signals: SignalPipes,
    ) -> Result<Self, SocketError> {
        let rendezvous = RendezvousSocket::bind(socket_dir.path())?;
        let slots = PluginSlot::bind_all(&registry, socket_dir.path())?;
        Ok(Self {
            settings,
            registry,
            slots,
            rendezvous,
            signals,
            socket_dir,
        })
    }

    /// Runtime socket directory of this run.
    pub(crate) fn socket_dir(&self) -> &Path {
        self.socket_dir.path()
    }

    /// Serves events until a shutdown condition is met.
    pub(crate) fn run(mut self) -> Result<Shutdown, LaunchError> {
        info!(
            target: SUPERVISOR_TARGET,
            socket = %self.rendezvous.path().display(),
            plugins = self.slots.len(),
            "daemon ready"
        );
        loop {
            let Some(ready) = self.wait()? else {
                if self.keep_alive_running() {
                    debug!(
                        target: SUPERVISOR_TARGET,
                        plugin = %self.settings.keep_alive,
                        "idle timeout ignored while keep-alive plugin runs"
                    );
                    continue;
                }
                info!(target: SUPERVISOR_TARGET, "idle timeout reached");
                self.stop_server_plugins();
                return Ok(Shutdown::IdleTimeout);
            };
            for source in ready {
                match source {
                    Source::Terminate => {
                        info!(target: SUPERVISOR_TARGET, "termination signal received");
                        self.stop_server_plugins();
                        return Ok(Shutdown::Signal);
                    }
                    Source::Child => self.reap(),
                    Source::Plugin(index) => self.dispatch(index),
                    Source::Rendezvous => {
                        if let Some(shutdown) = self.serve_rendezvous() {
                            return Ok(shutdown);
                        }
                    }
                }
            }
        }
    }

    /// Waits for readiness. `None` means the idle timeout elapsed.
    fn wait(&self) -> Result<Option<Vec<Source>>, LaunchError> {
        let mut sources = vec![Source::Terminate, Source::Child];
        let mut fds = vec![
            PollFd::new(self.signals.terminate(), PollFlags::POLLIN),
            PollFd::new(self.signals.child(), PollFlags::POLLIN),
        ];
        for (index, (plugin, slot)) in self.registry.plugins().iter().zip(&self.slots).enumerate() {
            if is_armed(plugin, slot.pid) {
                sources.push(Source::Plugin(index));
                fds.push(PollFd::new(slot.socket.as_fd(), PollFlags::POLLIN));
            }
        }
        sources.push(Source::Rendezvous);
        fds.push(PollFd::new(self.rendezvous.as_fd(), PollFlags::POLLIN));

        let timeout = self.settings.idle_timeout.map_or(PollTimeout::NONE, |idle| {
            PollTimeout::try_from(idle).unwrap_or(PollTimeout::MAX)
        });
        loop {
            match poll(&mut fds, timeout) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(Errno::EINTR) => {}
                Err(source) => return Err(LaunchError::Poll { source }),
            }
        }
        let ready = sources
            .into_iter()
            .zip(&fds)
            .filter(|(_, fd)| fd.revents().is_some_and(|events| !events.is_empty()))
            .map(|(source, _)| source)
            .collect();
        Ok(Some(ready))
    }

    fn keep_alive_running(&self) -> bool {
        self.registry
            .plugins()
            .iter()
            .zip(&self.slots)
            .any(|(plugin, slot)| plugin.id() == self.settings.keep_alive && slot.pid.is_some())
    }

    /// Handles a readable plugin socket.
    fn dispatch(&mut self, index: usize) {
        let (Some(plugin), Some(slot)) =
            (self.registry.plugins().get(index), self.slots.get_mut(index))
        else {
            return;
        };
        if plugin.is_filter() {
            spawn_filter(plugin, slot);
        } else {
            spawn_server(plugin, slot);
        }
    }

    /// Collects exited children, re-arming server plugins whose instance
    /// is gone.
    fn reap(&mut self) {
        self.signals.drain_child();
        for (plugin, slot) in self.registry.plugins().iter().zip(self.slots.iter_mut()) {
            let Some(pid) = slot.pid else {
                continue;
            };
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) | Err(Errno::ECHILD) => {
                    slot.pid = None;
                    info!(
                        target: SUPERVISOR_TARGET,
                        plugin = plugin.id(),
                        pid = pid.as_raw(),
                        "server plugin exited; socket re-armed"
                    );
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(
                        target: SUPERVISOR_TARGET,
                        plugin = plugin.id(),
                        pid = pid.as_raw(),
                        %error,
                        "failed to poll server plugin"
                    );
                }
            }
        }
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
                Ok(status) => {
                    if let Some(pid) = status.pid() {
                        self.forget(pid);
                    }
                    debug!(target: SUPERVISOR_TARGET, ?status, "child reaped");
                }
                Err(Errno::EINTR) => {}
                Err(error) => {
                    warn!(target: SUPERVISOR_TARGET, %error, "failed to reap children");
                    break;
                }
            }
        }
    }

    /// Clears a tracked pid collected by the blind reap.
    fn forget(&mut self, pid: Pid) {
        for slot in &mut self.slots {
            if slot.pid == Some(pid) {
                slot.pid = None;
            }
        }
    }
}

fn spawn_filter(plugin: &Plugin, slot: &PluginSlot) {
    let stream = match slot.socket.accept() {
        Ok(stream) => stream,
        Err(error) => {
            warn!(
                target: SUPERVISOR_TARGET,
                plugin = plugin.id(),
                %error,
                "failed to accept plugin connection"
            );
            return;
        }
    };
    let spawned = FdRemap::channel(plugin.path(), OwnedFd::from(stream))
        .and_then(|remap| remap.spawn(plugin.path()));
    match spawned {
        Ok(pid) => debug!(
            target: SUPERVISOR_TARGET,
            plugin = plugin.id(),
            pid = pid.as_raw(),
            "filter plugin spawned"
        ),
        Err(error) => warn!(
            target: SUPERVISOR_TARGET,
            plugin = plugin.id(),
            %error,
            "failed to spawn filter plugin"
        ),
    }
}

fn spawn_server(plugin: &Plugin, slot: &mut PluginSlot) {
    let spawned = slot
        .socket
        .try_clone_fd()
        .map_err(|source| SpawnError::Duplicate {
            program: plugin.path().to_path_buf(),
            source,
        })
        .and_then(|fd| FdRemap::channel(plugin.path(), fd))
        .and_then(|remap| remap.spawn(plugin.path()));
    match spawned {
        Ok(pid) => {
            slot.pid = Some(pid);
            info!(
                target: SUPERVISOR_TARGET,
                plugin = plugin.id(),
                pid = pid.as_raw(),
                "server plugin started; socket handed over"
            );
        }
        Err(error) => {
            warn!(
                target: SUPERVISOR_TARGET,
                plugin = plugin.id(),
                %error,
                "failed to spawn server plugin"
            );
            // Drop the pending connection so the socket does not stay readable.
            if let Ok(stream) = slot.socket.accept() {
                drop(stream);
            }
        }
    }
}

#[cfg(test)]
mod tests;
