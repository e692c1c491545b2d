//! Commands accepted on the rendezvous socket.
//!
//! The first tag of every connection must be a valid `auth`; anything else
//! closes the connection without a reply. After that the connection carries
//! one request:
//!
//! | command        | effect                                               |
//! |----------------|------------------------------------------------------|
//! | `check_server` | reply `send_data` with the plugin socket, or `DpiError` |
//! | `register_all` | rescan plugins and services, replacing every socket  |
//! | `DpiBye`       | stop running server plugins, then exit               |
//! | other          | reply `DpiError` and read the next tag               |

use std::io;
use std::mem;

use dpip::{Dsh, KeysFile, build_cmd, check_auth, connect_authenticated, get_attr};
use tracing::{debug, info, warn};

use super::{DaemonState, PluginSlot, SUPERVISOR_TARGET, Shutdown};
use crate::registry::Registry;

/// A decoded rendezvous request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Request {
    Auth,
    Bye,
    CheckServer(Option<String>),
    RegisterAll,
    Unknown(String),
    Malformed,
}

impl Request {
    pub(super) fn parse(tag: &str) -> Self {
        match get_attr(tag, "cmd").as_deref() {
            None => Self::Malformed,
            Some("auth") => Self::Auth,
            Some("DpiBye") => Self::Bye,
            Some("check_server") => Self::CheckServer(get_attr(tag, "msg")),
            Some("register_all") => Self::RegisterAll,
            Some(other) => Self::Unknown(other.to_owned()),
        }
    }
}

impl DaemonState {
    /// Accepts and serves one rendezvous connection.
    pub(super) fn serve_rendezvous(&mut self) -> Option<Shutdown> {
        let stream = match self.rendezvous.accept() {
            Ok(stream) => stream,
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => return None,
            Err(error) => {
                warn!(target: SUPERVISOR_TARGET, %error, "failed to accept rendezvous connection");
                return None;
            }
        };
        let mut dsh = Dsh::from_stream(stream);
        let outcome = self.serve_connection(&mut dsh);
        if let Err(error) = dsh.close() {
            debug!(target: SUPERVISOR_TARGET, %error, "rendezvous connection closed uncleanly");
        }
        outcome
    }

    fn serve_connection(&mut self, dsh: &mut Dsh) -> Option<Shutdown> {
        let first = dsh.read_tag(true)?;
        if !self.authenticated(&first) {
            return None;
        }
        while let Some(tag) = dsh.read_tag(true) {
            match Request::parse(&tag) {
                Request::Auth => {
                    if !self.authenticated(&tag) {
                        return None;
                    }
                }
                Request::Bye => {
                    self.stop_server_plugins();
                    return Some(Shutdown::Bye);
                }
                Request::CheckServer(name) => {
                    self.check_server(dsh, name.as_deref());
                    return None;
                }
                Request::RegisterAll => {
                    self.register_all();
                    return None;
                }
                Request::Unknown(command) => {
                    reply_error(dsh, &format!("unknown command '{command}'"));
                }
                Request::Malformed => reply_error(dsh, "malformed tag"),
            }
        }
        None
    }

    fn authenticated(&self, tag: &str) -> bool {
        let accepted = check_auth(tag, self.settings.user_paths.keys_path());
        if !accepted {
            info!(target: SUPERVISOR_TARGET, "rejected unauthenticated rendezvous connection");
        }
        accepted
    }

    fn check_server(&self, dsh: &mut Dsh, name: Option<&str>) {
        let Some(name) = name else {
            reply_error(dsh, "check_server needs a service name");
            return;
        };
        let resolved = self.registry.resolve(name).and_then(|index| {
            Some((self.registry.plugins().get(index)?, self.slots.get(index)?))
        });
        let Some((plugin, slot)) = resolved else {
            debug!(target: SUPERVISOR_TARGET, service = name, "unknown service");
            reply_error(dsh, &format!("unknown service '{name}'"));
            return;
        };
        if !plugin.path().is_file() {
            warn!(
                target: SUPERVISOR_TARGET,
                service = name,
                path = %plugin.path().display(),
                "plugin executable has disappeared"
            );
            reply_error(dsh, &format!("plugin for '{name}' is missing on disk"));
            return;
        }
        let socket = slot.socket.path().to_string_lossy();
        debug!(
            target: SUPERVISOR_TARGET,
            service = name,
            plugin = plugin.id(),
            %socket,
            "service resolved"
        );
        reply(dsh, &[("cmd", "send_data"), ("msg", socket.as_ref())]);
    }

    /// Replaces the registry and every plugin socket with a fresh scan.
    ///
    /// The previous generation stays in place when the rescan fails.
    pub(super) fn register_all(&mut self) {
        let registry = match Registry::load(
            &self.settings.user_paths,
            &self.settings.system_rc,
        ) {
            Ok(registry) => registry,
            Err(error) => {
                warn!(target: SUPERVISOR_TARGET, %error, "rescan failed; keeping plugins");
                return;
            }
        };
        let slots = match PluginSlot::bind_all(&registry, self.socket_dir.path()) {
            Ok(slots) => slots,
            Err(error) => {
                warn!(target: SUPERVISOR_TARGET, %error, "rebinding failed; keeping plugins");
                return;
            }
        };
        self.registry = registry;
        let retired = mem::replace(&mut self.slots, slots);
        info!(
            target: SUPERVISOR_TARGET,
            retired = retired.len(),
            plugins = self.slots.len(),
            "plugins re-registered"
        );
    }

    /// Asks every running server plugin to exit.
    pub(super) fn stop_server_plugins(&self) {
        let keys = match KeysFile::load(self.settings.user_paths.keys_path()) {
            Ok(keys) => keys,
            Err(error) => {
                warn!(target: SUPERVISOR_TARGET, %error, "cannot notify server plugins");
                return;
            }
        };
        let running = self
            .registry
            .plugins()
            .iter()
            .zip(&self.slots)
            .filter(|(plugin, slot)| !plugin.is_filter() && slot.pid.is_some());
        for (plugin, slot) in running {
            let sent = connect_authenticated(slot.socket.path(), &keys).and_then(|mut dsh| {
                dsh.write_str(true, "<cmd='DpiBye' '>")?;
                dsh.close()?;
                Ok(())
            });
            match sent {
                Ok(()) => info!(target: SUPERVISOR_TARGET, plugin = plugin.id(), "sent DpiBye"),
                Err(error) => warn!(
                    target: SUPERVISOR_TARGET,
                    plugin = plugin.id(),
                    %error,
                    "failed to notify server plugin"
                ),
            }
        }
    }
}

fn reply_error(dsh: &mut Dsh, message: &str) {
    reply(dsh, &[("cmd", "DpiError"), ("msg", message)]);
}

fn reply(dsh: &mut Dsh, pairs: &[(&str, &str)]) {
    let tag = match build_cmd(pairs) {
        Ok(tag) => tag,
        Err(error) => {
            warn!(target: SUPERVISOR_TARGET, %error, "cannot encode reply");
            return;
        }
    };
    if let Err(error) = dsh.write_str(true, &tag) {
        debug!(target: SUPERVISOR_TARGET, %error, "reply not delivered");
    }
}
