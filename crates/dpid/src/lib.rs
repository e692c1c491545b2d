//! The dpid plugin daemon.
//!
//! The daemon discovers plugin executables on disk, binds one listening Unix
//! socket per plugin inside a private runtime directory, and starts plugins
//! on demand when a client connects. Clients locate plugins through the
//! rendezvous socket `dpid.srs`, authenticating with the shared secret the
//! daemon publishes in the per-user keys file.
//!
//! Two kinds of plugin are supported:
//!
//! - **filters** (any `.filter` path component) get a fresh process per
//!   connection, with the accepted connection as stdin and stdout;
//! - **servers** get their listening socket handed over and run their own
//!   accept loop until they exit.
//!
//! Everything runs on one thread around a `poll(2)` readiness loop; see
//! [`run_daemon`].

pub mod process;
pub mod registry;
pub mod sockets;
mod supervisor;
pub mod telemetry;

pub use process::{LaunchError, run_daemon};
pub use supervisor::Shutdown;
pub use telemetry::TelemetryError;
