//! Process-level concerns: launch sequencing, child spawning, signal
//! delivery, and the per-user files written at startup.

mod errors;
mod files;
pub(crate) mod launch;
pub(crate) mod signals;
pub(crate) mod spawn;

pub use errors::LaunchError;
pub use launch::run_daemon;

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
