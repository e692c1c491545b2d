//! Signal delivery through self-pipes watched by the event loop.
//!
//! Handlers only write a byte to a socket pair; the supervisor polls the
//! read ends and does the real work between waits.

use std::io::{self, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;

use signal_hook::SigId;
use signal_hook::consts::signal::{SIGCHLD, SIGINT, SIGTERM};
use signal_hook::low_level::{self, pipe};
use tracing::debug;

use super::PROCESS_TARGET;

/// One self-pipe per signal class.
#[derive(Debug)]
pub(crate) struct SignalPipes {
    child: UnixStream,
    terminate: UnixStream,
    registrations: Vec<SigId>,
}

impl SignalPipes {
    /// Routes SIGCHLD to one pipe and SIGTERM/SIGINT to another.
    pub(crate) fn install() -> io::Result<Self> {
        let (child, child_writer) = self_pipe()?;
        let (terminate, terminate_writer) = self_pipe()?;
        let mut pipes = Self {
            child,
            terminate,
            registrations: Vec::with_capacity(3),
        };
        pipes
            .registrations
            .push(pipe::register(SIGCHLD, child_writer)?);
        pipes
            .registrations
            .push(pipe::register(SIGTERM, terminate_writer.try_clone()?)?);
        pipes
            .registrations
            .push(pipe::register(SIGINT, terminate_writer)?);
        debug!(target: PROCESS_TARGET, "signal pipes installed");
        Ok(pipes)
    }

    /// Read end notified on SIGCHLD.
    pub(crate) fn child(&self) -> BorrowedFd<'_> {
        self.child.as_fd()
    }

    /// Read end notified on SIGTERM or SIGINT.
    pub(crate) fn terminate(&self) -> BorrowedFd<'_> {
        self.terminate.as_fd()
    }

    /// Empties the SIGCHLD pipe so coalesced notifications are consumed.
    pub(crate) fn drain_child(&self) {
        drain(&self.child);
    }
}

impl Drop for SignalPipes {
    fn drop(&mut self) {
        for id in self.registrations.drain(..) {
            low_level::unregister(id);
        }
    }
}

fn self_pipe() -> io::Result<(UnixStream, UnixStream)> {
    let (reader, writer) = UnixStream::pair()?;
    reader.set_nonblocking(true)?;
    writer.set_nonblocking(true)?;
    Ok((reader, writer))
}

fn drain(mut reader: &UnixStream) {
    let mut buf = [0_u8; 64];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(_) => return,
        }
    }
}
