//! Descriptor-level read and write primitives with EINTR and EAGAIN handling.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::unistd;

use crate::error::DshError;

/// Outcome of a single read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Chunk {
    Data(usize),
    WouldBlock,
    Eof,
    Failed,
}

/// Outcome of a write request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Written {
    All,
    Partial(usize),
}

/// Reads whatever is available into `buf`.
///
/// A nonblocking call polls first and reports [`Chunk::WouldBlock`] when the
/// descriptor has nothing to offer. A blocking call waits for readiness even
/// when the descriptor itself has `O_NONBLOCK` set.
pub(super) fn read_chunk(fd: BorrowedFd<'_>, buf: &mut [u8], blocking: bool) -> Chunk {
    if !blocking {
        match wait_for(fd, PollFlags::POLLIN, PollTimeout::ZERO) {
            Ok(true) => {}
            Ok(false) => return Chunk::WouldBlock,
            Err(_) => return Chunk::Failed,
        }
    }
    loop {
        match unistd::read(fd.as_raw_fd(), buf) {
            Ok(0) => return Chunk::Eof,
            Ok(count) => return Chunk::Data(count),
            Err(Errno::EINTR) => {}
            Err(Errno::EAGAIN) if blocking => {
                if wait_for(fd, PollFlags::POLLIN, PollTimeout::NONE).is_err() {
                    return Chunk::Failed;
                }
            }
            Err(Errno::EAGAIN) => return Chunk::WouldBlock,
            Err(Errno::ECONNRESET) => return Chunk::Eof,
            Err(_) => return Chunk::Failed,
        }
    }
}

/// Writes `data`, blocking or not.
///
/// In nonblocking mode `O_NONBLOCK` is raised for the duration of the call
/// and the previous flags restored afterwards; the count of bytes that made
/// it out is reported through [`Written::Partial`].
pub(super) fn write_all(
    fd: BorrowedFd<'_>,
    data: &[u8],
    blocking: bool,
) -> Result<Written, DshError> {
    if blocking {
        return write_blocking(fd, data);
    }
    let previous = OFlag::from_bits_truncate(fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL)?);
    fcntl(
        fd.as_raw_fd(),
        FcntlArg::F_SETFL(previous | OFlag::O_NONBLOCK),
    )?;
    let result = write_until_blocked(fd, data);
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(previous))?;
    result
}

fn write_blocking(fd: BorrowedFd<'_>, data: &[u8]) -> Result<Written, DshError> {
    let mut offset = 0;
    while let Some(rest) = data.get(offset..).filter(|rest| !rest.is_empty()) {
        match unistd::write(fd, rest) {
            Ok(0) => return Err(DshError::io(io::ErrorKind::WriteZero.into())),
            Ok(count) => offset += count,
            Err(Errno::EINTR) => {}
            Err(Errno::EAGAIN) => {
                wait_for(fd, PollFlags::POLLOUT, PollTimeout::NONE)?;
            }
            Err(errno) => return Err(errno.into()),
        }
    }
    Ok(Written::All)
}

fn write_until_blocked(fd: BorrowedFd<'_>, data: &[u8]) -> Result<Written, DshError> {
    let mut offset = 0;
    while let Some(rest) = data.get(offset..).filter(|rest| !rest.is_empty()) {
        match unistd::write(fd, rest) {
            Ok(0) => return Err(DshError::io(io::ErrorKind::WriteZero.into())),
            Ok(count) => offset += count,
            Err(Errno::EINTR) => {}
            Err(Errno::EAGAIN) => return Ok(Written::Partial(offset)),
            Err(errno) => return Err(errno.into()),
        }
    }
    Ok(Written::All)
}

/// Waits until `fd` reports one of `events`, retrying on EINTR.
///
/// Hang-up and error conditions count as ready so the following read or
/// write observes them.
fn wait_for(fd: BorrowedFd<'_>, events: PollFlags, timeout: PollTimeout) -> Result<bool, Errno> {
    loop {
        let mut fds = [PollFd::new(fd, events)];
        match poll(&mut fds, timeout) {
            Ok(0) => return Ok(false),
            Ok(_) => return Ok(true),
            Err(Errno::EINTR) => {}
            Err(errno) => return Err(errno),
        }
    }
}
