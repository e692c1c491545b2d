//! Buffered, mode-aware socket handle.
//!
//! A [`Dsh`] wraps the descriptors of one live connection. Writes are
//! buffered and flushed on demand or when the buffer grows past
//! [`FLUSH_THRESHOLD`]. Reads are framed into whole tags while the handle is
//! in [`DshMode::Tag`]; once the mode-switch tag has been handed to the
//! caller the handle moves to [`DshMode::Raw`] for good and returns whatever
//! bytes arrive.
//!
//! Peers may deliver a stream in arbitrarily small fragments. A partial tag
//! stays in the read buffer until its terminator arrives, so callers never
//! observe a truncated token.

mod io;

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::net::UnixStream;

use tracing::trace;

use crate::error::DshError;
use crate::tag::{MODE_SWITCH_TAG, find_tag_end};

use self::io::{Chunk, Written};

/// Write buffer size above which pending data is flushed.
pub const FLUSH_THRESHOLD: usize = 16 * 1024;

const READ_CHUNK: usize = 8 * 1024;
const DSH_TARGET: &str = "dpip::dsh";

/// Framing applied to incoming data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DshMode {
    /// Incoming bytes are split into complete tags.
    Tag,
    /// Incoming bytes are returned unframed.
    Raw,
}

/// Outcome of the most recent I/O operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DshStatus {
    /// The last operation completed.
    Ok,
    /// A nonblocking operation could not make progress.
    WouldBlock,
    /// The connection failed.
    Error,
    /// The peer closed the connection.
    Eof,
}

/// Result of a successful write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Everything written so far has reached the descriptor.
    Flushed,
    /// The data is buffered and no flush was attempted.
    Queued,
    /// A nonblocking flush stopped early; the remainder stays queued.
    WouldBlock,
}

/// Buffered dpip socket handle.
#[derive(Debug)]
pub struct Dsh {
    input: Option<OwnedFd>,
    output: Option<OwnedFd>,
    wr_buf: Vec<u8>,
    rd_buf: Vec<u8>,
    mode: DshMode,
    nonblocking: bool,
    status: DshStatus,
}

impl Dsh {
    /// Creates a handle over separate input and output descriptors.
    #[must_use]
    pub fn new(input: OwnedFd, output: OwnedFd) -> Self {
        Self::build(Some(input), Some(output))
    }

    /// Creates a handle over a connected stream used for both directions.
    ///
    /// The underlying descriptor is closed exactly once.
    #[must_use]
    pub fn from_stream(stream: UnixStream) -> Self {
        Self::build(Some(OwnedFd::from(stream)), None)
    }

    const fn build(input: Option<OwnedFd>, output: Option<OwnedFd>) -> Self {
        Self {
            input,
            output,
            wr_buf: Vec::new(),
            rd_buf: Vec::new(),
            mode: DshMode::Tag,
            nonblocking: false,
            status: DshStatus::Ok,
        }
    }

    /// Current framing mode.
    #[must_use]
    pub const fn mode(&self) -> DshMode {
        self.mode
    }

    /// Outcome of the most recent operation.
    #[must_use]
    pub const fn status(&self) -> DshStatus {
        self.status
    }

    /// Whether flushes triggered by [`Dsh::write`] avoid blocking.
    #[must_use]
    pub const fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    /// Selects whether flushes triggered by [`Dsh::write`] may block.
    pub const fn set_nonblocking(&mut self, nonblocking: bool) {
        self.nonblocking = nonblocking;
    }

    /// Number of bytes waiting to be written.
    #[must_use]
    pub fn pending_write(&self) -> usize {
        self.wr_buf.len()
    }

    /// Appends `data` to the write buffer, flushing when `flush` is set or the
    /// buffer has grown past [`FLUSH_THRESHOLD`].
    ///
    /// # Errors
    ///
    /// Returns [`DshError::Closed`] when the peer has gone away and
    /// [`DshError::Io`] for other descriptor failures.
    pub fn write(&mut self, flush: bool, data: &[u8]) -> Result<WriteStatus, DshError> {
        self.wr_buf.extend_from_slice(data);
        if !flush && self.wr_buf.len() < FLUSH_THRESHOLD {
            self.status = DshStatus::Ok;
            return Ok(WriteStatus::Queued);
        }
        self.flush_with(!self.nonblocking)
    }

    /// Convenience wrapper writing a tag and flushing it.
    ///
    /// # Errors
    ///
    /// See [`Dsh::write`].
    pub fn write_str(&mut self, flush: bool, data: &str) -> Result<WriteStatus, DshError> {
        self.write(flush, data.as_bytes())
    }

    /// Attempts to flush pending data without blocking.
    ///
    /// # Errors
    ///
    /// See [`Dsh::write`].
    pub fn try_flush(&mut self) -> Result<WriteStatus, DshError> {
        self.flush_with(false)
    }

    /// Appends `data` and attempts a nonblocking flush.
    ///
    /// # Errors
    ///
    /// See [`Dsh::write`].
    pub fn try_write(&mut self, data: &[u8]) -> Result<WriteStatus, DshError> {
        self.wr_buf.extend_from_slice(data);
        self.flush_with(false)
    }

    /// Flushes pending data, blocking until it has been written.
    ///
    /// # Errors
    ///
    /// See [`Dsh::write`].
    pub fn flush(&mut self) -> Result<WriteStatus, DshError> {
        self.flush_with(true)
    }

    fn flush_with(&mut self, blocking: bool) -> Result<WriteStatus, DshError> {
        if self.wr_buf.is_empty() {
            self.status = DshStatus::Ok;
            return Ok(WriteStatus::Flushed);
        }
        let Some(fd) = self.output_fd() else {
            self.status = DshStatus::Error;
            return Err(DshError::Closed);
        };
        let result = io::write_all(fd, &self.wr_buf, blocking);
        match result {
            Ok(Written::All) => {
                self.wr_buf.clear();
                self.status = DshStatus::Ok;
                Ok(WriteStatus::Flushed)
            }
            Ok(Written::Partial(count)) => {
                self.wr_buf.drain(..count);
                self.status = DshStatus::WouldBlock;
                trace!(
                    target: DSH_TARGET,
                    written = count,
                    pending = self.wr_buf.len(),
                    "nonblocking flush stopped early"
                );
                Ok(WriteStatus::WouldBlock)
            }
            Err(error) => {
                self.status = status_for(&error);
                Err(error)
            }
        }
    }

    /// Reads the next token.
    ///
    /// In [`DshMode::Tag`] the token is one complete tag, terminator
    /// included. A partial tag is never returned; in blocking mode the call
    /// keeps reading until the tag completes or the connection ends. In
    /// [`DshMode::Raw`] the token is whatever is buffered or readable.
    ///
    /// Returns `None` when no token is available; [`Dsh::status`] then tells
    /// whether the handle would block, reached end of stream, or failed.
    pub fn read_token(&mut self, blocking: bool) -> Option<Vec<u8>> {
        match self.mode {
            DshMode::Tag => self.read_tag_token(blocking),
            DshMode::Raw => self.read_raw_token(blocking),
        }
    }

    /// Reads the next token and decodes it as text.
    pub fn read_tag(&mut self, blocking: bool) -> Option<String> {
        self.read_token(blocking)
            .map(|token| String::from_utf8_lossy(&token).into_owned())
    }

    fn read_tag_token(&mut self, blocking: bool) -> Option<Vec<u8>> {
        loop {
            if let Some(end) = find_tag_end(&self.rd_buf) {
                let token: Vec<u8> = self.rd_buf.drain(..end).collect();
                if contains(&token, MODE_SWITCH_TAG.as_bytes()) {
                    self.mode = DshMode::Raw;
                    trace!(target: DSH_TARGET, "switching to raw mode");
                }
                self.status = DshStatus::Ok;
                return Some(token);
            }
            match self.fill(blocking) {
                Chunk::Data(_) => {}
                Chunk::WouldBlock | Chunk::Eof | Chunk::Failed => return None,
            }
        }
    }

    fn read_raw_token(&mut self, blocking: bool) -> Option<Vec<u8>> {
        if !self.rd_buf.is_empty() {
            self.status = DshStatus::Ok;
            return Some(std::mem::take(&mut self.rd_buf));
        }
        match self.fill(blocking) {
            Chunk::Data(_) => {
                self.status = DshStatus::Ok;
                Some(std::mem::take(&mut self.rd_buf))
            }
            Chunk::WouldBlock | Chunk::Eof | Chunk::Failed => None,
        }
    }

    fn fill(&mut self, blocking: bool) -> Chunk {
        let Some(fd) = self.input.as_ref().map(AsFd::as_fd) else {
            self.status = DshStatus::Error;
            return Chunk::Failed;
        };
        let mut chunk = [0_u8; READ_CHUNK];
        let outcome = io::read_chunk(fd, &mut chunk, blocking);
        match outcome {
            Chunk::Data(count) => {
                self.rd_buf.extend_from_slice(chunk.get(..count).unwrap_or_default());
                self.status = DshStatus::Ok;
            }
            Chunk::WouldBlock => self.status = DshStatus::WouldBlock,
            Chunk::Eof => self.status = DshStatus::Eof,
            Chunk::Failed => self.status = DshStatus::Error,
        }
        outcome
    }

    fn output_fd(&self) -> Option<BorrowedFd<'_>> {
        self.output
            .as_ref()
            .or(self.input.as_ref())
            .map(AsFd::as_fd)
    }

    /// Flushes pending writes and closes the descriptors.
    ///
    /// Both descriptors are closed exactly once, even when they are shared.
    ///
    /// # Errors
    ///
    /// Returns the flush error, if any; the descriptors are closed regardless.
    pub fn close(mut self) -> Result<(), DshError> {
        let flushed = self.flush().map(|_| ());
        self.release();
        flushed
    }

    fn release(&mut self) {
        self.output = None;
        self.input = None;
        self.wr_buf = Vec::new();
        self.rd_buf = Vec::new();
    }
}

impl Drop for Dsh {
    fn drop(&mut self) {
        if self.input.is_none() && self.output.is_none() {
            return;
        }
        if let Err(error) = self.flush() {
            trace!(target: DSH_TARGET, %error, "dropping handle with unflushed data");
        }
        self.release();
    }
}

fn status_for(error: &DshError) -> DshStatus {
    match error {
        DshError::Closed => DshStatus::Eof,
        DshError::Io { .. } => DshStatus::Error,
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

#[cfg(test)]
mod tests;
