//! Spawning plugins with descriptors remapped onto their standard streams.
//!
//! Each transfer moves an owned descriptor into the child as one of its
//! standard streams. The parent's own stdio is never touched, and the
//! parent's copies of transferred descriptors are closed once the spawn
//! attempt returns, whether it succeeded or not. An exec failure is reported
//! to the parent as an error and leaves no child behind.

use std::io;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use nix::unistd::Pid;
use thiserror::Error;
use tracing::debug;

use super::PROCESS_TARGET;

/// Standard stream a transferred descriptor becomes in the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StdStream {
    Stdin,
    Stdout,
}

/// Errors raised while spawning a plugin.
#[derive(Debug, Error)]
pub(crate) enum SpawnError {
    /// A descriptor could not be duplicated for the child.
    #[error("failed to duplicate descriptor for '{program}': {source}")]
    Duplicate {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The program could not be executed.
    #[error("failed to execute '{program}': {source}")]
    Exec {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Descriptor transfers applied when spawning a child.
#[derive(Debug, Default)]
pub(crate) struct FdRemap {
    transfers: Vec<(OwnedFd, StdStream)>,
}

impl FdRemap {
    /// Installs `fd` as both stdin and stdout of the child.
    pub(crate) fn channel(program: &Path, fd: OwnedFd) -> Result<Self, SpawnError> {
        let duplicate = fd.try_clone().map_err(|source| SpawnError::Duplicate {
            program: program.to_path_buf(),
            source,
        })?;
        Ok(Self::default()
            .transfer(fd, StdStream::Stdin)
            .transfer(duplicate, StdStream::Stdout))
    }

    /// Adds a transfer; a later transfer to the same stream replaces an
    /// earlier one.
    pub(crate) fn transfer(mut self, fd: OwnedFd, stream: StdStream) -> Self {
        self.transfers.retain(|(_, existing)| *existing != stream);
        self.transfers.push((fd, stream));
        self
    }

    /// Runs `program` without arguments and returns its pid.
    ///
    /// The child is not waited on here; reaping belongs to the supervisor.
    pub(crate) fn spawn(self, program: &Path) -> Result<Pid, SpawnError> {
        let mut command = Command::new(program);
        for (fd, stream) in self.transfers {
            match stream {
                StdStream::Stdin => command.stdin(Stdio::from(fd)),
                StdStream::Stdout => command.stdout(Stdio::from(fd)),
            };
        }
        let child = command.spawn().map_err(|source| SpawnError::Exec {
            program: program.to_path_buf(),
            source,
        })?;
        drop(command);
        let raw = child.id();
        let pid = i32::try_from(raw).map_err(|_| SpawnError::Exec {
            program: program.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, format!("pid {raw} out of range")),
        })?;
        debug!(
            target: PROCESS_TARGET,
            program = %program.display(),
            pid,
            "plugin spawned"
        );
        Ok(Pid::from_raw(pid))
    }
}
