//! Harness for driving the `dpid` binary against a scratch configuration.

#![expect(dead_code, reason = "each test binary uses a subset of the harness")]

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use dpip::{
    Dsh, KEYS_FILE_NAME, KeysFile, RENDEZVOUS_SOCKET_NAME, RendezvousClient,
    SOCKET_DIR_POINTER_NAME, get_attr,
};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tempfile::TempDir;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Names the file a recording server plugin appends its tags to.
pub const TAG_LOG_ENV: &str = "DPID_TEST_TAG_LOG";

/// Polls `probe` until it yields a value or [`WAIT_TIMEOUT`] passes.
pub fn wait_for<T>(what: &str, mut probe: impl FnMut() -> Option<T>) -> Result<T> {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        if let Some(value) = probe() {
            return Ok(value);
        }
        if Instant::now() >= deadline {
            bail!("timed out waiting for {what}");
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// A scratch home holding the per-user configuration and socket root.
pub struct Layout {
    root: TempDir,
}

impl Layout {
    /// Creates an empty configuration directory with a user plugin
    /// directory.
    pub fn new() -> Result<Self> {
        let root = tempfile::tempdir()?;
        fs::create_dir_all(root.path().join("config").join("dpi"))?;
        fs::create_dir_all(root.path().join("run"))?;
        Ok(Self { root })
    }

    /// Creates a layout without a user plugin directory.
    pub fn without_plugins() -> Result<Self> {
        let root = tempfile::tempdir()?;
        fs::create_dir_all(root.path().join("config"))?;
        fs::create_dir_all(root.path().join("run"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.path().join("config")
    }

    pub fn socket_root(&self) -> PathBuf {
        self.root.path().join("run")
    }

    /// Installs an executable shell script at `dpi/<id>/<file>`.
    pub fn add_plugin(&self, id: &str, file: &str, body: &str) -> Result<PathBuf> {
        let dir = self.config_dir().join("dpi").join(id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(file);
        fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    /// Installs a server plugin that re-executes the running test binary,
    /// filtered to the test named `entry`, which must call
    /// [`serve_recording_plugin`]. Every tag the plugin receives is appended
    /// to `log`, one per line.
    pub fn add_recording_server(
        &self,
        id: &str,
        file: &str,
        entry: &str,
        log: &Path,
    ) -> Result<PathBuf> {
        let exe = std::env::current_exe()?;
        self.add_plugin(
            id,
            file,
            &format!(
                "{TAG_LOG_ENV}='{}' exec '{}' --exact {entry} --test-threads 1 >/dev/null 2>&1",
                log.display(),
                exe.display()
            ),
        )
    }

    /// Writes the user's `dpidrc`.
    pub fn write_rc(&self, contents: &str) -> Result<()> {
        fs::write(self.config_dir().join("dpidrc"), contents)?;
        Ok(())
    }

    /// Arguments pointing the daemon at this layout.
    pub fn args(&self) -> Vec<String> {
        vec![
            String::from("--config-dir"),
            self.config_dir().display().to_string(),
            String::from("--socket-root"),
            self.socket_root().display().to_string(),
            String::from("--system-config"),
            self.root.path().join("absent-dpidrc").display().to_string(),
            String::from("--log-format"),
            String::from("compact"),
            String::from("--log-filter"),
            String::from("dpid=debug"),
        ]
    }

    /// Starts the daemon and waits until it has published its sockets.
    pub fn spawn(&self, extra: &[&str]) -> Result<Daemon> {
        let child = Command::new(env!("CARGO_BIN_EXE_dpid"))
            .args(self.args())
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("spawn dpid")?;
        let mut daemon = Daemon {
            child,
            config_dir: self.config_dir(),
            socket_dir: PathBuf::new(),
        };
        let pointer = self.config_dir().join(SOCKET_DIR_POINTER_NAME);
        daemon.socket_dir = wait_for("socket directory pointer", || {
            let contents = fs::read_to_string(&pointer).ok()?;
            let dir = PathBuf::from(contents.trim_end());
            dir.join(RENDEZVOUS_SOCKET_NAME).exists().then_some(dir)
        })?;
        Ok(daemon)
    }
}

/// Serves the listening socket inherited on stdin, recording every tag,
/// until a connection carries `DpiBye`.
///
/// Returns immediately unless started through
/// [`Layout::add_recording_server`].
pub fn serve_recording_plugin() -> Result<()> {
    let Some(log_path) = std::env::var_os(TAG_LOG_ENV) else {
        return Ok(());
    };
    let listener = UnixListener::from(io::stdin().as_fd().try_clone_to_owned()?);
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    loop {
        let (stream, _) = listener.accept()?;
        let mut dsh = Dsh::from_stream(stream);
        let mut farewell = false;
        while let Some(tag) = dsh.read_tag(true) {
            writeln!(log, "{tag}")?;
            farewell |= get_attr(&tag, "cmd").as_deref() == Some("DpiBye");
        }
        if farewell {
            return Ok(());
        }
    }
}

/// Lines of a file, empty when it does not exist yet.
pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|contents| contents.lines().map(str::to_owned).collect())
        .unwrap_or_default()
}

/// A running daemon; killed on drop if still alive.
pub struct Daemon {
    child: Child,
    config_dir: PathBuf,
    socket_dir: PathBuf,
}

impl Daemon {
    pub fn socket_dir(&self) -> &Path {
        &self.socket_dir
    }

    pub fn rendezvous_path(&self) -> PathBuf {
        self.socket_dir.join(RENDEZVOUS_SOCKET_NAME)
    }

    pub fn keys_path(&self) -> PathBuf {
        self.config_dir.join(KEYS_FILE_NAME)
    }

    pub fn keys(&self) -> Result<KeysFile> {
        Ok(KeysFile::load(&self.keys_path())?)
    }

    pub fn client(&self) -> Result<RendezvousClient> {
        Ok(RendezvousClient::from_config_dir(&self.config_dir)?)
    }

    /// Sends `signal` to the daemon.
    pub fn signal(&self, signal: Signal) -> Result<()> {
        let pid = i32::try_from(self.child.id()).context("pid out of range")?;
        kill(Pid::from_raw(pid), signal)?;
        Ok(())
    }

    /// Whether the daemon is still running.
    pub fn is_running(&mut self) -> Result<bool> {
        Ok(self.child.try_wait()?.is_none())
    }

    /// Waits up to [`WAIT_TIMEOUT`] for the daemon to exit.
    pub fn wait_exit(&mut self) -> Result<ExitStatus> {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                bail!("daemon did not exit");
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
