//! Shared-secret authentication.
//!
//! The daemon writes a per-user keys file whose first line reads
//! `<port> <hex-secret>`. Every client presents the secret as the `msg`
//! attribute of an `auth` tag before any other command is honoured.

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{DpipError, KeysError};
use crate::tag::{build_cmd, get_attr};

/// File name of the keys file inside the per-user configuration directory.
pub const KEYS_FILE_NAME: &str = "dpid_comm_keys";

const AUTH_TARGET: &str = "dpip::auth";

/// Contents of the per-user keys file.
#[derive(Clone, PartialEq, Eq)]
pub struct KeysFile {
    /// Listening port recorded alongside the secret; `0` for Unix transports.
    pub port: u16,
    /// Lower-case hexadecimal secret.
    pub secret: String,
}

impl fmt::Debug for KeysFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeysFile")
            .field("port", &self.port)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl KeysFile {
    /// Parses the first line of a keys file.
    ///
    /// Returns `None` unless the line holds a port and a non-empty hex
    /// secret separated by whitespace.
    #[must_use]
    pub fn parse(contents: &str) -> Option<Self> {
        let line = contents.lines().next()?;
        let mut fields = line.split_whitespace();
        let port = fields.next()?.parse().ok()?;
        let secret = fields.next()?;
        if fields.next().is_some()
            || secret.is_empty()
            || !secret.bytes().all(|byte| byte.is_ascii_hexdigit())
        {
            return None;
        }
        Some(Self {
            port,
            secret: secret.to_ascii_lowercase(),
        })
    }

    /// Renders the keys file contents, newline included.
    #[must_use]
    pub fn render(&self) -> String {
        format!("{} {}\n", self.port, self.secret)
    }

    /// Reads and parses the keys file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`KeysError::Read`] when the file cannot be read and
    /// [`KeysError::Malformed`] when its first line cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, KeysError> {
        let contents = fs::read_to_string(path).map_err(|source| KeysError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).ok_or_else(|| KeysError::Malformed {
            path: path.to_path_buf(),
        })
    }

    /// Builds the `auth` tag presenting this secret.
    ///
    /// # Errors
    ///
    /// Propagates tag construction failures.
    pub fn auth_tag(&self) -> Result<String, DpipError> {
        build_cmd(&[("cmd", "auth"), ("msg", &self.secret)])
    }
}

/// Checks that `tag` is an `auth` command carrying the secret stored at
/// `keys_path`.
///
/// The keys file is read on every call. A missing, unreadable, or malformed
/// file rejects every tag.
#[must_use]
pub fn check_auth(tag: &str, keys_path: &Path) -> bool {
    if get_attr(tag, "cmd").as_deref() != Some("auth") {
        return false;
    }
    let Some(presented) = get_attr(tag, "msg") else {
        return false;
    };
    match KeysFile::load(keys_path) {
        Ok(keys) => secrets_match(&presented, &keys.secret),
        Err(error) => {
            debug!(target: AUTH_TARGET, %error, "cannot verify secret");
            false
        }
    }
}

/// Compares a presented secret against the stored lower-case one.
///
/// Every byte is visited regardless of where the first mismatch lies.
fn secrets_match(presented: &str, stored: &str) -> bool {
    if presented.len() != stored.len() {
        return false;
    }
    presented
        .bytes()
        .map(|byte| byte.to_ascii_lowercase())
        .zip(stored.bytes())
        .fold(0_u8, |diff, (left, right)| diff | (left ^ right))
        == 0
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn keys_dir() -> TempDir {
        let dir = TempDir::new().expect("temp dir");
        let keys = KeysFile {
            port: 0,
            secret: String::from("00ff10ab"),
        };
        fs::write(dir.path().join(KEYS_FILE_NAME), keys.render()).expect("write keys");
        dir
    }

    #[rstest]
    #[case::unix_port("0 deadbeef\n", 0, "deadbeef")]
    #[case::tcp_port("5020 DEADBEEF", 5020, "deadbeef")]
    #[case::extra_lines("7 0a\nignored line\n", 7, "0a")]
    fn parse_reads_first_line(#[case] contents: &str, #[case] port: u16, #[case] secret: &str) {
        let keys = KeysFile::parse(contents).expect("valid keys file");
        assert_eq!(keys.port, port);
        assert_eq!(keys.secret, secret);
    }

    #[rstest]
    #[case::empty("")]
    #[case::missing_secret("0\n")]
    #[case::not_hex("0 xyz\n")]
    #[case::bad_port("port deadbeef\n")]
    #[case::trailing_field("0 beef extra\n")]
    fn parse_rejects_malformed_files(#[case] contents: &str) {
        assert_eq!(KeysFile::parse(contents), None);
    }

    #[rstest]
    fn matching_secret_is_accepted(keys_dir: TempDir) {
        let path = keys_dir.path().join(KEYS_FILE_NAME);
        assert!(check_auth("<cmd='auth' msg='00ff10ab' '>", &path));
    }

    #[rstest]
    #[case::wrong_secret("<cmd='auth' msg='00ff10ac' '>")]
    #[case::missing_msg("<cmd='auth' '>")]
    #[case::other_command("<cmd='check_server' msg='00ff10ab' '>")]
    fn other_tags_are_rejected(keys_dir: TempDir, #[case] tag: &str) {
        let path = keys_dir.path().join(KEYS_FILE_NAME);
        assert!(!check_auth(tag, &path));
    }

    #[rstest]
    #[case::identical("00ff10ab", true)]
    #[case::upper_case_presented("00FF10AB", true)]
    #[case::last_byte_differs("00ff10ac", false)]
    #[case::first_byte_differs("10ff10ab", false)]
    #[case::prefix("00ff10", false)]
    #[case::longer("00ff10ab00", false)]
    #[case::empty("", false)]
    fn secrets_are_compared_byte_for_byte(#[case] presented: &str, #[case] expected: bool) {
        assert_eq!(secrets_match(presented, "00ff10ab"), expected);
    }

    #[test]
    fn missing_keys_file_rejects_everything() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join(KEYS_FILE_NAME);
        assert!(!check_auth("<cmd='auth' msg='00ff10ab' '>", &path));
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let keys = KeysFile {
            port: 0,
            secret: String::from("cafe"),
        };
        assert!(!format!("{keys:?}").contains("cafe"));
    }
}
