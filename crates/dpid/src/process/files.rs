//! Publication of the files clients read to reach the daemon.

use std::fs::Permissions;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::Builder;

/// Replaces `path` with `contents`, readable by the owner only.
///
/// Clients may read the keys file or the socket directory pointer at any
/// moment, so the contents are staged beside `path`, synced, then renamed
/// over it.
pub(super) fn publish(path: &Path, contents: &[u8]) -> io::Result<()> {
    let Some(directory) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' has no parent directory", path.display()),
        ));
    };
    let mut staged = Builder::new()
        .prefix(".dpid-")
        .suffix(".new")
        .permissions(Permissions::from_mode(0o600))
        .tempfile_in(directory)?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|error| error.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn replaces_keys_with_owner_only_mode() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("dpid_comm_keys");
        fs::write(&path, "stale").expect("seed file");

        publish(&path, b"0 abc\n").expect("publish");

        assert_eq!(fs::read_to_string(&path).expect("read"), "0 abc\n");
        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let entries = fs::read_dir(dir.path()).expect("list").count();
        assert_eq!(entries, 1, "no staged file is left behind");
    }

    #[rstest]
    #[case::root("/")]
    #[case::bare_name("dpid_socket_dir")]
    fn paths_without_a_directory_are_refused(#[case] path: &str) {
        let error = publish(Path::new(path), b"x").expect_err("no parent");

        assert_eq!(error.kind(), io::ErrorKind::InvalidInput);
    }
}
