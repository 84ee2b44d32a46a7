use std::{ffi::OsString, io::Result, path::Path};

use log::debug;
use once_cell::sync::Lazy;
use tempfile::TempDir;

static TMPDIR: Lazy<OsString> = Lazy::new(|| {
    if let Some(path) = std::env::var_os("TESTDISK_TMPDIR") {
        debug!("temporary directory from $TESTDISK_TMPDIR: {path:?}");
        path
    } else {
        std::env::temp_dir().into_os_string()
    }
});

/// The directory scratch images and temporary mount points are created in.
///
/// Taken from `$TESTDISK_TMPDIR` if set (read once per process), otherwise the system default
/// temporary directory.
pub fn tmpdir() -> &'static Path {
    Path::new(TMPDIR.as_os_str())
}

/// Creates a fresh, uniquely named directory inside [`tmpdir()`], removed when dropped.
pub fn tempdir() -> Result<TempDir> {
    TempDir::with_prefix_in("testdisk-", tmpdir())
}

pub(crate) fn mount_point() -> Result<TempDir> {
    TempDir::with_prefix_in("um_mount", tmpdir())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tempdir_is_unique_and_inside_tmpdir() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(tmpdir()));
        assert!(a
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("testdisk-"));
    }

    #[test]
    fn test_mount_point_removed_on_drop() {
        let dir = mount_point().unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.is_dir());
        drop(dir);
        assert!(!path.exists());
    }
}
