//! Single-filesystem image files.
//!
//! Unlike [`TestDisk`](crate::disk::TestDisk), a [`FilePartition`] has no partition table: the
//! whole file is one filesystem.  It can be loop-mounted to fill it with content, and optionally
//! gzipped next to the original.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use log::{debug, error, info};
use tempfile::TempDir;

use crate::{
    cmd::CommandExt,
    disk::{mkfs, zero_fill},
    error::{Error, Result},
    tmpdir::mount_point,
};

type Populate<'a> = Box<dyn FnOnce(&Path) -> anyhow::Result<()> + 'a>;

/// The image file mounted on a temporary directory.
///
/// Dropping it syncs, unmounts and removes the directory.  Teardown failures are logged only.
/// If unmounting fails the directory is left in place: it may still be the image's root.
struct ScopedMount {
    dir: Option<TempDir>,
}

impl ScopedMount {
    fn mount(image: &Path) -> Result<ScopedMount> {
        let dir = mount_point()?;
        Command::new("mount")
            .arg(image)
            .arg(dir.path())
            .run_checked()?;
        debug!("mounted {} on {}", image.display(), dir.path().display());
        Ok(ScopedMount { dir: Some(dir) })
    }

    fn path(&self) -> &Path {
        self.dir.as_ref().map_or(Path::new(""), |dir| dir.path())
    }
}

impl Drop for ScopedMount {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        if let Err(err) = Command::new("sync").run_checked() {
            error!("sync error: {err}");
        }
        if let Err(err) = Command::new("umount").arg(dir.path()).run_checked() {
            error!("umount error: {err}");
            let kept = dir.into_path();
            error!("leaving {} in place", kept.display());
            return;
        }
        if let Err(err) = dir.close() {
            error!("remove error: {err}");
        }
    }
}

/// Builder for a single-filesystem image file.
///
/// ```ignore
/// FilePartition::new("/tmp/boot.img", "vfat", 16)
///     .populate(|mnt| Ok(std::fs::write(mnt.join("hello"), "world")?))
///     .compress(true)
///     .create()?;
/// ```
pub struct FilePartition<'a> {
    path: PathBuf,
    fs_type: String,
    size_mib: u64,
    populate: Option<Populate<'a>>,
    compress: bool,
}

impl<'a> FilePartition<'a> {
    pub fn new(path: impl AsRef<Path>, fs_type: impl Into<String>, size_mib: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            fs_type: fs_type.into(),
            size_mib,
            populate: None,
            compress: false,
        }
    }

    /// Mounts the new filesystem and calls `populate` with the mount point before unmounting.
    pub fn populate(mut self, populate: impl FnOnce(&Path) -> anyhow::Result<()> + 'a) -> Self {
        self.populate = Some(Box::new(populate));
        self
    }

    /// Also writes a gzipped copy (`<path>.gz`), keeping the original.
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Path of the gzipped copy written when compression is enabled.
    pub fn compressed_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".gz");
        name.into()
    }

    /// Allocates, formats, populates and compresses the image, in that order.
    ///
    /// A failing step stops the sequence: in particular nothing is compressed when the populate
    /// routine fails, and its error is the one returned.
    pub fn create(self) -> Result<()> {
        zero_fill(&self.path, self.size_mib)?;
        mkfs(&self.fs_type, &self.path, &[])?;

        if let Some(populate) = self.populate {
            let mount = ScopedMount::mount(&self.path)?;
            populate(mount.path()).map_err(Error::Populate)?;
        }

        if self.compress {
            Command::new("gzip")
                .args(["-k", "-f"])
                .arg(&self.path)
                .run_checked()?;
        }

        info!(
            "created {} MiB {} image {}",
            self.size_mib,
            self.fs_type,
            self.path.display()
        );
        Ok(())
    }
}
