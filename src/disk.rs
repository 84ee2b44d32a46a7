//! Multi-partition test disks backed by a loopback device.
//!
//! [`TestDisk::new`] lays out a GPT table in a freshly allocated file, attaches the file as a
//! loopback device with partition scanning, and formats every partition.  The returned handle
//! owns both the loop device and the file until [`TestDisk::release`] is called.

use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Command,
};

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    cmd::CommandExt,
    error::{Error, Result},
    partuuid::resolve_partition_uuid,
    rollback::Rollback,
};

/// Space reserved in front of the first partition for the GPT table, in MiB.
pub const HEAD_RESERVED_MIB: u64 = 1;
/// Slack after the last partition (room for the backup GPT header), in MiB.
pub const TAIL_RESERVED_MIB: u64 = 1;

/// Description of one partition to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    /// Filesystem type; `mkfs.<fs_type>` must be installed.
    pub fs_type: String,
    pub label: String,
    pub size_mib: u64,
}

impl PartitionSpec {
    pub fn new(fs_type: impl Into<String>, label: impl Into<String>, size_mib: u64) -> Self {
        Self {
            fs_type: fs_type.into(),
            label: label.into(),
            size_mib,
        }
    }

    /// The `mkfs` flag that sets the volume label: FAT/DOS tools use `-n`, everything else `-L`.
    pub fn label_flag(&self) -> &'static str {
        if self.fs_type.contains("fat") || self.fs_type.contains("dos") {
            "-n"
        } else {
            "-L"
        }
    }
}

/// A partition of an attached [`TestDisk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub spec: PartitionSpec,
    /// Block device of the partition, e.g. `/dev/loop3p2`.
    pub device: PathBuf,
    pub part_uuid: Uuid,
}

/// Total size of the backing file in MiB.
///
/// Fails with [`Error::SizeOverflow`] if the sizes don't add up within a `u64`.
pub fn disk_size_mib(specs: &[PartitionSpec]) -> Result<u64> {
    specs
        .iter()
        .try_fold(HEAD_RESERVED_MIB + TAIL_RESERVED_MIB, |total, spec| {
            total.checked_add(spec.size_mib)
        })
        .ok_or(Error::SizeOverflow)
}

/// Start and end offsets in MiB of each partition, contiguous from [`HEAD_RESERVED_MIB`].
pub fn partition_layout(specs: &[PartitionSpec]) -> Result<Vec<(u64, u64)>> {
    let mut offset = HEAD_RESERVED_MIB;
    specs
        .iter()
        .map(|spec| {
            let start = offset;
            offset = offset
                .checked_add(spec.size_mib)
                .ok_or(Error::SizeOverflow)?;
            Ok::<_, Error>((start, offset))
        })
        .collect()
}

/// The device node the kernel creates for partition `number` (1-based) of `device`.
pub fn partition_device(device: &Path, number: usize) -> PathBuf {
    let mut name = OsString::from(device.as_os_str());
    name.push(format!("p{number}"));
    name.into()
}

/// Writes `size_mib` MiB of zeros to `path`.
pub(crate) fn zero_fill(path: &Path, size_mib: u64) -> Result<()> {
    let mut of = OsString::from("of=");
    of.push(path);
    Command::new("dd")
        .arg("if=/dev/zero")
        .arg(of)
        .args(["bs=1M", &format!("count={size_mib}")])
        .run_checked()?;
    Ok(())
}

/// Runs `mkfs.<fs_type>` on `target` with any extra arguments.
pub(crate) fn mkfs(fs_type: &str, target: &Path, args: &[&str]) -> Result<()> {
    Command::new(format!("mkfs.{fs_type}"))
        .arg(target)
        .args(args)
        .run_checked()?;
    Ok(())
}

/// Removes the backing file (or directory); a path that is already gone is not an error.
fn remove_backing(path: &Path) -> Result<()> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(err) => Err(err),
    };
    match result {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}

fn detach(device: &Path) -> Result<()> {
    Command::new("losetup").arg("-d").arg(device).run_checked()?;
    Ok(())
}

/// A disk image with a GPT partition table, attached as a loopback device.
///
/// Dropping a disk that was never released releases it on a best-effort basis, logging any
/// failure; call [`TestDisk::release`] to observe errors.
#[derive(Debug)]
pub struct TestDisk {
    device: Option<PathBuf>,
    partitions: Vec<PartitionInfo>,
    path: PathBuf,
    size_mib: u64,
    released: bool,
}

impl TestDisk {
    /// Creates the backing file at `path`, partitions it according to `specs`, attaches it and
    /// formats each partition with its filesystem and label.
    ///
    /// On failure everything created so far is torn down again: the loop device is detached and
    /// the file at `path` is removed before the error is returned.
    pub fn new(path: impl AsRef<Path>, specs: &[PartitionSpec]) -> Result<TestDisk> {
        let path = path.as_ref();
        let size = disk_size_mib(specs)?;
        let layout = partition_layout(specs)?;
        let mut rollback = Rollback::new();

        // registered first: dd may fail half way through writing the file
        rollback.push("backing file", || remove_backing(path));
        debug!("allocating {size} MiB at {}", path.display());
        zero_fill(path, size)?;

        Command::new("parted")
            .arg("-s")
            .arg(path)
            .args(["mktable", "gpt"])
            .run_checked()?;

        for (start, end) in layout {
            Command::new("parted")
                .arg("-s")
                .arg(path)
                .args(["mkpart", "primary"])
                .arg(format!("{start}MiB"))
                .arg(format!("{end}MiB"))
                .run_checked()?;
        }

        let device = PathBuf::from(
            Command::new("losetup")
                .args(["-f", "-P"])
                .arg(path)
                .arg("--show")
                .run_get_string()?,
        );
        debug!("attached {} as {}", path.display(), device.display());
        {
            let device = device.clone();
            rollback.push("loop device", move || detach(&device));
        }

        let mut partitions = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let part_device = partition_device(&device, index + 1);
            let part_uuid = resolve_partition_uuid(&part_device)?;

            mkfs(
                &spec.fs_type,
                &part_device,
                &[spec.label_flag(), &spec.label],
            )?;
            debug!(
                "formatted {} as {} ({part_uuid})",
                part_device.display(),
                spec.fs_type
            );

            partitions.push(PartitionInfo {
                spec: spec.clone(),
                device: part_device,
                part_uuid,
            });
        }

        rollback.commit();
        info!(
            "created test disk {} on {} with {} partitions",
            path.display(),
            device.display(),
            partitions.len()
        );

        Ok(TestDisk {
            device: Some(device),
            partitions,
            path: path.to_path_buf(),
            size_mib: size,
            released: false,
        })
    }

    /// The loop device the disk is attached as, until it is released.
    pub fn device(&self) -> Option<&Path> {
        self.device.as_deref()
    }

    pub fn partitions(&self) -> &[PartitionInfo] {
        &self.partitions
    }

    /// The partition with the given 1-based number, as in its device name.
    pub fn partition(&self, number: usize) -> Option<&PartitionInfo> {
        number
            .checked_sub(1)
            .and_then(|index| self.partitions.get(index))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the backing file in MiB.
    pub fn size_mib(&self) -> u64 {
        self.size_mib
    }

    /// Detaches the loop device and deletes the backing file.
    ///
    /// If detaching fails the error is returned and the file is left alone, so the call can be
    /// retried.  Once a release has succeeded, further calls do nothing.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }

        if let Some(device) = &self.device {
            detach(device)?;
            debug!("detached {}", device.display());
            self.device = None;
        }

        remove_backing(&self.path)?;
        self.released = true;
        info!("released test disk {}", self.path.display());
        Ok(())
    }
}

impl Drop for TestDisk {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!("test disk {} dropped without release", self.path.display());
        if let Err(err) = self.release() {
            error!("releasing test disk {}: {err}", self.path.display());
        }
    }
}
