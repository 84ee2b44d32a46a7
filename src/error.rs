//! Error types for the testdisk library.
//!
//! Every fallible operation returns a [`Result<T>`], an alias for
//! `Result<T, Error>`.
//!
//! # Error Categories
//!
//! - **External utilities**: [`Spawn`], [`Command`]
//! - **Layout**: [`SizeOverflow`]
//! - **Partition identity**: [`PartUuidNotFound`], [`InvalidPartUuid`]
//! - **Content checks**: [`Mismatch`]
//! - **Caller code**: [`Populate`]
//! - **System errors**: [`Io`]
//!
//! [`Spawn`]: Error::Spawn
//! [`Command`]: Error::Command
//! [`SizeOverflow`]: Error::SizeOverflow
//! [`PartUuidNotFound`]: Error::PartUuidNotFound
//! [`InvalidPartUuid`]: Error::InvalidPartUuid
//! [`Mismatch`]: Error::Mismatch
//! [`Populate`]: Error::Populate
//! [`Io`]: Error::Io

use std::{path::PathBuf, process::ExitStatus};

/// Result type alias for operations that may return an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for disk fixture operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The utility could not be started at all (not installed, not executable).
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The utility ran and exited unsuccessfully.  `output` is its combined
    /// stdout and stderr, unmodified.
    #[error("{program} failed: {status} ({output})")]
    Command {
        program: String,
        status: ExitStatus,
        output: String,
    },

    /// `blkid` reported no `PARTUUID=` field for the device.
    #[error("partition UUID not found for {}", device.display())]
    PartUuidNotFound { device: PathBuf },

    /// The `PARTUUID=` field did not hold a valid UUID.
    #[error("invalid partition UUID {value:?}: {source}")]
    InvalidPartUuid {
        value: String,
        #[source]
        source: uuid::Error,
    },

    /// The partition sizes add up to more MiB than fit in a `u64`.
    #[error("total disk size overflows")]
    SizeOverflow,

    /// Two partitions hashed to different digests.
    #[error(
        "data mismatch: {} ({left_digest}) != {} ({right_digest})",
        left.display(),
        right.display()
    )]
    Mismatch {
        left: PathBuf,
        right: PathBuf,
        left_digest: String,
        right_digest: String,
    },

    /// The caller-supplied populate routine failed.
    #[error("populating partition failed: {0:#}")]
    Populate(#[source] anyhow::Error),

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
