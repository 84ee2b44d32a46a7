//! Loopback-backed disk image fixtures for tests of partition management code.
//!
//! - [`disk::TestDisk`]: a GPT-partitioned image attached as a loop device, one filesystem per
//!   partition, released explicitly with [`disk::TestDisk::release`].
//! - [`file_partition::FilePartition`]: a single whole-file filesystem, optionally populated
//!   through a temporary mount and gzipped.
//! - [`compare::compare_partitions`]: byte-for-byte comparison of two partitions or images.
//! - [`partuuid::resolve_partition_uuid`]: the GPT partition UUID of a block device.
//!
//! Everything here shells out to the usual Linux utilities (`dd`, `parted`, `losetup`,
//! `mkfs.*`, `blkid`, `mount`, `gzip`) and most of it needs root.

#![forbid(unsafe_code)]

pub mod cmd;
pub mod compare;
pub mod disk;
pub mod error;
pub mod file_partition;
pub mod partuuid;
mod rollback;
pub mod tmpdir;

pub use compare::compare_partitions;
pub use disk::{PartitionInfo, PartitionSpec, TestDisk};
pub use error::{Error, Result};
pub use file_partition::FilePartition;
pub use partuuid::resolve_partition_uuid;
