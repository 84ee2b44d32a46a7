//! Partition identity lookup through `blkid`.

use std::{path::Path, process::Command};

use uuid::Uuid;

use crate::{
    cmd::CommandExt,
    error::{Error, Result},
};

const PARTUUID_TAG: &str = "PARTUUID=";

/// Returns the GPT partition UUID of `device` as reported by `blkid`.
///
/// Fails with [`Error::PartUuidNotFound`] if `blkid` prints no `PARTUUID=` field, and with
/// [`Error::InvalidPartUuid`] if the field doesn't hold a UUID.
pub fn resolve_partition_uuid(device: impl AsRef<Path>) -> Result<Uuid> {
    let device = device.as_ref();
    let output = Command::new("blkid").arg(device).run_checked()?;

    parse_partuuid(&String::from_utf8_lossy(&output.stdout))?.ok_or_else(|| {
        Error::PartUuidNotFound {
            device: device.to_path_buf(),
        }
    })
}

/// Scans `blkid` output for the first `PARTUUID=` field.
///
/// Returns `Ok(None)` if there is no such field.  The value may be bare or double-quoted.
pub fn parse_partuuid(output: &str) -> Result<Option<Uuid>> {
    let Some(value) = output
        .split_whitespace()
        .find_map(|field| field.strip_prefix(PARTUUID_TAG))
    else {
        return Ok(None);
    };

    let value = value.trim_matches('"');
    Uuid::parse_str(value)
        .map(Some)
        .map_err(|source| Error::InvalidPartUuid {
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_parse_blkid_line() {
        let line = r#"/dev/loop3p1: LABEL="root" UUID="0b3a6c1e-58e3-4c0e-9d0e-2f3f1b0a7c11" BLOCK_SIZE="4096" TYPE="ext4" PARTLABEL="primary" PARTUUID="5f1c0a2e-8d44-4c5b-a3a9-6e0c2f7d9b10""#;
        assert_eq!(
            parse_partuuid(line).unwrap(),
            Some(Uuid::parse_str("5f1c0a2e-8d44-4c5b-a3a9-6e0c2f7d9b10").unwrap())
        );
    }

    #[test]
    fn test_parse_unquoted() {
        let uuid = parse_partuuid("PARTUUID=5f1c0a2e-8d44-4c5b-a3a9-6e0c2f7d9b10\n")
            .unwrap()
            .unwrap();
        assert_eq!(uuid.to_string(), "5f1c0a2e-8d44-4c5b-a3a9-6e0c2f7d9b10");
    }

    #[test]
    fn test_ignores_fs_uuid() {
        // a formatted file with no partition table only has the filesystem UUID
        let line = r#"/tmp/part.img: UUID="0b3a6c1e-58e3-4c0e-9d0e-2f3f1b0a7c11" TYPE="ext4""#;
        assert_eq!(parse_partuuid(line).unwrap(), None);
        assert_eq!(parse_partuuid("").unwrap(), None);
    }

    #[test]
    fn test_invalid_value() {
        let err = parse_partuuid(r#"/dev/loop0p1: PARTUUID="not-a-uuid""#).unwrap_err();
        match err {
            Error::InvalidPartUuid { value, .. } => assert_eq!(value, "not-a-uuid"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_first_field_wins() {
        let output = "PARTUUID=5f1c0a2e-8d44-4c5b-a3a9-6e0c2f7d9b10 PARTUUID=garbage";
        assert!(parse_partuuid(output).unwrap().is_some());
    }
}
