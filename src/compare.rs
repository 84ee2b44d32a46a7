use std::{
    fs::File,
    io::{copy, BufReader, Read, Seek, SeekFrom},
    path::Path,
};

use log::debug;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const IO_BUFFER_SIZE: usize = 1024 * 1024;

fn digest_prefix(file: File, len: u64) -> Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    // take() stops early at EOF, so a short file simply contributes fewer bytes
    let mut reader = BufReader::with_capacity(IO_BUFFER_SIZE, file.take(len));
    copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().into())
}

/// Checks that `right` holds the same bytes as `left`.
///
/// The length compared is the length of `left`.  Both are hashed with SHA-256 over that many
/// bytes; if `right` is shorter, its missing tail contributes nothing to its digest (which is not
/// an error).  Differing digests give [`Error::Mismatch`]; any other failure is an
/// [`Error::Io`].
///
/// Works on regular files and block devices alike: the length comes from seeking to the end.
pub fn compare_partitions(left: impl AsRef<Path>, right: impl AsRef<Path>) -> Result<()> {
    let (left, right) = (left.as_ref(), right.as_ref());

    let mut left_file = File::open(left)?;
    let mut right_file = File::open(right)?;

    let len = left_file.seek(SeekFrom::End(0))?;
    left_file.rewind()?;
    right_file.rewind()?;
    debug!(
        "comparing {} bytes of {} and {}",
        len,
        left.display(),
        right.display()
    );

    let left_digest = digest_prefix(left_file, len)?;
    let right_digest = digest_prefix(right_file, len)?;

    if left_digest != right_digest {
        return Err(Error::Mismatch {
            left: left.to_path_buf(),
            right: right.to_path_buf(),
            left_digest: hex::encode(left_digest),
            right_digest: hex::encode(right_digest),
        });
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn file_with(data: &[u8]) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(data).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn test_reflexive() {
        let a = file_with(&[0x5a; 3 * IO_BUFFER_SIZE + 17]);
        compare_partitions(a.path(), a.path()).unwrap();
    }

    #[test]
    fn test_identical_copies() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let a = file_with(&data);
        let b = file_with(&data);
        compare_partitions(a.path(), b.path()).unwrap();
    }

    #[test]
    fn test_single_byte_difference() {
        let data = vec![0u8; 65536];
        let mut other = data.clone();
        other[40000] = 1;
        let a = file_with(&data);
        let b = file_with(&other);

        let err = compare_partitions(a.path(), b.path()).unwrap_err();
        match err {
            Error::Mismatch {
                left,
                right,
                left_digest,
                right_digest,
            } => {
                assert_eq!(left, a.path());
                assert_eq!(right, b.path());
                assert_ne!(left_digest, right_digest);
                assert_eq!(left_digest.len(), 64);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_length_taken_from_left() {
        // trailing bytes past the end of `left` are not compared
        let a = file_with(b"partition contents");
        let b = file_with(b"partition contents and then some");
        compare_partitions(a.path(), b.path()).unwrap();
        assert!(matches!(
            compare_partitions(b.path(), a.path()),
            Err(Error::Mismatch { .. })
        ));
    }

    #[test]
    fn test_short_right_is_not_io_error() {
        let a = file_with(b"0123456789");
        let b = file_with(b"");
        assert!(matches!(
            compare_partitions(a.path(), b.path()),
            Err(Error::Mismatch { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let a = file_with(b"data");
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.img");
        assert!(matches!(
            compare_partitions(a.path(), &missing),
            Err(Error::Io(_))
        ));
        assert!(matches!(
            compare_partitions(&missing, a.path()),
            Err(Error::Io(_))
        ));
    }
}
