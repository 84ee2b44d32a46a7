//! Running the external disk utilities.
//!
//! Every utility is run to completion exactly once.  A non-zero exit is turned into
//! [`Error::Command`] carrying the utility's combined output verbatim.

use std::process::{Command, Output};

use log::debug;

use crate::error::{Error, Result};

/// Extension trait for [`Command`] that runs it and checks the exit status.
pub trait CommandExt {
    /// Runs the command, returning its captured output on success.
    fn run_checked(&mut self) -> Result<Output>;

    /// Runs the command and returns its stdout, trimmed.
    fn run_get_string(&mut self) -> Result<String> {
        let output = self.run_checked()?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl CommandExt for Command {
    fn run_checked(&mut self) -> Result<Output> {
        let program = self.get_program().to_string_lossy().into_owned();
        debug!("running {:?}", self);

        let output = self.output().map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(Error::Command {
                program,
                status: output.status,
                output: combined_output(&output),
            });
        }

        Ok(output)
    }
}

/// Joins stdout and stderr the way a terminal would show them for a short-lived tool.
pub(crate) fn combined_output(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_run_checked_success() {
        let output = Command::new("sh")
            .args(["-c", "echo hello"])
            .run_checked()
            .unwrap();
        assert_eq!(output.stdout, b"hello\n");
    }

    #[test]
    fn test_run_get_string_trims() {
        let s = Command::new("sh")
            .args(["-c", "echo '  /dev/loop7  '"])
            .run_get_string()
            .unwrap();
        assert_eq!(s, "/dev/loop7");
    }

    #[test]
    fn test_failure_keeps_combined_output() {
        let err = Command::new("sh")
            .args(["-c", "echo out; echo err >&2; exit 3"])
            .run_checked()
            .unwrap_err();

        match err {
            Error::Command {
                program,
                status,
                output,
            } => {
                assert_eq!(program, "sh");
                assert_eq!(status.code(), Some(3));
                assert_eq!(output, "out\nerr\n");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_program() {
        let err = Command::new("testdisk-no-such-utility")
            .run_checked()
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { ref program, .. } if program == "testdisk-no-such-utility"));
        assert!(err.to_string().starts_with("failed to run testdisk-no-such-utility"));
    }
}
