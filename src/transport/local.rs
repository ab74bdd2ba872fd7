//! Local execution, plus the stdin plumbing the SSH transport shares.

use super::ExecOutput;
use crate::core::error::{Error, Result};
use std::io::Write;
use std::process::{Command, Stdio};

/// Spawn `cmd`, write `script` to its stdin and collect the output.
///
/// `target` names the destination in error messages. A process killed by
/// a signal reports exit code -1.
pub(super) fn run_piped(mut cmd: Command, script: &str, target: &str) -> Result<ExecOutput> {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Infrastructure(format!("cannot start shell for {}: {}", target, e)))?;

    // Dropping the handle closes the pipe so bash sees EOF.
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(script.as_bytes()).map_err(|e| {
            Error::Infrastructure(format!("cannot send script to {}: {}", target, e))
        })?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| Error::Infrastructure(format!("lost shell on {}: {}", target, e)))?;
    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a script with the local `bash`.
pub fn exec_local(script: &str) -> Result<ExecOutput> {
    run_piped(Command::new("bash"), script, "localhost")
}
