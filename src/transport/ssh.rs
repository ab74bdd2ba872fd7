//! SSH execution transport.
//!
//! Uses the `ssh` binary directly. The script is piped to stdin rather
//! than passed as an argument.

use super::local::run_piped;
use super::ExecOutput;
use crate::core::error::{Error, Result};
use crate::core::types::Host;
use std::process::Command;

/// ssh exits 255 when it cannot reach or authenticate to the host.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Expand a leading `~/` against `$HOME`.
fn expand_key_path(key: &str) -> String {
    match (key.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home, rest),
        _ => key.to_string(),
    }
}

/// Execute a shell script on a remote host via SSH.
pub fn exec_ssh(host: &Host, script: &str) -> Result<ExecOutput> {
    let mut cmd = Command::new("ssh");
    cmd.args(["-o", "BatchMode=yes"])
        .args(["-o", "ConnectTimeout=10"])
        .args(["-o", "StrictHostKeyChecking=accept-new"]);

    if let Some(ref key) = host.ssh_key {
        cmd.args(["-i", &expand_key_path(key)]);
    }

    let target = format!("{}@{}", host.user, host.addr);
    cmd.arg(&target).arg("bash");

    let out = run_piped(cmd, script, &target)?;
    if out.exit_code == SSH_CONNECTION_FAILURE {
        return Err(Error::Infrastructure(format!(
            "{} unreachable: {}",
            target,
            out.stderr.trim()
        )));
    }
    Ok(out)
}
