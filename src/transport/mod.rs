//! Transport: run package manager and git invocations on a platform host.
//!
//! An [`Invocation`] renders to a small bash script (cwd, env, quoted argv)
//! that is executed locally or piped over SSH. The [`Runner`] trait is the
//! seam the executor and the git helpers go through.

pub mod local;
pub mod ssh;

use crate::core::error::Result;
use crate::core::types::Host;

/// Output from executing a script on a target.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last lines of combined output, for failure messages.
    pub fn tail(&self, lines: usize) -> String {
        let combined = format!("{}{}", self.stdout, self.stderr);
        let all: Vec<&str> = combined.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// A program invocation with its working directory and environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// A shell line run through `bash -c`.
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new("bash").arg("-c").arg(line)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: Option<&str>) -> Self {
        self.cwd = dir.map(str::to_string);
        self
    }

    /// `program arg...`, for logs and reports.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Render as a bash script.
    pub fn to_script(&self) -> String {
        let mut lines = vec!["set -e".to_string()];
        if let Some(ref dir) = self.cwd {
            lines.push(format!("cd {}", shell_quote(dir)));
        }
        for (key, value) in &self.env {
            lines.push(format!("export {}={}", key, shell_quote(value)));
        }
        let argv: Vec<String> = std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| shell_quote(a))
            .collect();
        lines.push(format!("exec {}", argv.join(" ")));
        lines.join("\n")
    }
}

/// Single-quote a word for bash.
pub fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Executes invocations on a host.
pub trait Runner: Send + Sync {
    fn run(&self, host: &Host, invocation: &Invocation) -> Result<ExecOutput>;
}

/// Runs invocations through bash, locally or over SSH.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl Runner for ShellRunner {
    fn run(&self, host: &Host, invocation: &Invocation) -> Result<ExecOutput> {
        tracing::debug!(host = %host.addr, command = %invocation.command_line(), "exec");
        exec_script(host, &invocation.to_script())
    }
}

/// Execute a script on a host.
/// Dispatches to local or SSH based on address.
pub fn exec_script(host: &Host, script: &str) -> Result<ExecOutput> {
    if is_local_addr(&host.addr) {
        local::exec_local(script)
    } else {
        ssh::exec_ssh(host, script)
    }
}

/// Check if an address is this machine.
pub fn is_local_addr(addr: &str) -> bool {
    if addr == "127.0.0.1" || addr == "localhost" || addr == "::1" {
        return true;
    }
    if let Ok(hostname) = std::fs::read_to_string("/etc/hostname") {
        if addr == hostname.trim() {
            return true;
        }
    }
    false
}
